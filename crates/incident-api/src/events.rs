use super::{ApiError, App, Claims, Request};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use incidents::timeline::CommentBody;
use models::{Event, Id};
use std::sync::Arc;

pub async fn list_events(
    State(app): State<Arc<App>>,
    Extension(claims): Extension<Claims>,
    Path(incident_id): Path<Id>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let events = app.timeline.list(claims.caller()?, incident_id).await?;
    Ok(Json(events))
}

pub async fn add_comment(
    State(app): State<Arc<App>>,
    Extension(claims): Extension<Claims>,
    Path(incident_id): Path<Id>,
    Request(req): Request<CommentBody>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let event = app
        .timeline
        .add_comment(claims.account()?, incident_id, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn edit_comment(
    State(app): State<Arc<App>>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<Id>,
    Request(req): Request<CommentBody>,
) -> Result<Json<Event>, ApiError> {
    let event = app
        .timeline
        .edit_comment(claims.account()?, event_id, &req.content)
        .await?;
    Ok(Json(event))
}

pub async fn delete_comment(
    State(app): State<Arc<App>>,
    Extension(claims): Extension<Claims>,
    Path(event_id): Path<Id>,
) -> Result<StatusCode, ApiError> {
    app.timeline
        .delete_comment(claims.account()?, event_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
