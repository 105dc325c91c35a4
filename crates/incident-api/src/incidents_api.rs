use super::{ApiError, App, Claims, Request};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use incidents::{IncidentDetail, OpenIncident};
use models::{Id, Incident, IncidentFilter, ResolveMode};
use std::sync::Arc;

#[derive(Debug, serde::Serialize)]
pub struct ScreenshotResponse {
    screenshot_ref: String,
}

pub async fn list_incidents(
    State(app): State<Arc<App>>,
    Extension(claims): Extension<Claims>,
    Query(filter): Query<IncidentFilter>,
) -> Result<Json<Vec<Incident>>, ApiError> {
    let account = claims.account()?;
    let incidents = app.lifecycle.list(account, &filter).await?;
    Ok(Json(incidents))
}

pub async fn create_incident(
    State(app): State<Arc<App>>,
    Extension(claims): Extension<Claims>,
    Request(req): Request<OpenIncident>,
) -> Result<(StatusCode, Json<Incident>), ApiError> {
    let incident = app
        .lifecycle
        .open(incidents::Caller::User(claims.account()?), req)
        .await?;

    Ok((StatusCode::CREATED, Json(incident)))
}

pub async fn get_incident(
    State(app): State<Arc<App>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Id>,
) -> Result<Json<IncidentDetail>, ApiError> {
    let detail = app.lifecycle.get(claims.caller()?, id).await?;
    Ok(Json(detail))
}

pub async fn delete_incident(
    State(app): State<Arc<App>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Id>,
) -> Result<StatusCode, ApiError> {
    app.lifecycle.delete(claims.caller()?, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resolve_incident(
    State(app): State<Arc<App>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Id>,
) -> Result<Json<Incident>, ApiError> {
    let incident = app
        .lifecycle
        .resolve(claims.caller()?, id, ResolveMode::Manual)
        .await?;
    Ok(Json(incident))
}

pub async fn reopen_incident(
    State(app): State<Arc<App>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Id>,
) -> Result<Json<Incident>, ApiError> {
    let incident = app.lifecycle.reopen(claims.caller()?, id).await?;
    Ok(Json(incident))
}

pub async fn capture_screenshot(
    State(app): State<Arc<App>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Id>,
) -> Result<Json<ScreenshotResponse>, ApiError> {
    let screenshot_ref = app.lifecycle.capture_screenshot(claims.caller()?, id).await?;
    Ok(Json(ScreenshotResponse { screenshot_ref }))
}
