//! Routes used by the probing engine and other internal services.
//! They require a service token and act as the system principal.
use super::{ApiError, App, Request};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use incidents::{Caller, OpenIncident};
use models::{Id, Incident, ResolveMode, ResourceKind};
use std::sync::Arc;

#[derive(Debug, serde::Deserialize)]
pub struct ResolveQuery {
    #[serde(default = "auto")]
    mode: ResolveMode,
}

fn auto() -> ResolveMode {
    ResolveMode::Auto
}

pub async fn open_incident(
    State(app): State<Arc<App>>,
    Request(req): Request<OpenIncident>,
) -> Result<(StatusCode, Json<Incident>), ApiError> {
    let incident = app.lifecycle.open(Caller::System, req).await?;

    Ok((StatusCode::CREATED, Json(incident)))
}

pub async fn resolve_incident(
    State(app): State<Arc<App>>,
    Path(id): Path<Id>,
    Query(ResolveQuery { mode }): Query<ResolveQuery>,
) -> Result<Json<Incident>, ApiError> {
    let incident = app.lifecycle.resolve(Caller::System, id, mode).await?;
    Ok(Json(incident))
}

pub async fn recover_resource(
    State(app): State<Arc<App>>,
    Path((kind, resource_id)): Path<(ResourceKind, Id)>,
) -> Result<Json<Incident>, ApiError> {
    let incident = app.lifecycle.recover(kind, resource_id).await?;
    Ok(Json(incident))
}
