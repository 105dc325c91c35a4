use super::{ApiError, App, Claims};
use axum::extract::{Path, State};
use axum::{Extension, Json};
use models::{Id, TestRun};
use std::sync::Arc;

/// Returns the test run. Runs which have been running for too long are
/// marked abandoned as part of the read.
pub async fn get_test_run(
    State(app): State<Arc<App>>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Id>,
) -> Result<Json<TestRun>, ApiError> {
    let run = app.reconciler.fetch_test_run(claims.caller()?, id).await?;
    Ok(Json(run))
}
