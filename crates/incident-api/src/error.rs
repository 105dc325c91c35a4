//! Defines the `ApiError` type returned from API handlers, which pairs an
//! HTTP status code with an `anyhow::Error`. It implements `IntoResponse`,
//! so handlers may return a `Result<Json<T>, ApiError>`.
//!
//! Incident errors map onto status codes by their kind. Internal errors are
//! logged and replaced with a generic message, so that database and other
//! implementation details never reach the client.
use super::Rejection;
use axum::http::StatusCode;

/// An error response.
#[derive(Debug, thiserror::Error, serde::Serialize)]
#[error("status: {status}, error: {error}")]
pub struct ApiError {
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,
    #[serde(serialize_with = "serialize_error")]
    #[source]
    pub error: anyhow::Error,
}

fn serialize_status<S: serde::Serializer>(status: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(status.as_u16())
}

fn serialize_error<S: serde::Serializer>(error: &anyhow::Error, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{error:#}")) // alternate renders nested causes
}

impl ApiError {
    pub fn new(status: StatusCode, error: anyhow::Error) -> ApiError {
        ApiError { status, error }
    }

    pub fn unauthorized(error: impl std::fmt::Display) -> ApiError {
        ApiError::new(StatusCode::UNAUTHORIZED, anyhow::anyhow!("{error}"))
    }

    fn internal(error: anyhow::Error) -> ApiError {
        tracing::error!(?error, "API responding with internal error");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            anyhow::anyhow!("internal error, please retry the request"),
        )
    }
}

impl From<incidents::Error> for ApiError {
    fn from(err: incidents::Error) -> ApiError {
        use incidents::Error;

        let status = match &err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict { .. } | Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        match err {
            Error::Internal(error) => ApiError::internal(error),
            err => ApiError::new(status, anyhow::Error::from(err)),
        }
    }
}

impl From<Rejection> for ApiError {
    fn from(value: Rejection) -> Self {
        ApiError {
            status: value.status(),
            error: anyhow::Error::from(value).context("input validation error"),
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status;
        (status, axum::Json(self)).into_response()
    }
}
