use models::{Id, ResourceKind};

/// Error is the failure taxonomy of incident operations. Callers map it onto
/// their own surface (for example, HTTP status codes).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The entity doesn't exist, or isn't visible to the caller.
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("an open incident already exists for {kind} {resource_id}")]
    Conflict { kind: ResourceKind, resource_id: Id },
    /// The operation doesn't apply to the entity's current state.
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    InvalidArgument(String),
    /// A required collaborator (such as the renderer) isn't available.
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// StoreError is returned by `Store` implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            // Callers which expect a violation map it themselves.
            StoreError::UniqueViolation(msg) => {
                Error::Internal(anyhow::anyhow!("unexpected unique violation: {msg}"))
            }
            StoreError::Other(err) => Error::Internal(err),
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Error::InvalidArgument(err.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::UniqueViolation(db_err.message().to_string());
            }
        }
        StoreError::Other(anyhow::Error::from(err))
    }
}
