//! Shared data model of the incident subsystem.
//!
//! These types cross every boundary: they're persisted by the incident store,
//! carried in side-effect tasks, and serialized over the REST API.
mod id;
mod incidents;
mod runs;

pub use id::{Id, IdGenerator};
pub use incidents::{
    Event, EventType, Incident, IncidentFilter, IncidentState, Resource, ResourceKind,
    ResolveMode, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
pub use runs::{RunKind, RunStatus, TestRun};

/// Accounts are identified by the `sub` claim of their access token.
pub type AccountId = uuid::Uuid;

/// Error returned when parsing one of the string-encoded enums of this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {type_name} {value:?}")]
pub struct UnknownVariant {
    pub type_name: &'static str,
    pub value: String,
}
