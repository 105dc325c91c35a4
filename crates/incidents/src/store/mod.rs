use crate::StoreResult;
use chrono::{DateTime, Utc};
use models::{AccountId, Event, Id, Incident, IncidentFilter, Resource, ResourceKind, TestRun};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store is the persistence seam of incidents, their events, the resources
/// they're opened against, and test runs.
///
/// Writes which are conditioned on current state (resolving, reopening,
/// abandoning a run, attaching a screenshot) are atomic compare-and-set
/// operations: they return None / false when the precondition didn't hold,
/// and exactly one of any set of racing callers observes success.
#[async_trait::async_trait]
pub trait Store: std::fmt::Debug + Send + Sync + 'static {
    async fn fetch_resource(&self, kind: ResourceKind, id: Id) -> StoreResult<Option<Resource>>;

    async fn fetch_incident(&self, id: Id) -> StoreResult<Option<Incident>>;

    /// Returns the open incident of the resource, if there is one.
    async fn find_open_incident(
        &self,
        kind: ResourceKind,
        resource_id: Id,
    ) -> StoreResult<Option<Incident>>;

    /// Lists incidents of the owner, most recently updated first.
    async fn list_incidents(
        &self,
        owner_id: AccountId,
        filter: &IncidentFilter,
    ) -> StoreResult<Vec<Incident>>;

    /// Inserts a new incident. Fails with `UniqueViolation` if the resource
    /// already has an open incident.
    async fn insert_incident(&self, incident: &Incident) -> StoreResult<()>;

    /// Marks an open incident as resolved.
    async fn resolve_incident(
        &self,
        id: Id,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<Option<Incident>>;

    /// Clears the resolution of a resolved incident. Fails with
    /// `UniqueViolation` if the resource has since opened another incident.
    async fn reopen_incident(&self, id: Id, at: DateTime<Utc>) -> StoreResult<Option<Incident>>;

    async fn touch_incident(&self, id: Id, at: DateTime<Utc>) -> StoreResult<()>;

    /// Attaches a screenshot reference if the incident doesn't have one.
    async fn set_screenshot_ref(&self, id: Id, reference: &str) -> StoreResult<bool>;

    /// Deletes the incident and all of its events.
    async fn delete_incident(&self, id: Id) -> StoreResult<bool>;

    async fn insert_event(&self, event: &Event) -> StoreResult<()>;

    async fn fetch_event(&self, id: Id) -> StoreResult<Option<Event>>;

    /// Lists events of the incident, newest first.
    async fn list_events(&self, incident_id: Id) -> StoreResult<Vec<Event>>;

    /// Replaces the content of a comment event. System events are never updated.
    async fn update_comment(
        &self,
        id: Id,
        content: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Event>>;

    /// Deletes a comment event. System events are never deleted.
    async fn delete_comment(&self, id: Id) -> StoreResult<bool>;

    async fn fetch_test_run(&self, id: Id) -> StoreResult<Option<TestRun>>;

    /// Marks a running test run as abandoned.
    async fn abandon_test_run(&self, id: Id, at: DateTime<Utc>) -> StoreResult<bool>;
}
