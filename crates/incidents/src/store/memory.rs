use super::Store;
use crate::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use models::{
    AccountId, Event, EventType, Id, Incident, IncidentFilter, Resource, ResourceKind, RunStatus,
    TestRun,
};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// MemoryStore is a `Store` held entirely in process memory, with the same
/// constraints as the database schema. It backs tests and local development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    resources: BTreeMap<(ResourceKind, Id), Resource>,
    incidents: BTreeMap<Id, Incident>,
    events: BTreeMap<Id, Event>,
    runs: BTreeMap<Id, TestRun>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_resource(&self, resource: Resource) {
        let mut inner = self.inner.lock().unwrap();
        inner.resources.insert((resource.kind, resource.id), resource);
    }

    pub fn remove_resource(&self, kind: ResourceKind, id: Id) -> Option<Resource> {
        self.inner.lock().unwrap().resources.remove(&(kind, id))
    }

    pub fn insert_test_run(&self, run: TestRun) {
        self.inner.lock().unwrap().runs.insert(run.id, run);
    }

    /// Moves a running test run into a terminal status, as a client
    /// reporting completion would.
    pub fn finish_test_run(&self, id: Id, status: RunStatus, at: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.runs.get_mut(&id) {
            Some(run) if run.status == RunStatus::Running => {
                run.status = status;
                run.finished_at = Some(at);
                true
            }
            _ => false,
        }
    }

    pub fn event_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }
}

impl Inner {
    fn has_open_incident(&self, kind: ResourceKind, resource_id: Id, except: Option<Id>) -> bool {
        self.incidents.values().any(|i| {
            i.kind == kind
                && i.resource_id == resource_id
                && i.is_open()
                && Some(i.id) != except
        })
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn fetch_resource(&self, kind: ResourceKind, id: Id) -> StoreResult<Option<Resource>> {
        Ok(self.inner.lock().unwrap().resources.get(&(kind, id)).cloned())
    }

    async fn fetch_incident(&self, id: Id) -> StoreResult<Option<Incident>> {
        Ok(self.inner.lock().unwrap().incidents.get(&id).cloned())
    }

    async fn find_open_incident(
        &self,
        kind: ResourceKind,
        resource_id: Id,
    ) -> StoreResult<Option<Incident>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .incidents
            .values()
            .find(|i| i.kind == kind && i.resource_id == resource_id && i.is_open())
            .cloned())
    }

    async fn list_incidents(
        &self,
        owner_id: AccountId,
        filter: &IncidentFilter,
    ) -> StoreResult<Vec<Incident>> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Incident> = inner
            .incidents
            .values()
            .filter(|i| i.owner_id == Some(owner_id) && filter.matches(i))
            .cloned()
            .collect();

        out.sort_by(|l, r| (r.last_update_at, r.id).cmp(&(l.last_update_at, l.id)));

        Ok(out
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect())
    }

    async fn insert_incident(&self, incident: &Incident) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();

        if incident.is_open() && inner.has_open_incident(incident.kind, incident.resource_id, None)
        {
            return Err(StoreError::UniqueViolation(format!(
                "{} {} already has an open incident",
                incident.kind, incident.resource_id
            )));
        }
        if inner.incidents.contains_key(&incident.id) {
            return Err(StoreError::UniqueViolation(format!(
                "incident {} already exists",
                incident.id
            )));
        }
        inner.incidents.insert(incident.id, incident.clone());
        Ok(())
    }

    async fn resolve_incident(
        &self,
        id: Id,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<Option<Incident>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.incidents.get_mut(&id) {
            Some(incident) if incident.is_open() => {
                incident.resolved_at = Some(resolved_at);
                incident.last_update_at = resolved_at;
                Ok(Some(incident.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn reopen_incident(&self, id: Id, at: DateTime<Utc>) -> StoreResult<Option<Incident>> {
        let mut inner = self.inner.lock().unwrap();

        let Some((kind, resource_id)) = inner
            .incidents
            .get(&id)
            .filter(|i| !i.is_open())
            .map(|i| (i.kind, i.resource_id))
        else {
            return Ok(None);
        };
        if inner.has_open_incident(kind, resource_id, Some(id)) {
            return Err(StoreError::UniqueViolation(format!(
                "{kind} {resource_id} already has an open incident"
            )));
        }

        let Some(incident) = inner.incidents.get_mut(&id) else {
            return Ok(None);
        };
        incident.resolved_at = None;
        incident.last_update_at = at;
        Ok(Some(incident.clone()))
    }

    async fn touch_incident(&self, id: Id, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(incident) = self.inner.lock().unwrap().incidents.get_mut(&id) {
            incident.last_update_at = incident.last_update_at.max(at);
        }
        Ok(())
    }

    async fn set_screenshot_ref(&self, id: Id, reference: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.incidents.get_mut(&id) {
            Some(incident) if incident.screenshot_ref.is_none() => {
                incident.screenshot_ref = Some(reference.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_incident(&self, id: Id) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.incidents.remove(&id).is_none() {
            return Ok(false);
        }
        inner.events.retain(|_, event| event.incident_id != id);
        Ok(true)
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.incidents.contains_key(&event.incident_id) {
            return Err(anyhow::anyhow!(
                "event {} references missing incident {}",
                event.id,
                event.incident_id
            )
            .into());
        }
        inner.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn fetch_event(&self, id: Id) -> StoreResult<Option<Event>> {
        Ok(self.inner.lock().unwrap().events.get(&id).cloned())
    }

    async fn list_events(&self, incident_id: Id) -> StoreResult<Vec<Event>> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Event> = inner
            .events
            .values()
            .filter(|e| e.incident_id == incident_id)
            .cloned()
            .collect();

        out.sort_by(|l, r| (r.created_at, r.id).cmp(&(l.created_at, l.id)));
        Ok(out)
    }

    async fn update_comment(
        &self,
        id: Id,
        content: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Event>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.events.get_mut(&id) {
            Some(event) if event.event_type == EventType::Comment => {
                event.content = content.to_string();
                event.updated_at = Some(updated_at);
                Ok(Some(event.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_comment(&self, id: Id) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let is_comment = matches!(
            inner.events.get(&id),
            Some(event) if event.event_type == EventType::Comment
        );
        if is_comment {
            inner.events.remove(&id);
        }
        Ok(is_comment)
    }

    async fn fetch_test_run(&self, id: Id) -> StoreResult<Option<TestRun>> {
        Ok(self.inner.lock().unwrap().runs.get(&id).cloned())
    }

    async fn abandon_test_run(&self, id: Id, at: DateTime<Utc>) -> StoreResult<bool> {
        Ok(self.finish_test_run(id, RunStatus::Abandoned, at))
    }
}
