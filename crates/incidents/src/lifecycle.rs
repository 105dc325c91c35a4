use crate::dispatch::{self, Dispatcher, Task};
use crate::{ownership, Caller, Error, Ids, Result, Store, StoreError};
use chrono::{DateTime, Utc};
use models::{
    AccountId, Event, EventType, Id, Incident, IncidentFilter, ResolveMode, ResourceKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Maximum length of an incident's cause, in characters.
pub const MAX_CAUSE_LENGTH: usize = 256;

const STARTED_MESSAGE: &str = "Incident started";
const REOPENED_MESSAGE: &str = "Incident reopened";

/// OpenIncident is a request to open an incident against a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct OpenIncident {
    pub kind: ResourceKind,
    pub resource_id: Id,
    #[serde(default)]
    #[validate(length(max = (MAX_CAUSE_LENGTH as u64)))]
    pub cause: Option<String>,
    #[serde(default)]
    #[validate(range(min = 100, max = 599))]
    pub http_status: Option<u16>,
    /// Owner of the incident. Honored only for system callers, and resolved
    /// from the resource if omitted.
    #[serde(default)]
    pub owner_id: Option<AccountId>,
}

/// An incident together with its timeline, newest event first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentDetail {
    #[serde(flatten)]
    pub incident: Incident,
    pub events: Vec<Event>,
}

/// Lifecycle implements the state machine of incidents:
/// open -> resolved -> (re)open, and deletion.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    ids: Ids,
}

fn conflict(err: StoreError, kind: ResourceKind, resource_id: Id) -> Error {
    match err {
        StoreError::UniqueViolation(_) => Error::Conflict { kind, resource_id },
        StoreError::Other(err) => Error::Internal(err),
    }
}

impl Lifecycle {
    pub fn new(store: Arc<dyn Store>, dispatcher: Dispatcher, ids: Ids) -> Self {
        Self {
            store,
            dispatcher,
            ids,
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(%caller, kind = %req.kind, resource_id = %req.resource_id)
    )]
    pub async fn open(&self, caller: Caller, req: OpenIncident) -> Result<Incident> {
        req.validate()?;
        let OpenIncident {
            kind,
            resource_id,
            cause,
            http_status,
            owner_id,
        } = req;

        let resource =
            ownership::authorize_resource(self.store.as_ref(), caller, kind, resource_id).await?;
        let owner_id = match caller {
            Caller::User(account) => account,
            Caller::System => match owner_id.or(resource.as_ref().map(|r| r.owner_id)) {
                Some(owner_id) => owner_id,
                None => return Err(Error::NotFound("resource")),
            },
        };

        if self
            .store
            .find_open_incident(kind, resource_id)
            .await?
            .is_some()
        {
            return Err(Error::Conflict { kind, resource_id });
        }

        let now = Utc::now();
        let cause = cause
            .map(|cause| cause.trim().to_string())
            .filter(|cause| !cause.is_empty());
        let incident = Incident {
            id: self.ids.next(),
            kind,
            resource_id,
            owner_id: Some(owner_id),
            cause,
            http_status,
            started_at: now,
            resolved_at: None,
            last_update_at: now,
            screenshot_ref: None,
        };

        // Racing opens are arbitrated by the store's uniqueness constraint.
        self.store
            .insert_incident(&incident)
            .await
            .map_err(|err| conflict(err, kind, resource_id))?;

        let content = incident.cause.as_deref().unwrap_or(STARTED_MESSAGE);
        self.append_event(incident.id, EventType::Started, content, now)
            .await?;

        tracing::info!(
            incident_id = %incident.id,
            %owner_id,
            cause = ?incident.cause,
            "opened incident"
        );
        self.dispatcher.schedule(Task::NewIncident(dispatch::notice(
            &incident,
            resource.as_ref(),
            None,
        )));

        Ok(incident)
    }

    #[tracing::instrument(skip(self))]
    pub async fn resolve(
        &self,
        caller: Caller,
        incident_id: Id,
        mode: ResolveMode,
    ) -> Result<Incident> {
        if mode == ResolveMode::Auto && caller != Caller::System {
            return Err(Error::Forbidden("only the system may auto-resolve incidents"));
        }
        let (incident, resource) =
            ownership::authorize_incident(self.store.as_ref(), caller, incident_id).await?;

        if !incident.is_open() {
            return Err(already_resolved(incident_id));
        }
        let now = Utc::now();
        let Some(incident) = self.store.resolve_incident(incident_id, now).await? else {
            // Lost a race with a concurrent resolution.
            return Err(already_resolved(incident_id));
        };

        self.append_event(incident_id, mode.event_type(), mode.message(), now)
            .await?;

        tracing::info!(%mode, "resolved incident");
        self.dispatcher.schedule(Task::Resolved(dispatch::notice(
            &incident,
            resource.as_ref(),
            Some(mode),
        )));

        Ok(incident)
    }

    /// Auto-resolves the open incident of a resource which has recovered.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self, kind: ResourceKind, resource_id: Id) -> Result<Incident> {
        let Some(incident) = self.store.find_open_incident(kind, resource_id).await? else {
            return Err(Error::NotFound("open incident"));
        };
        self.resolve(Caller::System, incident.id, ResolveMode::Auto)
            .await
    }

    /// Reopens a resolved incident. Reopening doesn't notify the owner.
    #[tracing::instrument(skip(self))]
    pub async fn reopen(&self, caller: Caller, incident_id: Id) -> Result<Incident> {
        let (incident, _resource) =
            ownership::authorize_incident(self.store.as_ref(), caller, incident_id).await?;

        if incident.is_open() {
            return Err(Error::InvalidState(format!(
                "incident {incident_id} is already open"
            )));
        }
        let now = Utc::now();
        let reopened = self
            .store
            .reopen_incident(incident_id, now)
            .await
            .map_err(|err| conflict(err, incident.kind, incident.resource_id))?;
        let Some(incident) = reopened else {
            return Err(Error::InvalidState(format!(
                "incident {incident_id} is already open"
            )));
        };

        self.append_event(incident_id, EventType::Started, REOPENED_MESSAGE, now)
            .await?;

        tracing::info!("reopened incident");
        Ok(incident)
    }

    /// Deletes the incident and its timeline.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, caller: Caller, incident_id: Id) -> Result<()> {
        ownership::authorize_incident(self.store.as_ref(), caller, incident_id).await?;

        if !self.store.delete_incident(incident_id).await? {
            return Err(Error::NotFound("incident"));
        }
        tracing::info!("deleted incident");
        Ok(())
    }

    pub async fn get(&self, caller: Caller, incident_id: Id) -> Result<IncidentDetail> {
        let (incident, _resource) =
            ownership::authorize_incident(self.store.as_ref(), caller, incident_id).await?;
        let events = self.store.list_events(incident_id).await?;

        Ok(IncidentDetail { incident, events })
    }

    pub async fn list(
        &self,
        owner_id: AccountId,
        filter: &IncidentFilter,
    ) -> Result<Vec<Incident>> {
        Ok(self.store.list_incidents(owner_id, filter).await?)
    }

    /// Captures the incident's screenshot on request of its owner.
    #[tracing::instrument(skip(self))]
    pub async fn capture_screenshot(&self, caller: Caller, incident_id: Id) -> Result<String> {
        ownership::authorize_incident(self.store.as_ref(), caller, incident_id).await?;

        match self.dispatcher.screenshots().capture(incident_id).await {
            Ok(reference) => Ok(reference),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    failure = err.failure(),
                    "failed to capture incident screenshot"
                );
                Err(err.into())
            }
        }
    }

    async fn append_event(
        &self,
        incident_id: Id,
        event_type: EventType,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<Event> {
        let event = Event {
            id: self.ids.next(),
            incident_id,
            actor_id: None,
            event_type,
            content: content.to_string(),
            created_at: at,
            updated_at: None,
        };
        self.store.insert_event(&event).await?;
        Ok(event)
    }
}

fn already_resolved(incident_id: Id) -> Error {
    Error::InvalidState(format!("incident {incident_id} is already resolved"))
}
