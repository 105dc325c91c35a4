use crate::{ownership, Caller, Error, Ids, Result, Store};
use chrono::Utc;
use models::{AccountId, Event, EventType, Id};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Maximum length of a comment, in characters.
pub const MAX_COMMENT_LENGTH: usize = 10_000;

/// Timeline manages the events of incidents. System events are appended by
/// `Lifecycle`; comments are authored, edited, and deleted here.
#[derive(Debug, Clone)]
pub struct Timeline {
    store: Arc<dyn Store>,
    ids: Ids,
}

/// CommentBody is the content of a new or edited comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CommentBody {
    #[validate(length(min = 1, max = (MAX_COMMENT_LENGTH as u64)))]
    pub content: String,
}

fn validate_comment(content: &str) -> Result<CommentBody> {
    let body = CommentBody {
        content: content.trim().to_string(),
    };
    body.validate()?;
    Ok(body)
}

impl Timeline {
    pub fn new(store: Arc<dyn Store>, ids: Ids) -> Self {
        Self { store, ids }
    }

    /// Lists the incident's events, newest first.
    pub async fn list(&self, caller: Caller, incident_id: Id) -> Result<Vec<Event>> {
        ownership::authorize_incident(self.store.as_ref(), caller, incident_id).await?;
        Ok(self.store.list_events(incident_id).await?)
    }

    #[tracing::instrument(skip(self, content))]
    pub async fn add_comment(
        &self,
        actor: AccountId,
        incident_id: Id,
        content: &str,
    ) -> Result<Event> {
        let CommentBody { content } = validate_comment(content)?;
        ownership::authorize_incident(self.store.as_ref(), Caller::User(actor), incident_id)
            .await?;

        let now = Utc::now();
        let event = Event {
            id: self.ids.next(),
            incident_id,
            actor_id: Some(actor),
            event_type: EventType::Comment,
            content,
            created_at: now,
            updated_at: None,
        };
        self.store.insert_event(&event).await?;
        self.store.touch_incident(incident_id, now).await?;

        tracing::info!(event_id = %event.id, "added comment");
        Ok(event)
    }

    #[tracing::instrument(skip(self, content))]
    pub async fn edit_comment(
        &self,
        actor: AccountId,
        event_id: Id,
        content: &str,
    ) -> Result<Event> {
        let event = self.authorize_comment(actor, event_id).await?;
        let CommentBody { content } = validate_comment(content)?;

        let now = Utc::now();
        let Some(updated) = self.store.update_comment(event_id, &content, now).await? else {
            // Deleted concurrently.
            return Err(Error::NotFound("event"));
        };
        self.store.touch_incident(event.incident_id, now).await?;

        tracing::info!("edited comment");
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_comment(&self, actor: AccountId, event_id: Id) -> Result<()> {
        self.authorize_comment(actor, event_id).await?;

        if !self.store.delete_comment(event_id).await? {
            return Err(Error::NotFound("event"));
        }
        tracing::info!("deleted comment");
        Ok(())
    }

    /// Loads the event and verifies it's a comment authored by the actor,
    /// on an incident of a resource the actor owns.
    async fn authorize_comment(&self, actor: AccountId, event_id: Id) -> Result<Event> {
        let Some(event) = self.store.fetch_event(event_id).await? else {
            return Err(Error::NotFound("event"));
        };
        let caller = Caller::User(actor);
        match ownership::authorize_incident(self.store.as_ref(), caller, event.incident_id).await {
            Ok(_) => (),
            Err(Error::NotFound(_)) => return Err(Error::NotFound("event")),
            Err(err) => return Err(err),
        }

        if event.event_type.is_system() {
            return Err(Error::InvalidState(format!(
                "{} events can't be modified",
                event.event_type
            )));
        }
        if event.actor_id != Some(actor) {
            return Err(Error::Forbidden("only the author may modify a comment"));
        }
        Ok(event)
    }
}
