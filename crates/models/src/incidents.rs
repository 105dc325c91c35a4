use crate::{AccountId, Id, UnknownVariant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of incidents returned by a single listing.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
/// Upper bound on the number of incidents returned by a single listing.
pub const MAX_PAGE_LIMIT: u32 = 200;

/// ResourceKind is the taxonomy of monitored resources which may fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A continuously-polled uptime monitor.
    Monitor,
    /// A scheduled HTTP job.
    Cron,
}

impl ResourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Monitor => "monitor",
            ResourceKind::Cron => "cron",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for kind in [ResourceKind::Monitor, ResourceKind::Cron] {
            if s.eq_ignore_ascii_case(kind.name()) {
                return Ok(kind);
            }
        }
        Err(UnknownVariant {
            type_name: "resource kind",
            value: s.to_string(),
        })
    }
}

/// Resource is the owning view of a monitor or cron job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub id: Id,
    pub owner_id: AccountId,
    /// Display name of the resource.
    pub name: String,
    /// The URL which the resource probes or invokes.
    pub url: String,
}

/// Incident is a tracked failure episode of a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Id,
    pub kind: ResourceKind,
    pub resource_id: Id,
    /// Owning account. Null only for system-opened incidents whose owner
    /// could not be resolved yet.
    pub owner_id: Option<AccountId>,
    /// Free-form classification of the failure, such as "timeout".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Last observed HTTP status of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub started_at: DateTime<Utc>,
    /// Time of resolution, or None while the incident is open.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Time of the most recent event of this incident.
    pub last_update_at: DateTime<Utc>,
    /// Reference to a captured screenshot of the failure (monitors only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_ref: Option<String>,
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    pub fn state(&self) -> IncidentState {
        if self.is_open() {
            IncidentState::Open
        } else {
            IncidentState::Resolved
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    Open,
    Resolved,
}

/// EventType distinguishes lifecycle markers from human comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Started,
    Resolved,
    AutoResolved,
    Comment,
}

impl EventType {
    pub fn name(&self) -> &'static str {
        match self {
            EventType::Started => "started",
            EventType::Resolved => "resolved",
            EventType::AutoResolved => "auto_resolved",
            EventType::Comment => "comment",
        }
    }

    /// System events are written only by lifecycle transitions and are immutable.
    pub fn is_system(&self) -> bool {
        !matches!(self, EventType::Comment)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for EventType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(EventType::Started),
            "resolved" => Ok(EventType::Resolved),
            "auto_resolved" => Ok(EventType::AutoResolved),
            "comment" => Ok(EventType::Comment),
            _ => Err(UnknownVariant {
                type_name: "event type",
                value: s.to_string(),
            }),
        }
    }
}

/// Event is a single entry of an incident's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Id,
    pub incident_id: Id,
    /// Author of a comment. None for system events.
    pub actor_id: Option<AccountId>,
    pub event_type: EventType,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Time of the last edit of a comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// ResolveMode is how an incident came to be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMode {
    /// Resolved by a human.
    Manual,
    /// Resolved by the probing engine after observing recovery.
    Auto,
}

impl ResolveMode {
    pub fn event_type(&self) -> EventType {
        match self {
            ResolveMode::Manual => EventType::Resolved,
            ResolveMode::Auto => EventType::AutoResolved,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ResolveMode::Manual => "Incident resolved manually",
            ResolveMode::Auto => "Incident automatically resolved after recovery",
        }
    }
}

impl std::fmt::Display for ResolveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ResolveMode::Manual => "manual",
            ResolveMode::Auto => "auto",
        })
    }
}

/// IncidentFilter narrows and pages a listing of incidents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentFilter {
    #[serde(default)]
    pub state: Option<IncidentState>,
    #[serde(default)]
    pub kind: Option<ResourceKind>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

impl IncidentFilter {
    /// Effective page size, clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// Returns whether the incident passes the state and kind filters.
    pub fn matches(&self, incident: &Incident) -> bool {
        self.state.map_or(true, |s| s == incident.state())
            && self.kind.map_or(true, |k| k == incident.kind)
    }
}
