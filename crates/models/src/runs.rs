use crate::{AccountId, Id, UnknownVariant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// RunKind is the kind of a long-running test which is driven by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Load,
    Browser,
}

impl RunKind {
    pub fn name(&self) -> &'static str {
        match self {
            RunKind::Load => "load",
            RunKind::Browser => "browser",
        }
    }
}

impl std::str::FromStr for RunKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "load" => Ok(RunKind::Load),
            "browser" => Ok(RunKind::Browser),
            _ => Err(UnknownVariant {
                type_name: "run kind",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    /// The client went away without reporting a terminal status.
    Abandoned,
}

impl RunStatus {
    pub fn name(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for status in [
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
            RunStatus::Abandoned,
        ] {
            if s == status.name() {
                return Ok(status);
            }
        }
        Err(UnknownVariant {
            type_name: "run status",
            value: s.to_string(),
        })
    }
}

/// TestRun is a record of a client-driven load or browser test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRun {
    pub id: Id,
    pub owner_id: AccountId,
    pub kind: RunKind,
    pub status: RunStatus,
    pub target_url: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}
