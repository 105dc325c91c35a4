//! Incident tracking of monitored resources: opening, resolving, reopening,
//! and deleting incidents, their event timelines, the side-effects of
//! lifecycle transitions, and reconciliation of abandoned test runs.
use models::{AccountId, Id, IdGenerator};
use std::sync::{Arc, Mutex};

pub mod dispatch;
mod error;
pub mod lifecycle;
pub mod ownership;
pub mod staleness;
pub mod store;
pub mod timeline;

#[cfg(test)]
mod test_support;

pub use dispatch::Dispatcher;
pub use error::{Error, Result, StoreError, StoreResult};
pub use lifecycle::{IncidentDetail, Lifecycle, OpenIncident};
pub use staleness::Reconciler;
pub use store::{MemoryStore, PgStore, Store};
pub use timeline::Timeline;

/// Caller is the principal on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// An authenticated account, which may act only on resources it owns.
    User(AccountId),
    /// The probing engine and other internal automation.
    System,
}

impl Caller {
    pub fn account(&self) -> Option<AccountId> {
        match self {
            Caller::User(account) => Some(*account),
            Caller::System => None,
        }
    }
}

impl std::fmt::Display for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Caller::User(account) => write!(f, "user:{account}"),
            Caller::System => f.write_str("system"),
        }
    }
}

/// Ids is a shared generator of new entity ids.
#[derive(Debug, Clone)]
pub struct Ids(Arc<Mutex<IdGenerator>>);

impl Ids {
    pub fn new(shard: u16) -> Self {
        Self(Arc::new(Mutex::new(IdGenerator::new(shard))))
    }

    pub fn next(&self) -> Id {
        self.0.lock().unwrap().next()
    }
}
