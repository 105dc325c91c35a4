use crate::{Caller, Error, Result, Store};
use chrono::{DateTime, Utc};
use models::{Id, RunStatus, TestRun};
use std::sync::Arc;
use std::time::Duration;

/// Default age after which a running test run is presumed abandoned.
pub const DEFAULT_STALE_RUN_THRESHOLD: Duration = Duration::from_secs(15 * 60);

/// Reconciler flips test runs whose driving client went away into the
/// `abandoned` status. It runs as part of reads, so there's no background
/// sweep: a stale run is corrected the first time anyone looks at it.
#[derive(Debug, Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
    threshold: chrono::Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, threshold: Duration) -> Self {
        let threshold = chrono::Duration::from_std(threshold)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        Self { store, threshold }
    }

    /// Fetches the test run, reconciling it if it's stale.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_test_run(&self, caller: Caller, run_id: Id) -> Result<TestRun> {
        let run = match self.store.fetch_test_run(run_id).await? {
            Some(run) if caller.account().map_or(true, |a| a == run.owner_id) => run,
            _ => return Err(Error::NotFound("test run")),
        };
        let (run, _abandoned) = self.reconcile(run, Utc::now()).await?;
        Ok(run)
    }

    pub fn is_stale(&self, run: &TestRun, now: DateTime<Utc>) -> bool {
        run.status == RunStatus::Running && now - run.started_at > self.threshold
    }

    /// Returns the current run, and whether this call abandoned it.
    /// Of concurrent reconciliations of a run, exactly one abandons it.
    async fn reconcile(&self, run: TestRun, now: DateTime<Utc>) -> Result<(TestRun, bool)> {
        if !self.is_stale(&run, now) {
            return Ok((run, false));
        }

        if self.store.abandon_test_run(run.id, now).await? {
            tracing::info!(
                run_id = %run.id,
                kind = ?run.kind,
                started_at = %run.started_at,
                "abandoned stale test run"
            );
            return Ok((
                TestRun {
                    status: RunStatus::Abandoned,
                    finished_at: Some(now),
                    ..run
                },
                true,
            ));
        }

        // The run was concurrently completed or abandoned. Return its current state.
        match self.store.fetch_test_run(run.id).await? {
            Some(current) => Ok((current, false)),
            None => Err(Error::NotFound("test run")),
        }
    }
}
