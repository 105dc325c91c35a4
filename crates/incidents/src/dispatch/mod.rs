//! Side-effects of incident lifecycle transitions.
//!
//! Tasks are scheduled by lifecycle operations after their writes have been
//! made, and run in the background. Their outcomes never affect the
//! transition which scheduled them: failures are logged and dropped, and
//! nothing is retried.
use models::{Incident, ResolveMode, Resource, ResourceKind};
use notifications::{IncidentNotice, TemplateKind};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

pub mod email;
pub mod screenshot;

pub use email::{EmailSender, Sender};
pub use screenshot::{
    CaptureError, CaptureOptions, HttpObjectStore, ObjectStore, PageRenderer, Renderer,
    ScreenshotError, Screenshots, Storage,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Sends the new-incident email and, for monitors, captures a screenshot.
    NewIncident(IncidentNotice),
    /// Sends the resolution email.
    Resolved(IncidentNotice),
}

impl Task {
    fn notice(&self) -> &IncidentNotice {
        match self {
            Task::NewIncident(notice) | Task::Resolved(notice) => notice,
        }
    }
}

/// Builds the notice of a transition of the incident.
pub fn notice(
    incident: &Incident,
    resource: Option<&Resource>,
    resolve_mode: Option<ResolveMode>,
) -> IncidentNotice {
    IncidentNotice {
        incident_id: incident.id,
        owner_id: incident.owner_id,
        kind: incident.kind,
        resource_id: incident.resource_id,
        resource_name: resource.map(|r| r.name.clone()),
        resource_url: resource.map(|r| r.url.clone()),
        cause: incident.cause.clone(),
        http_status: incident.http_status,
        started_at: incident.started_at,
        resolved_at: incident.resolved_at,
        resolve_mode,
    }
}

/// Dispatcher runs side-effect tasks in the background.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    templates: notifications::Renderer,
    sender: Arc<dyn EmailSender>,
    screenshots: Screenshots,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        templates: notifications::Renderer,
        sender: Arc<dyn EmailSender>,
        screenshots: Screenshots,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                templates,
                sender,
                screenshots,
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn screenshots(&self) -> &Screenshots {
        &self.inner.screenshots
    }

    /// Schedules the task and returns immediately.
    pub fn schedule(&self, task: Task) {
        let span = tracing::info_span!(
            "incident_task",
            incident_id = %task.notice().incident_id,
            kind = %task.notice().kind,
        );
        let inner = self.inner.clone();

        self.inner
            .tracker
            .spawn(async move { inner.run(task).await }.instrument(span));
    }

    /// Waits for all scheduled tasks to complete. Tasks may continue to be
    /// scheduled afterwards.
    pub async fn wait_idle(&self) {
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    /// Waits for all scheduled tasks to complete, as part of a graceful shutdown.
    pub async fn shutdown(&self) {
        let pending = self.inner.tracker.len();
        tracing::info!(%pending, "waiting for incident tasks to complete");
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

impl Inner {
    async fn run(&self, task: Task) {
        let (template, notice) = match &task {
            Task::NewIncident(notice) => (TemplateKind::NewIncident, notice),
            Task::Resolved(notice) => (TemplateKind::Resolved, notice),
        };

        let email = async {
            if let Err(error) = self.send_email(template, notice).await {
                tracing::warn!(?error, %template, "failed to send incident email (dropped)");
            }
        };
        let screenshot = async {
            if template != TemplateKind::NewIncident || notice.kind != ResourceKind::Monitor {
                return;
            }
            if let Err(error) = self.screenshots.capture(notice.incident_id).await {
                tracing::warn!(
                    ?error,
                    failure = error.failure(),
                    "failed to capture incident screenshot (dropped)"
                );
            }
        };
        tokio::join!(email, screenshot);
    }

    async fn send_email(
        &self,
        template: TemplateKind,
        notice: &IncidentNotice,
    ) -> anyhow::Result<()> {
        let email = self.templates.render(template, notice)?;
        self.sender.send(email).await
    }
}
