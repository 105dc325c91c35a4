//! Rendering of incident notification emails.
//!
//! Each template kind registers a subject and a body template with the
//! handlebars registry. Templates are rendered against an `IncidentNotice`,
//! which carries every field they need so that rendering never goes back to
//! the database.
use anyhow::Context;
use chrono::{DateTime, Utc};
use models::{AccountId, Id, ResolveMode, ResourceKind};
use serde::{Deserialize, Serialize};

mod incident_resolved;
mod new_incident;

/// TemplateKind selects the notification sent for a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    NewIncident,
    Resolved,
}

impl TemplateKind {
    pub fn name(&self) -> &'static str {
        match self {
            TemplateKind::NewIncident => "new_incident",
            TemplateKind::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// IncidentNotice is the denormalized state of an incident at the moment of
/// a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentNotice {
    pub incident_id: Id,
    pub owner_id: Option<AccountId>,
    pub kind: ResourceKind,
    pub resource_id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_mode: Option<ResolveMode>,
}

/// A rendered email, addressed to an account rather than an address.
/// The email transport resolves the account's registered address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEmail {
    pub idempotency_key: String,
    pub to_account_id: AccountId,
    pub template: TemplateKind,
    pub subject: String,
    pub body: String,
}

/// Returns the registered (subject, body) template names for the kind.
fn template_names(kind: TemplateKind) -> (String, String) {
    (
        format!("{}-subject", kind.name()),
        format!("{}-body", kind.name()),
    )
}

#[derive(Debug)]
pub struct Renderer {
    registry: handlebars::Handlebars<'static>,
    dashboard_base_url: String,
}

#[derive(Serialize)]
struct TemplateContext<'a> {
    #[serde(flatten)]
    notice: &'a IncidentNotice,
    dashboard_base_url: &'a str,
    resource_label: String,
    auto: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<String>,
}

impl Renderer {
    pub fn try_new(dashboard_base_url: impl Into<String>) -> anyhow::Result<Renderer> {
        let mut registry = handlebars::Handlebars::new();
        registry
            .register_partial(
                "incident_dashboard_url",
                "{{dashboard_base_url}}/incidents/{{incident_id}}",
            )
            .context("registering incident_dashboard_url partial")?;

        new_incident::register_templates(&mut registry)?;
        incident_resolved::register_templates(&mut registry)?;

        let dashboard_base_url = dashboard_base_url.into().trim_end_matches('/').to_string();
        Ok(Renderer {
            registry,
            dashboard_base_url,
        })
    }

    /// Render the email of the given kind for the notice. Notices without a
    /// resolved owner cannot be addressed and are an error.
    pub fn render(
        &self,
        kind: TemplateKind,
        notice: &IncidentNotice,
    ) -> anyhow::Result<NotificationEmail> {
        let Some(to_account_id) = notice.owner_id else {
            anyhow::bail!("incident {} has no owner to notify", notice.incident_id);
        };

        let resource_label = match &notice.resource_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{} {}", notice.kind, notice.resource_id),
        };
        let duration = notice.resolved_at.and_then(|resolved_at| {
            let elapsed = (resolved_at - notice.started_at).to_std().ok()?;
            // Sub-second precision is noise in an email.
            let elapsed = std::time::Duration::from_secs(elapsed.as_secs());
            Some(humantime::format_duration(elapsed).to_string())
        });
        let context = TemplateContext {
            notice,
            dashboard_base_url: &self.dashboard_base_url,
            resource_label,
            auto: notice.resolve_mode == Some(ResolveMode::Auto),
            duration,
        };

        let (subject_name, body_name) = template_names(kind);
        let subject = self
            .registry
            .render(&subject_name, &context)
            .with_context(|| format!("rendering {subject_name}"))?;
        let body = self
            .registry
            .render(&body_name, &context)
            .with_context(|| format!("rendering {body_name}"))?;

        let transitioned_at = match kind {
            TemplateKind::NewIncident => notice.started_at,
            TemplateKind::Resolved => notice.resolved_at.unwrap_or(notice.started_at),
        };

        Ok(NotificationEmail {
            idempotency_key: format!(
                "{}-{}-{}",
                notice.incident_id,
                kind,
                transitioned_at.timestamp_millis()
            ),
            to_account_id,
            template: kind,
            subject: subject.trim().to_string(),
            body,
        })
    }
}
