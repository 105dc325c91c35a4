use super::{template_names, TemplateKind};
use anyhow::Context;

pub fn register_templates(registry: &mut handlebars::Handlebars<'_>) -> anyhow::Result<()> {
    let (subject, body) = template_names(TemplateKind::NewIncident);
    registry
        .register_template_string(&subject, r#"[Down] {{{resource_label}}} is failing"#)
        .context("registering new_incident-subject template")?;

    registry
        .register_template_string(
            &body,
            r#"<p class="body-text">
    Your {{kind}} <span class="identifier">{{resource_label}}</span> started failing at <strong>{{started_at}}</strong>.
</p>
{{#if cause}}
<p class="body-text">
    Cause: <strong>{{cause}}</strong>{{#if http_status}} (HTTP {{http_status}}){{/if}}
</p>
{{else}}{{#if http_status}}
<p class="body-text">The target responded with HTTP <strong>{{http_status}}</strong>.</p>
{{/if}}{{/if}}
{{#if resource_url}}
<p class="body-text">Target: <span class="identifier">{{resource_url}}</span></p>
{{/if}}
<a href="{{> incident_dashboard_url}}" class="button">View incident</a>"#,
        )
        .context("registering new_incident-body template")?;

    Ok(())
}
