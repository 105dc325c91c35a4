use super::{template_names, TemplateKind};
use anyhow::Context;

pub fn register_templates(registry: &mut handlebars::Handlebars<'_>) -> anyhow::Result<()> {
    let (subject, body) = template_names(TemplateKind::Resolved);
    registry
        .register_template_string(
            &subject,
            r#"{{#if auto}}[Resolved] {{{resource_label}}} has recovered{{else}}[Resolved] Incident on {{{resource_label}}} was resolved{{/if}}"#,
        )
        .context("registering resolved-subject template")?;

    registry
        .register_template_string(
            &body,
            r#"<p class="body-text">
{{#if auto}}
    Good news! Your {{kind}} <span class="identifier">{{resource_label}}</span> has recovered.
{{else}}
    The incident on your {{kind}} <span class="identifier">{{resource_label}}</span> was marked as resolved.
{{/if}}
</p>
{{#if duration}}
<p class="body-text">It was failing for <strong>{{duration}}</strong>.</p>
{{/if}}
<a href="{{> incident_dashboard_url}}" class="button">View incident timeline</a>"#,
        )
        .context("registering resolved-body template")?;

    Ok(())
}
