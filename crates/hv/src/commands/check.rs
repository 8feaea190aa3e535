//! `hv check` -- verify Jira connectivity and credentials.

use anyhow::{Context, Result};

use harvest_jira::{ExternalIssueSource, JiraSource};
use harvest_ui::styles::{ICON_PASS, render_pass};

use crate::context::{RuntimeContext, jira_settings};
use crate::output::output_json;

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let (_, config) = ctx.load_config()?;
    let source = JiraSource::new(jira_settings(&config))?;
    let identity = source
        .check_connection()
        .with_context(|| format!("cannot reach Jira at {}", config.jira.base_url))?;

    if ctx.json {
        output_json(&serde_json::json!({
            "ok": true,
            "base_url": config.jira.base_url,
            "identity": identity,
        }));
    } else {
        println!(
            "{}",
            render_pass(&format!(
                "{ICON_PASS} Connected to {} as {identity}",
                config.jira.base_url
            ))
        );
    }
    Ok(())
}
