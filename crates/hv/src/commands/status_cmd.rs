//! `hv status` -- current reload, last finished reload and data freshness.

use anyhow::Result;
use serde::Serialize;

use harvest_core::reload::ReloadTracking;
use harvest_storage::Storage;
use harvest_ui::styles::{format_age, render_category, render_muted, render_pass, render_warn};

use crate::context::{RuntimeContext, SourceMode};
use crate::output::{format_reload_detail, output_json};

#[derive(Serialize)]
struct StatusView {
    active: Option<ReloadTracking>,
    last_finished: Option<ReloadTracking>,
    issue_count: i64,
    reload_needed: bool,
    refresh_interval_hours: u32,
}

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let engine = ctx.engine(SourceMode::Optional)?;
    let view = StatusView {
        active: engine.coordinator.active_reload()?,
        last_finished: engine.store.latest_finished_reload()?,
        issue_count: engine.store.count_issues()?,
        reload_needed: engine.coordinator.reload_needed()?,
        refresh_interval_hours: engine.config.reload.refresh_interval_hours,
    };

    if ctx.json {
        output_json(&view);
        return Ok(());
    }

    let now = engine.clock.now();
    println!("{}", render_category("Active reload"));
    match &view.active {
        Some(r) => println!("{}", format_reload_detail(r, now)),
        None => println!("{}", render_muted("none")),
    }
    println!();

    println!("{}", render_category("Last finished reload"));
    match &view.last_finished {
        Some(r) => {
            println!("{}", format_reload_detail(r, now));
            println!("Age:       {}", format_age(r.reload_started, now));
        }
        None => println!("{}", render_muted("none")),
    }
    println!();

    println!("Issues stored: {}", view.issue_count);
    if view.reload_needed {
        println!(
            "{}",
            render_warn(&format!(
                "Reload due (refresh interval {}h). Run 'hv reload run'.",
                view.refresh_interval_hours
            ))
        );
    } else if view.active.is_none() {
        println!("{}", render_pass("Data is fresh."));
    }
    Ok(())
}
