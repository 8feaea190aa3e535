//! `hv serve` -- startup recovery, an optional startup reload, then the
//! scheduler loop until Ctrl+C.

use std::sync::atomic::Ordering;

use anyhow::Result;
use tracing::info;

use harvest_engine::{EngineError, Scheduler, StartupReport};

use crate::context::{Engine, RuntimeContext, SourceMode};
use crate::output::{format_reload_detail, output_json};
use crate::{SERVING, SHUTDOWN};

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let engine = ctx.engine(SourceMode::Required)?;
    SERVING.store(true, Ordering::SeqCst);

    match engine.coordinator.recover_and_maybe_trigger() {
        Ok(startup) => print_startup(ctx, &engine, &startup),
        Err(EngineError::AlreadyRunning { reload_id }) => {
            info!(reload_id, "startup found a live reload, scheduler will wait for it");
            if ctx.json {
                output_json(&serde_json::json!({ "already_running": reload_id }));
            } else if !ctx.quiet {
                println!("Reload #{reload_id} is already running elsewhere; not starting another.");
            }
        }
        Err(e) => return Err(e.into()),
    }
    if !ctx.json && !ctx.quiet {
        println!("Scheduler running. Press Ctrl+C to stop.");
    }

    let scheduler = Scheduler::new(
        engine.coordinator.clone(),
        engine.clock.clone(),
        engine.config.incremental_interval(),
        engine.config.scheduler_poll(),
    );
    scheduler.run(&SHUTDOWN);

    info!("serve stopped");
    Ok(())
}

fn print_startup(ctx: &RuntimeContext, engine: &Engine, startup: &StartupReport) {
    if ctx.json {
        output_json(startup);
        return;
    }
    if ctx.quiet {
        return;
    }
    for r in &startup.recovered {
        println!(
            "Recovered reload #{} ({} issues rolled back)",
            r.reload_id, r.issues_rolled_back
        );
    }
    match &startup.reload {
        Some(reload) => {
            println!("{}", format_reload_detail(reload, engine.clock.now()));
            println!();
        }
        None => println!("Data is fresh, no startup reload needed."),
    }
}
