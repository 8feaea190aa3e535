//! `hv reload` -- run, show and list full reloads.

use anyhow::{Context, Result, bail};
use chrono::Utc;

use harvest_core::enums::ReloadStatus;
use harvest_core::reload::ReloadFilter;
use harvest_engine::EngineError;
use harvest_storage::Storage;

use crate::cli::{ReloadArgs, ReloadCommands, ReloadListArgs, ReloadRunArgs, ReloadShowArgs};
use crate::context::{RuntimeContext, SourceMode};
use crate::output::{
    RELOAD_HEADERS, format_harvest_report, format_reload_detail, format_reload_row, output_json,
    output_table,
};

pub fn run(ctx: &RuntimeContext, args: &ReloadArgs) -> Result<()> {
    match &args.command {
        ReloadCommands::Run(a) => run_reload(ctx, a),
        ReloadCommands::Show(a) => show(ctx, a),
        ReloadCommands::List(a) => list(ctx, a),
    }
}

fn run_reload(ctx: &RuntimeContext, args: &ReloadRunArgs) -> Result<()> {
    let engine = ctx.engine(SourceMode::Required)?;
    if !ctx.quiet && !ctx.json {
        eprintln!("Reloading (this can take a while)...");
    }

    let outcome = match engine.coordinator.trigger_manual(&ctx.actor, args.force) {
        Ok(outcome) => outcome,
        Err(EngineError::AlreadyRunning { reload_id }) => bail!(
            "reload {reload_id} is already running\n\
             Wait for it to finish, or use 'hv reload run --force' to supersede it."
        ),
        Err(e) => return Err(e.into()),
    };

    if ctx.json {
        output_json(&outcome);
    } else {
        println!("{}", format_reload_detail(&outcome.reload, engine.clock.now()));
        println!();
        println!("{}", format_harvest_report(&outcome.report));
    }
    Ok(())
}

fn show(ctx: &RuntimeContext, args: &ReloadShowArgs) -> Result<()> {
    let (_, store) = ctx.open_store()?;
    let reload = store.get_reload(args.id)?;

    if ctx.json {
        output_json(&reload);
    } else {
        println!("{}", format_reload_detail(&reload, Utc::now()));
    }
    Ok(())
}

fn list(ctx: &RuntimeContext, args: &ReloadListArgs) -> Result<()> {
    let status = args
        .status
        .as_deref()
        .map(str::parse::<ReloadStatus>)
        .transpose()
        .context("invalid --status")?;
    let (_, store) = ctx.open_store()?;
    let reloads = store.list_reloads(&ReloadFilter {
        status,
        limit: Some(args.limit),
    })?;

    if ctx.json {
        output_json(&reloads);
        return Ok(());
    }
    if reloads.is_empty() {
        println!("No reloads recorded.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = reloads.iter().map(format_reload_row).collect();
    output_table(RELOAD_HEADERS, &rows);
    Ok(())
}
