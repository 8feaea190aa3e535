//! `hv recover` -- roll back reloads left running by a crash.

use anyhow::Result;

use crate::context::{RuntimeContext, SourceMode};
use crate::output::{output_json, output_table};

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let engine = ctx.engine(SourceMode::Optional)?;
    let recovered = engine.coordinator.recover()?;

    if ctx.json {
        output_json(&recovered);
        return Ok(());
    }
    if recovered.is_empty() {
        println!("No interrupted reloads.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = recovered
        .iter()
        .map(|r| {
            vec![
                r.reload_id.to_string(),
                r.reload_started.format("%Y-%m-%d %H:%M").to_string(),
                r.issues_rolled_back.to_string(),
            ]
        })
        .collect();
    output_table(&["RELOAD", "STARTED", "ROLLED BACK"], &rows);
    Ok(())
}
