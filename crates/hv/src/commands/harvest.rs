//! `hv harvest` -- one incremental pass outside any reload.

use anyhow::Result;

use crate::context::{RuntimeContext, SourceMode};
use crate::output::{format_harvest_report, output_json};

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let engine = ctx.engine(SourceMode::Required)?;
    let report = engine.harvester.run_incremental()?;

    if ctx.json {
        output_json(&report);
    } else {
        if let Some(job) = report.job_id {
            println!("Harvest job #{job}");
        }
        println!("{}", format_harvest_report(&report));
    }
    Ok(())
}
