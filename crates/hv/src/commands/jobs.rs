//! `hv jobs` -- harvest pass history.

use anyhow::Result;

use harvest_storage::Storage;

use crate::cli::JobsArgs;
use crate::context::RuntimeContext;
use crate::output::{JOB_HEADERS, format_job_failure, format_job_row, output_json, output_table};

pub fn run(ctx: &RuntimeContext, args: &JobsArgs) -> Result<()> {
    let (_, store) = ctx.open_store()?;
    let jobs = store.list_harvest_jobs(args.limit)?;

    if ctx.json {
        output_json(&jobs);
        return Ok(());
    }
    if jobs.is_empty() {
        println!("No harvest jobs recorded.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = jobs.iter().map(format_job_row).collect();
    output_table(JOB_HEADERS, &rows);

    let failures: Vec<String> = jobs.iter().filter_map(format_job_failure).collect();
    if !failures.is_empty() {
        println!();
        for line in failures {
            println!("{line}");
        }
    }
    Ok(())
}
