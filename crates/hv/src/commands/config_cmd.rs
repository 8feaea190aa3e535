//! `hv config` -- inspect the effective configuration.

use anyhow::{Context, Result};

use harvest_config::config::to_yaml;
use harvest_config::load_config;

use crate::cli::{ConfigArgs, ConfigCommands};
use crate::context::RuntimeContext;
use crate::output::output_json;

pub fn run(ctx: &RuntimeContext, args: &ConfigArgs) -> Result<()> {
    let harvest_dir = ctx.resolve_harvest_dir()?;

    match &args.command {
        ConfigCommands::Show => {
            // Not validated, so a broken config can still be inspected.
            let config = load_config(&harvest_dir)
                .with_context(|| format!("failed to load {}", harvest_dir.display()))?
                .redacted();
            if ctx.json {
                output_json(&config);
            } else {
                print!("{}", to_yaml(&config)?);
            }
        }
        ConfigCommands::Path => {
            if ctx.json {
                output_json(&serde_json::json!({ "harvest_dir": harvest_dir }));
            } else {
                println!("{}", harvest_dir.display());
            }
        }
    }
    Ok(())
}
