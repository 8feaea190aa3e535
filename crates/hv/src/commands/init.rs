//! `hv init` -- create a `.harvest` directory with a default config and an
//! empty database.

use std::env;
use std::fs;

use anyhow::{Context, Result, bail};

use harvest_config::config::CONFIG_FILE_NAME;
use harvest_config::{HarvestConfig, ensure_harvest_dir, save_config};
use harvest_storage::SqliteStore;

use crate::cli::InitArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Keeps the database and its journals out of version control.
const GITIGNORE_CONTENT: &str = r#"# Harvest database files
*.db
*.db-journal
*.db-wal
*.db-shm
"#;

/// Execute the `hv init` command.
pub fn run(ctx: &RuntimeContext, args: &InitArgs) -> Result<()> {
    let harvest_dir = match &ctx.harvest_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory: {}", dir.display()))?;
            dir.clone()
        }
        None => {
            let cwd = env::current_dir().context("failed to get current directory")?;
            ensure_harvest_dir(&cwd)?
        }
    };

    let config_path = harvest_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() && !args.force {
        bail!(
            "{} already exists\n\
             Edit it directly, or use --force to overwrite it with defaults.",
            config_path.display()
        );
    }

    let mut config = HarvestConfig::default();
    if let Some(url) = &args.jira_url {
        config.jira.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(email) = &args.jira_email {
        config.jira.email = email.clone();
    }
    save_config(&harvest_dir, &config)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    let gitignore_path = harvest_dir.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(&gitignore_path, GITIGNORE_CONTENT).with_context(|| {
            format!("failed to create .gitignore: {}", gitignore_path.display())
        })?;
    }

    let db_path = config.database_path(&harvest_dir);
    SqliteStore::open(&db_path)
        .with_context(|| format!("failed to create database: {}", db_path.display()))?;

    if ctx.json {
        output_json(&serde_json::json!({
            "harvest_dir": harvest_dir,
            "config": config_path,
            "database": db_path,
        }));
    } else if !ctx.quiet {
        println!();
        println!("hv initialized successfully!");
        println!();
        println!("  Config:   {}", config_path.display());
        println!("  Database: {}", db_path.display());
        println!();
        println!("Set the API token with HARVEST_JIRA__API_TOKEN, then run `hv check`.");
        println!();
    }

    Ok(())
}
