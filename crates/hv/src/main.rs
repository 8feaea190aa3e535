//! `hv` -- harvest an issue hierarchy from Jira and keep it fresh.
//!
//! Parses CLI arguments with clap, installs logging, resolves the runtime
//! context, and dispatches to command handlers.

mod cli;
mod commands;
mod context;
mod output;

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use context::RuntimeContext;

/// Set while `hv serve` owns the process; Ctrl+C then stops the scheduler
/// instead of exiting.
pub(crate) static SERVING: AtomicBool = AtomicBool::new(false);

/// Stop flag polled by the scheduler loop.
pub(crate) static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Tracks whether a Ctrl+C has already been received.
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

fn init_logging(ctx: &RuntimeContext) {
    let default = if ctx.verbose {
        "hv=debug,harvest_engine=debug,harvest_jira=debug,harvest_storage=debug"
    } else if ctx.quiet {
        "warn"
    } else {
        "hv=info,harvest_engine=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    // First Ctrl+C: stop the scheduler (serve) or exit. Second: force exit.
    let _ = ctrlc::set_handler(|| {
        if CTRLC_RECEIVED.swap(true, Ordering::SeqCst) {
            std::process::exit(1);
        }
        if SERVING.load(Ordering::SeqCst) {
            eprintln!("Stopping after the current tick (Ctrl+C again to abort)...");
            SHUTDOWN.store(true, Ordering::SeqCst);
        } else {
            std::process::exit(130);
        }
    });

    let cli = Cli::parse();
    let ctx = RuntimeContext::from_global_args(&cli.global);
    init_logging(&ctx);

    let result = match cli.command {
        Some(Commands::Serve) => commands::serve::run(&ctx),
        Some(Commands::Recover) => commands::recover::run(&ctx),
        Some(Commands::Status) => commands::status_cmd::run(&ctx),
        Some(Commands::Reload(args)) => commands::reload::run(&ctx, &args),
        Some(Commands::Harvest) => commands::harvest::run(&ctx),
        Some(Commands::Jobs(args)) => commands::jobs::run(&ctx, &args),
        Some(Commands::Issues(args)) => commands::issues::run(&ctx, &args),
        Some(Commands::Types(args)) => commands::types_cmd::run(&ctx, &args),
        Some(Commands::Init(args)) => commands::init::run(&ctx, &args),
        Some(Commands::Config(args)) => commands::config_cmd::run(&ctx, &args),
        Some(Commands::Check) => commands::check::run(&ctx),
        Some(Commands::Completion(args)) => commands::completion::run(&args),
        Some(Commands::Version) => commands::version::run(&ctx),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        if cli.global.json {
            let err_json = serde_json::json!({
                "error": format!("{:#}", e),
            });
            if let Ok(s) = serde_json::to_string_pretty(&err_json) {
                eprintln!("{}", s);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}
