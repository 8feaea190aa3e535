//! Clap CLI definitions for the `hv` command.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// hv -- harvest an issue hierarchy and keep it fresh.
#[derive(Parser, Debug)]
#[command(
    name = "hv",
    about = "Harvest and reload orchestration for hierarchical issue data",
    long_about = "Recursively harvests issues from Jira following a configured type hierarchy, \
                  stores them in SQLite, and manages full reloads with crash recovery.",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global flags available to all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to the .harvest directory (default: $HARVEST_DIR or auto-discover).
    #[arg(long, global = true, value_name = "DIR")]
    pub config: Option<PathBuf>,

    /// Name recorded as the trigger of manual reloads (default: git user.name, $USER).
    #[arg(long, global = true, env = "HV_ACTOR")]
    pub actor: Option<String>,

    /// Output in JSON format.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors.
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

/// All available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    // ===== Service =====
    /// Recover, reload if stale, then run the scheduler until interrupted.
    Serve,

    /// Roll back reloads left running by a crash.
    Recover,

    /// Show reload state and data freshness.
    Status,

    // ===== Reloads & harvests =====
    /// Run, inspect and list full reloads.
    Reload(ReloadArgs),

    /// Run one incremental harvest pass (no stale cleanup).
    Harvest,

    /// Show harvest pass history.
    Jobs(JobsArgs),

    // ===== Data =====
    /// Query harvested issues.
    Issues(IssuesArgs),

    /// Show the configured issue type hierarchy.
    Types(TypesArgs),

    // ===== Setup & configuration =====
    /// Create a .harvest directory with a default config and database.
    Init(InitArgs),

    /// Inspect configuration.
    Config(ConfigArgs),

    /// Verify Jira connectivity and credentials.
    Check,

    /// Generate shell completions.
    Completion(CompletionArgs),

    /// Print version information.
    Version,
}

// ---------------------------------------------------------------------------
// Reload
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct ReloadArgs {
    #[command(subcommand)]
    pub command: ReloadCommands,
}

#[derive(Subcommand, Debug)]
pub enum ReloadCommands {
    /// Start a manual reload and wait for it to finish.
    Run(ReloadRunArgs),

    /// Show one reload.
    Show(ReloadShowArgs),

    /// List reloads, most recent first.
    List(ReloadListArgs),
}

#[derive(Args, Debug)]
pub struct ReloadRunArgs {
    /// Supersede a running reload instead of being rejected.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ReloadShowArgs {
    /// Reload id.
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct ReloadListArgs {
    /// Maximum rows (1-100).
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: u32,

    /// Only reloads in this state (running, completed, failed).
    #[arg(short = 's', long)]
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct JobsArgs {
    /// Maximum rows.
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: u32,
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct IssuesArgs {
    #[command(subcommand)]
    pub command: IssuesCommands,
}

#[derive(Subcommand, Debug)]
pub enum IssuesCommands {
    /// List issues, ordered by key.
    List(IssuesListArgs),

    /// Show one issue and its direct children.
    Show(IssuesShowArgs),

    /// Print the stored hierarchy below a key (or below every root).
    Tree(IssuesTreeArgs),

    /// Count stored issues.
    Count,
}

#[derive(Args, Debug, Default)]
pub struct IssuesListArgs {
    /// Issue type name or numeric id.
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// Direct children of this key.
    #[arg(long)]
    pub parent: Option<String>,

    /// Only issues without a parent.
    #[arg(long, conflicts_with = "parent")]
    pub roots: bool,

    #[arg(short = 's', long)]
    pub status: Option<String>,

    #[arg(short = 'a', long)]
    pub assignee: Option<String>,

    #[arg(short = 'l', long)]
    pub label: Option<String>,

    /// Substring of the summary.
    #[arg(long)]
    pub search: Option<String>,

    #[arg(short = 'n', long)]
    pub limit: Option<u32>,
}

#[derive(Args, Debug)]
pub struct IssuesShowArgs {
    pub key: String,
}

#[derive(Args, Debug)]
pub struct IssuesTreeArgs {
    /// Start from this key instead of every root.
    pub key: Option<String>,

    /// Levels below the start to print.
    #[arg(short = 'd', long, default_value_t = 10)]
    pub depth: u32,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct TypesArgs {
    /// Also write the hierarchy into the database's issue_types table.
    #[arg(long)]
    pub sync: bool,
}

// ---------------------------------------------------------------------------
// Init / Config
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Jira site URL, e.g. https://example.atlassian.net.
    #[arg(long)]
    pub jira_url: Option<String>,

    /// Jira account email.
    #[arg(long)]
    pub jira_email: Option<String>,

    /// Overwrite an existing config.yaml.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration (token redacted).
    Show,

    /// Print the path of the .harvest directory in use.
    Path,
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Arguments for `hv completion`.
#[derive(Args, Debug)]
pub struct CompletionArgs {
    #[command(subcommand)]
    pub command: CompletionCommands,
}

/// Completion subcommands.
#[derive(Subcommand, Debug)]
pub enum CompletionCommands {
    /// Generate Bash completions.
    Bash,
    /// Generate Zsh completions.
    Zsh,
    /// Generate Fish completions.
    Fish,
    /// Generate PowerShell completions.
    Powershell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_forced_reload() {
        let cli = Cli::parse_from(["hv", "--json", "reload", "run", "--force"]);
        assert!(cli.global.json);
        match cli.command {
            Some(Commands::Reload(ReloadArgs {
                command: ReloadCommands::Run(args),
            })) => assert!(args.force),
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn roots_conflicts_with_parent() {
        let res = Cli::try_parse_from(["hv", "issues", "list", "--roots", "--parent", "PV-1"]);
        assert!(res.is_err());
    }
}
