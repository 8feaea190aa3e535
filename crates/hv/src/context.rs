//! Runtime context for command execution.
//!
//! [`RuntimeContext`] carries the global flags and knows how to locate the
//! `.harvest` directory, load configuration and wire up the engine.

use std::env;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use harvest_config::{HarvestConfig, find_harvest_dir_or_error, load_config};
use harvest_core::query::Predicate;
use harvest_engine::{Clock, HarvestOptions, Harvester, ReloadCoordinator, SystemClock};
use harvest_jira::{
    Blacklist, ExternalIssueSource, JiraSettings, JiraSource, RetryPolicy, SourceError,
    SourcePage,
};
use harvest_storage::{SqliteStore, Storage};

use crate::cli::GlobalArgs;

/// Runtime context passed to every command handler.
#[derive(Debug)]
pub struct RuntimeContext {
    /// Explicit `.harvest` directory from `--config`.
    pub harvest_dir: Option<PathBuf>,

    /// Who manual reloads are attributed to.
    pub actor: String,

    pub json: bool,
    pub verbose: bool,
    pub quiet: bool,
}

/// Everything a command needs to talk to the store and the source.
pub struct Engine {
    pub config: HarvestConfig,
    pub store: Arc<SqliteStore>,
    pub clock: Arc<dyn Clock>,
    pub harvester: Arc<Harvester>,
    pub coordinator: Arc<ReloadCoordinator>,
}

/// Whether a command will query Jira.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Fail early if Jira is not configured.
    Required,
    /// Use Jira if configured; otherwise any fetch fails.
    Optional,
}

impl RuntimeContext {
    pub fn from_global_args(global: &GlobalArgs) -> Self {
        Self {
            harvest_dir: global.config.clone(),
            actor: resolve_actor(global.actor.as_deref()),
            json: global.json,
            verbose: global.verbose,
            quiet: global.quiet,
        }
    }

    /// The `.harvest` directory: `--config`, then `$HARVEST_DIR`, then the
    /// nearest one above the working directory.
    pub fn resolve_harvest_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.harvest_dir {
            anyhow::ensure!(
                dir.is_dir(),
                "config directory {} does not exist (run 'hv init' first)",
                dir.display()
            );
            return Ok(dir.clone());
        }
        let cwd = env::current_dir().context("cannot determine working directory")?;
        Ok(find_harvest_dir_or_error(&cwd)?)
    }

    /// Loads and validates configuration.
    pub fn load_config(&self) -> Result<(PathBuf, HarvestConfig)> {
        let dir = self.resolve_harvest_dir()?;
        let config = load_config(&dir)
            .with_context(|| format!("failed to load configuration from {}", dir.display()))?;
        config.validate().context("invalid configuration")?;
        Ok((dir, config))
    }

    /// Opens the database without touching the source.
    pub fn open_store(&self) -> Result<(HarvestConfig, Arc<SqliteStore>)> {
        let (dir, config) = self.load_config()?;
        let db_path = config.database_path(&dir);
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("failed to open database: {}", db_path.display()))?;
        debug!(path = %db_path.display(), "database opened");
        Ok((config, Arc::new(store)))
    }

    /// Wires store, source, harvester and coordinator from configuration.
    pub fn engine(&self, mode: SourceMode) -> Result<Engine> {
        let (harvest_dir, config) = self.load_config()?;
        let hierarchy = Arc::new(config.issue_hierarchy()?);
        for warning in hierarchy.warnings() {
            warn!("{warning}");
        }

        let db_path = config.database_path(&harvest_dir);
        let store = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("failed to open database: {}", db_path.display()))?,
        );
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let types: Vec<_> = hierarchy.types().cloned().collect();
        let synced = store
            .sync_issue_types(&types, clock.now())
            .context("failed to sync issue types")?;
        if synced.added + synced.updated + synced.removed > 0 {
            info!(
                added = synced.added,
                updated = synced.updated,
                removed = synced.removed,
                "issue types synced"
            );
        }

        let source: Arc<dyn ExternalIssueSource> = match JiraSource::new(jira_settings(&config)) {
            Ok(source) => Arc::new(source),
            Err(e) if mode == SourceMode::Optional => {
                debug!(error = %e, "jira not configured, fetches will fail");
                Arc::new(Unconfigured(e.to_string()))
            }
            Err(e) => return Err(e).context("cannot reach Jira"),
        };

        let options = HarvestOptions {
            root: config.root_criteria(&hierarchy),
            max_depth: config.harvest.max_depth,
            fetch_concurrency: config.harvest.fetch_concurrency,
            team_members: config.harvest.team_members.clone(),
        };
        let harvester = Arc::new(Harvester::new(
            source,
            store.clone() as Arc<dyn Storage>,
            hierarchy,
            clock.clone(),
            options,
        ));
        let coordinator = Arc::new(ReloadCoordinator::new(
            store.clone() as Arc<dyn Storage>,
            harvester.clone(),
            clock.clone(),
            config.refresh_interval(),
        )
        .with_lease(config.reload_lease()));

        Ok(Engine {
            config,
            store,
            clock,
            harvester,
            coordinator,
        })
    }
}

/// Builds Jira client settings from the `jira` config section.
pub fn jira_settings(config: &HarvestConfig) -> JiraSettings {
    let jira = &config.jira;
    JiraSettings {
        base_url: jira.base_url.clone(),
        email: jira.email.clone(),
        api_token: jira.api_token.clone().unwrap_or_default(),
        page_size: jira.page_size,
        timeout: Duration::from_secs(jira.timeout_secs),
        retry: RetryPolicy {
            max_retries: jira.max_retries,
            base_delay: Duration::from_millis(jira.backoff_base_ms),
        },
        blacklist: Blacklist::new(
            &jira.blacklist.projects,
            &jira.blacklist.teams,
            &jira.blacklist.statuses,
        ),
    }
}

/// Stand-in source for commands that never fetch.
struct Unconfigured(String);

impl ExternalIssueSource for Unconfigured {
    fn search(&self, _: &Predicate, _: Option<&str>) -> harvest_jira::source::Result<SourcePage> {
        Err(SourceError::NotConfigured(self.0.clone()))
    }

    fn check_connection(&self) -> harvest_jira::source::Result<String> {
        Err(SourceError::NotConfigured(self.0.clone()))
    }
}

/// Resolves the actor name.
///
/// Priority: explicit flag (or `HV_ACTOR`) > git config user.name > USER env > "unknown".
fn resolve_actor(flag_value: Option<&str>) -> String {
    if let Some(actor) = flag_value.filter(|a| !a.is_empty()) {
        return actor.to_string();
    }

    if let Ok(output) = Command::new("git").args(["config", "user.name"]).output() {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    if let Ok(user) = env::var("USER").or_else(|_| env::var("USERNAME")) {
        if !user.is_empty() {
            return user;
        }
    }

    "unknown".to_string()
}
