//! Configuration types and loading for the harvest system.
//!
//! The main entry point is [`HarvestConfig`], assembled by [`load_config`]
//! from built-in defaults, `.harvest/config.yaml`, and `HARVEST_*`
//! environment variables (`__` separates nesting levels, so
//! `HARVEST_JIRA__API_TOKEN` sets `jira.api_token`).

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use harvest_core::hierarchy::{HierarchyError, IssueType, IssueTypeHierarchy};
use harvest_core::query::RootCriteria;

/// Name of the configuration file inside the `.harvest/` directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "HARVEST_";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// The configuration could not be serialised to YAML.
    #[error("failed to serialise config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Merging defaults, file and environment failed.
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The `.harvest/` directory was not found.
    #[error("no .harvest directory found (run 'hv init' first)")]
    HarvestDirNotFound,

    /// The configured issue type hierarchy is malformed.
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    /// A configuration value was invalid.
    #[error("invalid configuration value for key '{key}': {reason}")]
    InvalidValue {
        /// The configuration key that had an invalid value.
        key: String,
        /// A description of why the value is invalid.
        reason: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Load(Box::new(e))
    }
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Database section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, relative to the `.harvest/` directory unless absolute.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("harvest.db")
}

/// Issues dropped by the source before they reach the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlacklistConfig {
    /// Project keys (the part of the issue key before `-`).
    #[serde(default)]
    pub projects: Vec<String>,

    /// Status names.
    #[serde(default)]
    pub statuses: Vec<String>,

    /// Team names.
    #[serde(default)]
    pub teams: Vec<String>,
}

/// Jira connection section.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct JiraConfig {
    /// Site root, e.g. `https://example.atlassian.net`.
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Results requested per search call.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default)]
    pub blacklist: BlacklistConfig,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            email: String::new(),
            api_token: None,
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            blacklist: BlacklistConfig::default(),
        }
    }
}

impl fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("page_size", &self.page_size)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("blacklist", &self.blacklist)
            .finish()
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

/// What to harvest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestSection {
    /// Project keys searched for root issues.
    #[serde(default)]
    pub projects: Vec<String>,

    /// Root type names; empty means every root of the hierarchy.
    #[serde(default)]
    pub root_types: Vec<String>,

    /// Labels a root issue must carry.
    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Sibling child queries issued concurrently.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Assignees queried after the hierarchy walk.
    #[serde(default)]
    pub team_members: Vec<String>,
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            projects: Vec::new(),
            root_types: Vec::new(),
            labels: Vec::new(),
            max_depth: default_max_depth(),
            fetch_concurrency: default_fetch_concurrency(),
            team_members: Vec::new(),
        }
    }
}

fn default_max_depth() -> u32 {
    10
}

fn default_fetch_concurrency() -> usize {
    4
}

/// Reload cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadConfig {
    #[serde(default = "default_refresh_interval_hours")]
    pub refresh_interval_hours: u32,

    /// `0` disables scheduled incremental passes.
    #[serde(default)]
    pub incremental_interval_minutes: u32,

    #[serde(default = "default_scheduler_poll_secs")]
    pub scheduler_poll_secs: u64,

    /// A running reload whose heartbeat is older than this is treated as
    /// abandoned and rolled back by recovery.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u32,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            refresh_interval_hours: default_refresh_interval_hours(),
            incremental_interval_minutes: 0,
            scheduler_poll_secs: default_scheduler_poll_secs(),
            lease_secs: default_lease_secs(),
        }
    }
}

fn default_refresh_interval_hours() -> u32 {
    24
}

fn default_scheduler_poll_secs() -> u64 {
    60
}

fn default_lease_secs() -> u32 {
    120
}

/// The configured issue type forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    #[serde(default = "default_types")]
    pub types: Vec<IssueType>,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            types: default_types(),
        }
    }
}

fn default_types() -> Vec<IssueType> {
    vec![
        IssueType::new(10, "Product Version", vec![20, 30]),
        IssueType::new(20, "Feature", vec![40, 50]),
        IssueType::new(30, "Customer Adoption", vec![40]),
        IssueType::new(40, "Story", vec![]),
        IssueType::new(50, "Task", vec![]),
    ]
}

// ---------------------------------------------------------------------------
// Main config struct
// ---------------------------------------------------------------------------

/// The full harvest configuration, corresponding to `.harvest/config.yaml`.
///
/// All fields use `serde` defaults so that a partially-specified YAML file
/// will be deserialized correctly with sensible default values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub jira: JiraConfig,

    #[serde(default)]
    pub harvest: HarvestSection,

    #[serde(default)]
    pub reload: ReloadConfig,

    #[serde(default)]
    pub hierarchy: HierarchyConfig,
}

impl HarvestConfig {
    /// Builds and validates the issue type hierarchy.
    pub fn issue_hierarchy(&self) -> Result<IssueTypeHierarchy> {
        Ok(IssueTypeHierarchy::from_types(self.hierarchy.types.clone())?)
    }

    /// Root query criteria. Falls back to every root type of the hierarchy
    /// when `harvest.root_types` is empty.
    pub fn root_criteria(&self, hierarchy: &IssueTypeHierarchy) -> RootCriteria {
        let type_names = if self.harvest.root_types.is_empty() {
            hierarchy
                .names_of(hierarchy.roots())
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            self.harvest.root_types.clone()
        };
        RootCriteria {
            projects: self.harvest.projects.clone(),
            type_names,
            labels: self.harvest.labels.clone(),
        }
    }

    /// Resolves the database path against the `.harvest/` directory.
    pub fn database_path(&self, harvest_dir: &Path) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else {
            harvest_dir.join(&self.database.path)
        }
    }

    pub fn refresh_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.reload.refresh_interval_hours))
    }

    /// `None` when scheduled incremental passes are disabled.
    pub fn incremental_interval(&self) -> Option<chrono::Duration> {
        match self.reload.incremental_interval_minutes {
            0 => None,
            m => Some(chrono::Duration::minutes(i64::from(m))),
        }
    }

    pub fn scheduler_poll(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reload.scheduler_poll_secs.max(1))
    }

    pub fn reload_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.reload.lease_secs))
    }

    /// Checks value ranges and that the hierarchy is well formed.
    pub fn validate(&self) -> Result<()> {
        if self.reload.refresh_interval_hours == 0 {
            return Err(invalid("reload.refresh_interval_hours", "must be at least 1"));
        }
        if self.reload.lease_secs < 10 {
            return Err(invalid("reload.lease_secs", "must be at least 10"));
        }
        if self.harvest.max_depth == 0 {
            return Err(invalid("harvest.max_depth", "must be at least 1"));
        }
        if self.harvest.fetch_concurrency == 0 {
            return Err(invalid("harvest.fetch_concurrency", "must be at least 1"));
        }
        if !(1..=1000).contains(&self.jira.page_size) {
            return Err(invalid("jira.page_size", "must be between 1 and 1000"));
        }

        let hierarchy = self.issue_hierarchy()?;
        for name in &self.harvest.root_types {
            if hierarchy.find_by_name(name).is_none() {
                return Err(invalid(
                    "harvest.root_types",
                    format!("{name:?} is not a configured issue type"),
                ));
            }
        }
        Ok(())
    }

    /// Copy safe to print: the API token is masked.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.jira.api_token.is_some() {
            cfg.jira.api_token = Some("<redacted>".to_string());
        }
        cfg
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Loads configuration for the given `.harvest/` directory.
///
/// Layers, lowest precedence first: built-in defaults,
/// `<harvest_dir>/config.yaml` (if present), then `HARVEST_*` environment
/// variables.
pub fn load_config(harvest_dir: &Path) -> Result<HarvestConfig> {
    figment_for(harvest_dir)
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(ConfigError::from)
}

/// Loads configuration from defaults and the file only, ignoring the
/// environment.
pub fn load_config_file_only(harvest_dir: &Path) -> Result<HarvestConfig> {
    figment_for(harvest_dir)
        .extract()
        .map_err(ConfigError::from)
}

fn figment_for(harvest_dir: &Path) -> Figment {
    Figment::from(Serialized::defaults(HarvestConfig::default()))
        .merge(Yaml::file(harvest_dir.join(CONFIG_FILE_NAME)))
}

/// Saves configuration to `config.yaml` inside the given `.harvest/` directory.
///
/// The directory is created if it does not exist.
pub fn save_config(harvest_dir: &Path, config: &HarvestConfig) -> Result<()> {
    std::fs::create_dir_all(harvest_dir)?;

    let config_path = harvest_dir.join(CONFIG_FILE_NAME);
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(config_path, yaml)?;
    Ok(())
}

/// Renders configuration as YAML.
pub fn to_yaml(config: &HarvestConfig) -> Result<String> {
    Ok(serde_yaml::to_string(config)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_is_valid() {
        let cfg = HarvestConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.jira.page_size, 100);
        assert_eq!(cfg.harvest.max_depth, 10);
        assert_eq!(cfg.reload.refresh_interval_hours, 24);
        assert_eq!(cfg.incremental_interval(), None);
        assert_eq!(cfg.refresh_interval(), chrono::Duration::hours(24));
        assert_eq!(cfg.reload_lease(), chrono::Duration::seconds(120));
    }

    #[test]
    fn load_missing_config_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_file_only(dir.path()).unwrap();
        assert_eq!(cfg, HarvestConfig::default());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "jira:\n  base_url: https://example.atlassian.net\nharvest:\n  projects: [PV]\n  labels: [cpa]\n",
        )
        .unwrap();

        let cfg = load_config_file_only(dir.path()).unwrap();
        assert_eq!(cfg.jira.base_url, "https://example.atlassian.net");
        assert_eq!(cfg.jira.max_retries, 3);
        assert_eq!(cfg.harvest.projects, vec!["PV"]);
        assert_eq!(cfg.harvest.fetch_concurrency, 4);
        assert_eq!(cfg.hierarchy.types.len(), 5);
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = HarvestConfig::default();
        cfg.harvest.team_members = vec!["alice@example.com".into()];
        cfg.reload.incremental_interval_minutes = 15;

        save_config(dir.path(), &cfg).unwrap();
        let loaded = load_config_file_only(dir.path()).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(
            loaded.incremental_interval(),
            Some(chrono::Duration::minutes(15))
        );
    }

    #[test]
    fn root_criteria_defaults_to_hierarchy_roots() {
        let cfg = HarvestConfig::default();
        let hierarchy = cfg.issue_hierarchy().unwrap();
        let criteria = cfg.root_criteria(&hierarchy);
        assert_eq!(criteria.type_names, vec!["Product Version"]);

        let mut cfg = cfg;
        cfg.harvest.root_types = vec!["Feature".into()];
        assert_eq!(cfg.root_criteria(&hierarchy).type_names, vec!["Feature"]);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = HarvestConfig::default();
        cfg.harvest.fetch_concurrency = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "harvest.fetch_concurrency"
        ));

        let mut cfg = HarvestConfig::default();
        cfg.harvest.root_types = vec!["Epic".into()];
        assert!(cfg.validate().is_err());

        let mut cfg = HarvestConfig::default();
        cfg.reload.lease_secs = 5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "reload.lease_secs"
        ));
    }

    #[test]
    fn validate_rejects_cyclic_hierarchy() {
        let mut cfg = HarvestConfig::default();
        cfg.hierarchy.types = vec![
            IssueType::new(1, "A", vec![2]),
            IssueType::new(2, "B", vec![1]),
        ];
        assert!(matches!(cfg.validate(), Err(ConfigError::Hierarchy(_))));
    }

    #[test]
    fn debug_and_redacted_hide_token() {
        let mut cfg = HarvestConfig::default();
        cfg.jira.api_token = Some("s3cret".into());
        assert!(!format!("{cfg:?}").contains("s3cret"));
        assert!(!to_yaml(&cfg.redacted()).unwrap().contains("s3cret"));
    }

    #[test]
    fn database_path_is_relative_to_harvest_dir() {
        let cfg = HarvestConfig::default();
        assert_eq!(
            cfg.database_path(Path::new("/tmp/.harvest")),
            PathBuf::from("/tmp/.harvest/harvest.db")
        );
    }
}
