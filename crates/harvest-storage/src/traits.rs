//! Storage and Transaction traits -- the public API for harvest persistence.
//!
//! Consumers depend on these traits rather than on concrete implementations so
//! that alternative backends (fakes, fault injectors) can be substituted.

use chrono::{DateTime, Utc};
use serde::Serialize;

use harvest_core::filter::IssueFilter;
use harvest_core::hierarchy::IssueType;
use harvest_core::issue::Issue;
use harvest_core::reload::{HarvestJob, NewReload, ReloadFilter, ReloadTracking};

use crate::error::Result;

// ---------------------------------------------------------------------------
// View / helper types
// ---------------------------------------------------------------------------

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// No row existed for the key.
    Inserted,
    /// The row existed and its content changed.
    Updated,
    /// The row existed with identical content; only `harvested_at` moved.
    Unchanged,
    /// The stored row was harvested later than the incoming one and was kept.
    Ignored,
}

/// Result of syncing configured issue types into the database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeSyncSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// The primary storage interface for harvested issues and reload bookkeeping.
///
/// Implementations must be `Send + Sync` so a single store can be shared by
/// the scheduler thread and trigger callers.
pub trait Storage: Send + Sync {
    // -- Issues --------------------------------------------------------------

    /// Inserts or replaces the issue keyed by `issue.key`.
    ///
    /// A write carrying an older `harvested_at` than the stored row is
    /// ignored, so `harvested_at` never moves backwards.
    fn upsert_issue(&self, issue: &Issue) -> Result<UpsertOutcome>;

    /// Retrieves an issue by key.
    fn get_issue(&self, key: &str) -> Result<Issue>;

    /// Lists issues matching the filter, ordered by key.
    fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>>;

    /// Returns the number of stored issues.
    fn count_issues(&self) -> Result<i64>;

    /// Deletes every issue with `harvested_at < threshold`.
    fn delete_issues_older_than(&self, threshold: DateTime<Utc>) -> Result<usize>;

    /// Deletes every issue with `harvested_at >= since`.
    fn delete_issues_harvested_since(&self, since: DateTime<Utc>) -> Result<usize>;

    // -- Reload tracking -----------------------------------------------------

    /// Opens a new `running` reload row.
    ///
    /// Fails with [`StorageError::AlreadyRunning`](crate::StorageError::AlreadyRunning)
    /// while another row is running.
    fn begin_reload(&self, new: &NewReload) -> Result<ReloadTracking>;

    /// Retrieves a reload row by id.
    fn get_reload(&self, id: i64) -> Result<ReloadTracking>;

    /// Returns the running reload, if any.
    fn active_reload(&self) -> Result<Option<ReloadTracking>>;

    /// Stamps `heartbeat_at` on a running reload held by `owner`.
    ///
    /// Fails with [`StorageError::NotRunning`](crate::StorageError::NotRunning)
    /// once the row has left the running state or belongs to someone else.
    fn heartbeat_reload(&self, id: i64, owner: &str, at: DateTime<Utc>) -> Result<()>;

    /// Returns the most recently started reload in a terminal state.
    fn latest_finished_reload(&self) -> Result<Option<ReloadTracking>>;

    /// Lists reloads, most recently started first.
    fn list_reloads(&self, filter: &ReloadFilter) -> Result<Vec<ReloadTracking>>;

    // -- Harvest jobs --------------------------------------------------------

    /// Opens a `running` harvest job row.
    fn create_harvest_job(
        &self,
        reload_id: Option<i64>,
        started_at: DateTime<Utc>,
    ) -> Result<HarvestJob>;

    /// Marks a harvest job completed.
    fn complete_harvest_job(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        records_processed: i64,
    ) -> Result<HarvestJob>;

    /// Marks a harvest job failed with a message.
    fn fail_harvest_job(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        records_processed: i64,
        message: &str,
    ) -> Result<HarvestJob>;

    /// Retrieves a harvest job by id.
    fn get_harvest_job(&self, id: i64) -> Result<HarvestJob>;

    /// Lists harvest jobs, most recently started first.
    fn list_harvest_jobs(&self, limit: u32) -> Result<Vec<HarvestJob>>;

    // -- Issue types ---------------------------------------------------------

    /// Makes the `issue_types` table mirror the configured hierarchy.
    fn sync_issue_types(&self, types: &[IssueType], at: DateTime<Utc>)
    -> Result<TypeSyncSummary>;

    /// Returns all stored issue types ordered by id.
    fn list_issue_types(&self) -> Result<Vec<IssueType>>;

    // -- Transactions --------------------------------------------------------

    /// Executes a closure within a database transaction.
    ///
    /// If the closure returns `Ok`, the transaction is committed.
    /// If it returns `Err` or panics, the transaction is rolled back.
    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Transaction trait
// ---------------------------------------------------------------------------

/// Subset of [`Storage`] methods available inside a transaction.
///
/// All operations share a single database connection and are committed or
/// rolled back atomically.
pub trait Transaction {
    // -- Issue operations ----------------------------------------------------

    fn upsert_issue(&self, issue: &Issue) -> Result<UpsertOutcome>;
    fn get_issue(&self, key: &str) -> Result<Issue>;
    fn delete_issues_older_than(&self, threshold: DateTime<Utc>) -> Result<usize>;
    fn delete_issues_harvested_since(&self, since: DateTime<Utc>) -> Result<usize>;

    // -- Reload operations ---------------------------------------------------

    fn insert_reload(&self, new: &NewReload) -> Result<ReloadTracking>;
    fn get_reload(&self, id: i64) -> Result<ReloadTracking>;
    fn active_reload(&self) -> Result<Option<ReloadTracking>>;
    fn running_reloads(&self) -> Result<Vec<ReloadTracking>>;

    /// Moves a running reload to `completed`.
    ///
    /// Fails with [`StorageError::NotRunning`](crate::StorageError::NotRunning)
    /// if the row has already left the running state.
    fn complete_reload(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        records_processed: i64,
        issues_deleted: i64,
    ) -> Result<ReloadTracking>;

    /// Moves a running reload to `failed`. `message` must be non-empty.
    fn fail_reload(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        records_processed: i64,
        message: &str,
    ) -> Result<ReloadTracking>;

    // -- Harvest job operations ----------------------------------------------

    fn create_harvest_job(
        &self,
        reload_id: Option<i64>,
        started_at: DateTime<Utc>,
    ) -> Result<HarvestJob>;

    /// Fails every running job of `reload_id`; returns how many were closed.
    fn fail_running_jobs(
        &self,
        reload_id: i64,
        completed_at: DateTime<Utc>,
        message: &str,
    ) -> Result<usize>;
}
