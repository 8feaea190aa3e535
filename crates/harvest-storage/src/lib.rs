//! Storage backend for the harvest system.
//!
//! Provides the [`Storage`] trait and a SQLite implementation ([`SqliteStore`]).

pub mod error;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience.
pub use error::StorageError;
pub use sqlite::SqliteStore;
pub use traits::{Storage, Transaction, TypeSyncSummary, UpsertOutcome};

// ---------------------------------------------------------------------------
// Storage trait implementation for SqliteStore
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};

use harvest_core::filter::IssueFilter;
use harvest_core::hierarchy::IssueType;
use harvest_core::issue::Issue;
use harvest_core::reload::{HarvestJob, NewReload, ReloadFilter, ReloadTracking};

use crate::error::Result;

impl Storage for SqliteStore {
    fn upsert_issue(&self, issue: &Issue) -> Result<UpsertOutcome> {
        self.upsert_issue_impl(issue)
    }

    fn get_issue(&self, key: &str) -> Result<Issue> {
        self.get_issue_impl(key)
    }

    fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.list_issues_impl(filter)
    }

    fn count_issues(&self) -> Result<i64> {
        self.count_issues_impl()
    }

    fn delete_issues_older_than(&self, threshold: DateTime<Utc>) -> Result<usize> {
        self.delete_issues_older_than_impl(threshold)
    }

    fn delete_issues_harvested_since(&self, since: DateTime<Utc>) -> Result<usize> {
        self.delete_issues_harvested_since_impl(since)
    }

    fn begin_reload(&self, new: &NewReload) -> Result<ReloadTracking> {
        self.begin_reload_impl(new)
    }

    fn get_reload(&self, id: i64) -> Result<ReloadTracking> {
        self.get_reload_impl(id)
    }

    fn active_reload(&self) -> Result<Option<ReloadTracking>> {
        self.active_reload_impl()
    }

    fn heartbeat_reload(&self, id: i64, owner: &str, at: DateTime<Utc>) -> Result<()> {
        self.heartbeat_reload_impl(id, owner, at)
    }

    fn latest_finished_reload(&self) -> Result<Option<ReloadTracking>> {
        self.latest_finished_reload_impl()
    }

    fn list_reloads(&self, filter: &ReloadFilter) -> Result<Vec<ReloadTracking>> {
        self.list_reloads_impl(filter)
    }

    fn create_harvest_job(
        &self,
        reload_id: Option<i64>,
        started_at: DateTime<Utc>,
    ) -> Result<HarvestJob> {
        self.create_harvest_job_impl(reload_id, started_at)
    }

    fn complete_harvest_job(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        records_processed: i64,
    ) -> Result<HarvestJob> {
        self.complete_harvest_job_impl(id, completed_at, records_processed)
    }

    fn fail_harvest_job(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        records_processed: i64,
        message: &str,
    ) -> Result<HarvestJob> {
        self.fail_harvest_job_impl(id, completed_at, records_processed, message)
    }

    fn get_harvest_job(&self, id: i64) -> Result<HarvestJob> {
        self.get_harvest_job_impl(id)
    }

    fn list_harvest_jobs(&self, limit: u32) -> Result<Vec<HarvestJob>> {
        self.list_harvest_jobs_impl(limit)
    }

    fn sync_issue_types(
        &self,
        types: &[IssueType],
        at: DateTime<Utc>,
    ) -> Result<TypeSyncSummary> {
        self.sync_issue_types_impl(types, at)
    }

    fn list_issue_types(&self) -> Result<Vec<IssueType>> {
        self.list_issue_types_impl()
    }

    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()> {
        self.run_in_transaction_impl(f)
    }
}
