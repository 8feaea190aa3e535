//! Multi-statement units of work: finalize, supersede, recover.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use harvest_core::issue::Issue;
use harvest_core::reload::{HarvestJob, NewReload, ReloadTracking};

use crate::error::{Result, StorageError};
use crate::sqlite::issues;
use crate::sqlite::jobs;
use crate::sqlite::reloads;
use crate::sqlite::store::SqliteStore;
use crate::traits::{Transaction, UpsertOutcome};

/// The connection while a `BEGIN` is open on it. Every method reuses the
/// `*_on_conn` helpers, so reads inside the unit see its own writes.
pub(crate) struct SqliteTx<'a> {
    pub(crate) conn: &'a Connection,
}

impl Transaction for SqliteTx<'_> {
    fn upsert_issue(&self, issue: &Issue) -> Result<UpsertOutcome> {
        issues::upsert_issue_on_conn(self.conn, issue)
    }

    fn get_issue(&self, key: &str) -> Result<Issue> {
        issues::get_issue_on_conn(self.conn, key)
    }

    fn delete_issues_older_than(&self, threshold: DateTime<Utc>) -> Result<usize> {
        issues::delete_issues_older_than_on_conn(self.conn, threshold)
    }

    fn delete_issues_harvested_since(&self, since: DateTime<Utc>) -> Result<usize> {
        issues::delete_issues_harvested_since_on_conn(self.conn, since)
    }

    fn insert_reload(&self, new: &NewReload) -> Result<ReloadTracking> {
        reloads::insert_reload_on_conn(self.conn, new)
    }

    fn get_reload(&self, id: i64) -> Result<ReloadTracking> {
        reloads::get_reload_on_conn(self.conn, id)
    }

    fn active_reload(&self) -> Result<Option<ReloadTracking>> {
        reloads::active_reload_on_conn(self.conn)
    }

    fn running_reloads(&self) -> Result<Vec<ReloadTracking>> {
        reloads::running_reloads_on_conn(self.conn)
    }

    fn complete_reload(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        records_processed: i64,
        issues_deleted: i64,
    ) -> Result<ReloadTracking> {
        reloads::complete_reload_on_conn(
            self.conn,
            id,
            completed_at,
            records_processed,
            issues_deleted,
        )
    }

    fn fail_reload(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        records_processed: i64,
        message: &str,
    ) -> Result<ReloadTracking> {
        reloads::fail_reload_on_conn(self.conn, id, completed_at, records_processed, message)
    }

    fn create_harvest_job(
        &self,
        reload_id: Option<i64>,
        started_at: DateTime<Utc>,
    ) -> Result<HarvestJob> {
        jobs::create_harvest_job_on_conn(self.conn, reload_id, started_at)
    }

    fn fail_running_jobs(
        &self,
        reload_id: i64,
        completed_at: DateTime<Utc>,
        message: &str,
    ) -> Result<usize> {
        jobs::fail_running_jobs_on_conn(self.conn, reload_id, completed_at, message)
    }
}

impl SqliteStore {
    /// Commits when `f` returns `Ok`. On `Err` the open transaction is dropped,
    /// which rolls it back, and the error is returned unchanged.
    pub fn run_in_transaction_impl(
        &self,
        f: &dyn Fn(&dyn Transaction) -> Result<()>,
    ) -> Result<()> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StorageError::Transaction(format!("begin: {e}")))?;

        f(&SqliteTx { conn: &tx })?;
        tx.commit()
            .map_err(|e| StorageError::Transaction(format!("commit: {e}")))
    }
}
