//! Harvest job records, one per traversal pass.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use harvest_core::enums::JobStatus;
use harvest_core::reload::HarvestJob;

use crate::error::{Result, StorageError};
use crate::sqlite::issues::{format_datetime, get_datetime, get_datetime_opt};
use crate::sqlite::store::SqliteStore;

const JOB_COLUMNS: &str =
    "id, reload_id, started_at, completed_at, status, records_processed, error_message";

fn scan_job(row: &Row<'_>) -> rusqlite::Result<HarvestJob> {
    let status: String = row.get("status")?;
    Ok(HarvestJob {
        id: row.get("id")?,
        reload_id: row.get("reload_id")?,
        started_at: get_datetime(row, "started_at")?,
        completed_at: get_datetime_opt(row, "completed_at")?,
        status: status.parse::<JobStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        records_processed: row.get("records_processed")?,
        error_message: row.get("error_message")?,
    })
}

fn get_job_on_conn(conn: &Connection, id: i64) -> Result<HarvestJob> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM harvest_jobs WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_job)
        .optional()?
        .ok_or_else(|| StorageError::not_found("harvest job", id))
}

fn finish_job_on_conn(
    conn: &Connection,
    id: i64,
    status: JobStatus,
    completed_at: DateTime<Utc>,
    records_processed: i64,
    message: Option<&str>,
) -> Result<HarvestJob> {
    let changed = conn.execute(
        "UPDATE harvest_jobs
         SET status = ?2, completed_at = ?3, records_processed = ?4, error_message = ?5
         WHERE id = ?1 AND status = 'running'",
        params![
            id,
            status.as_str(),
            format_datetime(&completed_at),
            records_processed,
            message
        ],
    )?;
    if changed == 0 {
        let current = get_job_on_conn(conn, id)?;
        return Err(StorageError::NotRunning {
            entity: "harvest job",
            id,
            status: current.status.to_string(),
        });
    }
    get_job_on_conn(conn, id)
}

pub(crate) fn create_harvest_job_on_conn(
    conn: &Connection,
    reload_id: Option<i64>,
    started_at: DateTime<Utc>,
) -> Result<HarvestJob> {
    conn.execute(
        "INSERT INTO harvest_jobs (reload_id, started_at, status) VALUES (?1, ?2, 'running')",
        params![reload_id, format_datetime(&started_at)],
    )?;
    get_job_on_conn(conn, conn.last_insert_rowid())
}

/// Fails every job of `reload_id` still marked running; returns how many.
pub(crate) fn fail_running_jobs_on_conn(
    conn: &Connection,
    reload_id: i64,
    completed_at: DateTime<Utc>,
    message: &str,
) -> Result<usize> {
    if message.trim().is_empty() {
        return Err(StorageError::validation(
            "a failed harvest job must carry an error message",
        ));
    }
    Ok(conn.execute(
        "UPDATE harvest_jobs SET status = 'failed', completed_at = ?2, error_message = ?3
         WHERE reload_id = ?1 AND status = 'running'",
        params![reload_id, format_datetime(&completed_at), message],
    )?)
}

impl SqliteStore {
    pub fn create_harvest_job_impl(
        &self,
        reload_id: Option<i64>,
        started_at: DateTime<Utc>,
    ) -> Result<HarvestJob> {
        let conn = self.lock_conn()?;
        create_harvest_job_on_conn(&conn, reload_id, started_at)
    }

    pub fn complete_harvest_job_impl(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        records_processed: i64,
    ) -> Result<HarvestJob> {
        let conn = self.lock_conn()?;
        finish_job_on_conn(
            &conn,
            id,
            JobStatus::Completed,
            completed_at,
            records_processed,
            None,
        )
    }

    pub fn fail_harvest_job_impl(
        &self,
        id: i64,
        completed_at: DateTime<Utc>,
        records_processed: i64,
        message: &str,
    ) -> Result<HarvestJob> {
        let conn = self.lock_conn()?;
        finish_job_on_conn(
            &conn,
            id,
            JobStatus::Failed,
            completed_at,
            records_processed,
            Some(message),
        )
    }

    pub fn get_harvest_job_impl(&self, id: i64) -> Result<HarvestJob> {
        let conn = self.lock_conn()?;
        get_job_on_conn(&conn, id)
    }

    pub fn list_harvest_jobs_impl(&self, limit: u32) -> Result<Vec<HarvestJob>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM harvest_jobs ORDER BY started_at DESC, id DESC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit.max(1)], scan_job)?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use harvest_core::enums::ReloadSource;
    use harvest_core::reload::NewReload;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn job_lifecycle_linked_to_reload() {
        let store = SqliteStore::open_in_memory().unwrap();
        let reload = store
            .begin_reload_impl(&NewReload {
                reload_started: t(0),
                source: ReloadSource::Scheduled,
                triggered_by: "scheduler".into(),
                owner: "pid 1 #0".into(),
            })
            .unwrap();

        let job = store.create_harvest_job_impl(Some(reload.id), t(0)).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.reload_id, Some(reload.id));

        let done = store.complete_harvest_job_impl(job.id, t(30), 7).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.records_processed, 7);
        assert_eq!(done.completed_at, Some(t(30)));

        let err = store.fail_harvest_job_impl(job.id, t(31), 7, "late").unwrap_err();
        assert!(matches!(err, StorageError::NotRunning { .. }));
    }

    #[test]
    fn incremental_job_and_listing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_harvest_job_impl(None, t(0)).unwrap();
        let b = store.create_harvest_job_impl(None, t(10)).unwrap();
        store.fail_harvest_job_impl(b.id, t(11), 0, "source down").unwrap();

        let jobs = store.list_harvest_jobs_impl(10).unwrap();
        assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![b.id, a.id]);
        assert_eq!(jobs[0].error_message.as_deref(), Some("source down"));
        assert_eq!(store.list_harvest_jobs_impl(1).unwrap().len(), 1);
        assert!(store.get_harvest_job_impl(99).unwrap_err().is_not_found());
    }

    #[test]
    fn running_jobs_of_a_reload_can_be_failed_together() {
        let store = SqliteStore::open_in_memory().unwrap();
        let reload = store
            .begin_reload_impl(&NewReload {
                reload_started: t(0),
                source: ReloadSource::Manual,
                triggered_by: "alice".into(),
                owner: "pid 1 #0".into(),
            })
            .unwrap();
        let crashed = store.create_harvest_job_impl(Some(reload.id), t(0)).unwrap();
        let finished = store.create_harvest_job_impl(Some(reload.id), t(1)).unwrap();
        store.complete_harvest_job_impl(finished.id, t(2), 3).unwrap();
        let unrelated = store.create_harvest_job_impl(None, t(3)).unwrap();

        let conn = store.lock_conn().unwrap();
        let n = fail_running_jobs_on_conn(&conn, reload.id, t(60), "interrupted").unwrap();
        assert_eq!(n, 1);
        assert!(matches!(
            fail_running_jobs_on_conn(&conn, reload.id, t(61), ""),
            Err(StorageError::Validation { .. })
        ));

        let job = get_job_on_conn(&conn, crashed.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.completed_at, Some(t(60)));
        assert_eq!(job.error_message.as_deref(), Some("interrupted"));
        assert_eq!(get_job_on_conn(&conn, finished.id).unwrap().status, JobStatus::Completed);
        assert_eq!(get_job_on_conn(&conn, unrelated.id).unwrap().status, JobStatus::Running);
    }
}
