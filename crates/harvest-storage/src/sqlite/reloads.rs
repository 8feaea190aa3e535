//! Reload tracking rows: single-flight acquisition and lifecycle transitions.
//!
//! Every transition out of `running` is a compare-and-set on the status
//! column, so a row that was already failed by a force or by recovery cannot
//! be overwritten by a late finalize.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use harvest_core::enums::{ReloadSource, ReloadStatus};
use harvest_core::reload::{NewReload, ReloadFilter, ReloadTracking};

use crate::error::{Result, StorageError};
use crate::sqlite::issues::{format_datetime, get_datetime, get_datetime_opt};
use crate::sqlite::store::SqliteStore;

const RELOAD_COLUMNS: &str = r#"
    id, reload_started, status, completed_at, records_processed,
    issues_deleted, duration_seconds, source, triggered_by, error_message,
    owner, heartbeat_at
"#;

fn scan_reload(row: &Row<'_>) -> rusqlite::Result<ReloadTracking> {
    let status: String = row.get("status")?;
    let source: String = row.get("source")?;
    Ok(ReloadTracking {
        id: row.get("id")?,
        reload_started: get_datetime(row, "reload_started")?,
        status: status.parse::<ReloadStatus>().map_err(|e| conversion_error(Box::new(e)))?,
        completed_at: get_datetime_opt(row, "completed_at")?,
        records_processed: row.get("records_processed")?,
        issues_deleted: row.get("issues_deleted")?,
        duration_seconds: row.get("duration_seconds")?,
        source: source.parse::<ReloadSource>().map_err(|e| conversion_error(Box::new(e)))?,
        triggered_by: row.get("triggered_by")?,
        error_message: row.get("error_message")?,
        owner: row.get("owner")?,
        heartbeat_at: get_datetime_opt(row, "heartbeat_at")?,
    })
}

fn conversion_error(e: Box<dyn std::error::Error + Send + Sync>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ---------------------------------------------------------------------------
// SqliteStore reload methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Opens a running reload row outside of any caller transaction.
    pub fn begin_reload_impl(&self, new: &NewReload) -> Result<ReloadTracking> {
        let conn = self.lock_conn()?;
        insert_reload_on_conn(&conn, new)
    }

    pub fn get_reload_impl(&self, id: i64) -> Result<ReloadTracking> {
        let conn = self.lock_conn()?;
        get_reload_on_conn(&conn, id)
    }

    pub fn active_reload_impl(&self) -> Result<Option<ReloadTracking>> {
        let conn = self.lock_conn()?;
        active_reload_on_conn(&conn)
    }

    /// Refreshes the liveness stamp of a running reload held by `owner`.
    ///
    /// Fails with [`StorageError::NotRunning`] once the row was finalized,
    /// superseded or recovered, or if another owner holds it.
    pub fn heartbeat_reload_impl(&self, id: i64, owner: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute(
            "UPDATE reload_tracking SET heartbeat_at = ?3
             WHERE id = ?1 AND owner = ?2 AND status = 'running'",
            params![id, owner, format_datetime(&at)],
        )?;
        if changed == 0 {
            return Err(not_running(&get_reload_on_conn(&conn, id)?));
        }
        Ok(())
    }

    /// Most recently started reload that reached a terminal state.
    pub fn latest_finished_reload_impl(&self) -> Result<Option<ReloadTracking>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {RELOAD_COLUMNS} FROM reload_tracking
             WHERE status != 'running'
             ORDER BY reload_started DESC, id DESC LIMIT 1"
        );
        Ok(conn.query_row(&sql, [], scan_reload).optional()?)
    }

    /// Lists reloads, newest first, optionally filtered by status.
    pub fn list_reloads_impl(&self, filter: &ReloadFilter) -> Result<Vec<ReloadTracking>> {
        let conn = self.lock_conn()?;
        let limit = filter.effective_limit();

        let (sql, status) = match filter.status {
            Some(status) => (
                format!(
                    "SELECT {RELOAD_COLUMNS} FROM reload_tracking WHERE status = ?1
                     ORDER BY reload_started DESC, id DESC LIMIT {limit}"
                ),
                Some(status.as_str()),
            ),
            None => (
                format!(
                    "SELECT {RELOAD_COLUMNS} FROM reload_tracking
                     ORDER BY reload_started DESC, id DESC LIMIT {limit}"
                ),
                None,
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows = match status {
            Some(s) => stmt.query_map(params![s], scan_reload)?,
            None => stmt.query_map([], scan_reload)?,
        };
        let mut reloads = Vec::new();
        for row in rows {
            reloads.push(row?);
        }
        Ok(reloads)
    }
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

/// Inserts a `running` row whose first heartbeat is its start time. The
/// partial unique index turns a second running row into
/// [`StorageError::AlreadyRunning`].
pub(crate) fn insert_reload_on_conn(conn: &Connection, new: &NewReload) -> Result<ReloadTracking> {
    let started = format_datetime(&new.reload_started);
    let inserted = conn.execute(
        "INSERT INTO reload_tracking
             (reload_started, status, source, triggered_by, owner, heartbeat_at)
         VALUES (?1, 'running', ?2, ?3, ?4, ?1)",
        params![started, new.source.as_str(), new.triggered_by, new.owner],
    );

    match inserted {
        Ok(_) => {
            let id = conn.last_insert_rowid();
            debug!(id, source = %new.source, owner = %new.owner, "reload row opened");
            get_reload_on_conn(conn, id)
        }
        Err(e) if is_unique_violation(&e) => {
            let running = active_reload_on_conn(conn)?;
            Err(StorageError::AlreadyRunning {
                id: running.map(|r| r.id).unwrap_or_default(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn get_reload_on_conn(conn: &Connection, id: i64) -> Result<ReloadTracking> {
    let sql = format!("SELECT {RELOAD_COLUMNS} FROM reload_tracking WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_reload)
        .optional()?
        .ok_or_else(|| StorageError::not_found("reload", id))
}

pub(crate) fn active_reload_on_conn(conn: &Connection) -> Result<Option<ReloadTracking>> {
    let sql = format!("SELECT {RELOAD_COLUMNS} FROM reload_tracking WHERE status = 'running'");
    Ok(conn.query_row(&sql, [], scan_reload).optional()?)
}

/// All running rows. Normally at most one, but recovery does not assume it.
pub(crate) fn running_reloads_on_conn(conn: &Connection) -> Result<Vec<ReloadTracking>> {
    let sql = format!(
        "SELECT {RELOAD_COLUMNS} FROM reload_tracking WHERE status = 'running' ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], scan_reload)?;
    let mut reloads = Vec::new();
    for row in rows {
        reloads.push(row?);
    }
    Ok(reloads)
}

pub(crate) fn complete_reload_on_conn(
    conn: &Connection,
    id: i64,
    completed_at: DateTime<Utc>,
    records_processed: i64,
    issues_deleted: i64,
) -> Result<ReloadTracking> {
    let current = get_reload_on_conn(conn, id)?;
    let duration = current.elapsed_seconds(completed_at);

    let changed = conn.execute(
        "UPDATE reload_tracking
         SET status = 'completed', completed_at = ?2, records_processed = ?3,
             issues_deleted = ?4, duration_seconds = ?5
         WHERE id = ?1 AND status = 'running'",
        params![
            id,
            format_datetime(&completed_at),
            records_processed,
            issues_deleted,
            duration
        ],
    )?;
    if changed == 0 {
        return Err(not_running(&current));
    }
    get_reload_on_conn(conn, id)
}

pub(crate) fn fail_reload_on_conn(
    conn: &Connection,
    id: i64,
    completed_at: DateTime<Utc>,
    records_processed: i64,
    message: &str,
) -> Result<ReloadTracking> {
    if message.trim().is_empty() {
        return Err(StorageError::validation(
            "a failed reload must carry an error message",
        ));
    }
    let current = get_reload_on_conn(conn, id)?;
    let duration = current.elapsed_seconds(completed_at);

    let changed = conn.execute(
        "UPDATE reload_tracking
         SET status = 'failed', completed_at = ?2, records_processed = ?3,
             duration_seconds = ?4, error_message = ?5
         WHERE id = ?1 AND status = 'running'",
        params![
            id,
            format_datetime(&completed_at),
            records_processed,
            duration,
            message
        ],
    )?;
    if changed == 0 {
        return Err(not_running(&current));
    }
    get_reload_on_conn(conn, id)
}

fn not_running(current: &ReloadTracking) -> StorageError {
    StorageError::NotRunning {
        entity: "reload",
        id: current.id,
        status: current.status.to_string(),
    }
}

/// Parses a status string from user input, e.g. a CLI `--status` flag.
pub fn parse_reload_status(s: &str) -> Result<ReloadStatus> {
    s.parse::<ReloadStatus>()
        .map_err(|e| StorageError::validation(e.to_string()))
}

/// Parses a source string from user input.
pub fn parse_reload_source(s: &str) -> Result<ReloadSource> {
    s.parse::<ReloadSource>()
        .map_err(|e| StorageError::validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn new_reload(at: DateTime<Utc>) -> NewReload {
        NewReload {
            reload_started: at,
            source: ReloadSource::Manual,
            triggered_by: "alice".into(),
            owner: "pid 7 #0".into(),
        }
    }

    #[test]
    fn begin_opens_running_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let row = store.begin_reload_impl(&new_reload(t(0))).unwrap();
        assert_eq!(row.status, ReloadStatus::Running);
        assert_eq!(row.reload_started, t(0));
        assert_eq!(row.triggered_by, "alice");
        assert_eq!(row.records_processed, 0);
        assert_eq!(row.completed_at, None);
        assert_eq!(row.owner, "pid 7 #0");
        assert_eq!(row.heartbeat_at, Some(t(0)));
        assert_eq!(store.active_reload_impl().unwrap().map(|r| r.id), Some(row.id));
    }

    #[test]
    fn heartbeat_moves_only_for_the_owner_of_a_running_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let row = store.begin_reload_impl(&new_reload(t(0))).unwrap();

        store.heartbeat_reload_impl(row.id, "pid 7 #0", t(30)).unwrap();
        assert_eq!(store.get_reload_impl(row.id).unwrap().heartbeat_at, Some(t(30)));

        let err = store.heartbeat_reload_impl(row.id, "pid 8 #0", t(40)).unwrap_err();
        assert!(matches!(err, StorageError::NotRunning { .. }));
        assert_eq!(store.get_reload_impl(row.id).unwrap().heartbeat_at, Some(t(30)));

        {
            let conn = store.lock_conn().unwrap();
            complete_reload_on_conn(&conn, row.id, t(50), 0, 0).unwrap();
        }
        let err = store.heartbeat_reload_impl(row.id, "pid 7 #0", t(60)).unwrap_err();
        assert!(matches!(err, StorageError::NotRunning { ref status, .. } if status == "completed"));
    }

    #[test]
    fn second_running_row_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.begin_reload_impl(&new_reload(t(0))).unwrap();
        let err = store.begin_reload_impl(&new_reload(t(1))).unwrap_err();
        match err {
            StorageError::AlreadyRunning { id } => assert_eq!(id, first.id),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
    }

    #[test]
    fn complete_sets_terminal_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let row = store.begin_reload_impl(&new_reload(t(0))).unwrap();
        let conn = store.lock_conn().unwrap();
        let done = complete_reload_on_conn(&conn, row.id, t(90), 12, 3).unwrap();
        assert_eq!(done.status, ReloadStatus::Completed);
        assert_eq!(done.completed_at, Some(t(90)));
        assert_eq!(done.records_processed, 12);
        assert_eq!(done.issues_deleted, 3);
        assert_eq!(done.duration_seconds, Some(90));
        assert_eq!(done.error_message, None);
    }

    #[test]
    fn terminal_rows_cannot_transition_again() {
        let store = SqliteStore::open_in_memory().unwrap();
        let row = store.begin_reload_impl(&new_reload(t(0))).unwrap();
        let conn = store.lock_conn().unwrap();
        fail_reload_on_conn(&conn, row.id, t(5), 0, "boom").unwrap();

        let err = complete_reload_on_conn(&conn, row.id, t(6), 1, 0).unwrap_err();
        assert!(matches!(err, StorageError::NotRunning { .. }));
        let again = get_reload_on_conn(&conn, row.id).unwrap();
        assert_eq!(again.status, ReloadStatus::Failed);
        assert_eq!(again.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn fail_requires_message() {
        let store = SqliteStore::open_in_memory().unwrap();
        let row = store.begin_reload_impl(&new_reload(t(0))).unwrap();
        let conn = store.lock_conn().unwrap();
        assert!(matches!(
            fail_reload_on_conn(&conn, row.id, t(1), 0, "  "),
            Err(StorageError::Validation { .. })
        ));
    }

    #[test]
    fn slot_frees_after_terminal_transition() {
        let store = SqliteStore::open_in_memory().unwrap();
        let row = store.begin_reload_impl(&new_reload(t(0))).unwrap();
        {
            let conn = store.lock_conn().unwrap();
            complete_reload_on_conn(&conn, row.id, t(1), 0, 0).unwrap();
        }
        let next = store.begin_reload_impl(&new_reload(t(2))).unwrap();
        assert!(next.id > row.id);
        assert_eq!(
            store.latest_finished_reload_impl().unwrap().map(|r| r.id),
            Some(row.id)
        );
    }

    #[test]
    fn list_orders_newest_first_and_filters() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..3 {
            let row = store.begin_reload_impl(&new_reload(t(i * 10))).unwrap();
            let conn = store.lock_conn().unwrap();
            if i == 1 {
                fail_reload_on_conn(&conn, row.id, t(i * 10 + 1), 0, "nope").unwrap();
            } else {
                complete_reload_on_conn(&conn, row.id, t(i * 10 + 1), 0, 0).unwrap();
            }
        }

        let all = store.list_reloads_impl(&ReloadFilter::default()).unwrap();
        let started: Vec<_> = all.iter().map(|r| r.reload_started).collect();
        assert_eq!(started, vec![t(20), t(10), t(0)]);

        let failed = store
            .list_reloads_impl(&ReloadFilter {
                status: Some(ReloadStatus::Failed),
                limit: None,
            })
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].reload_started, t(10));

        let limited = store
            .list_reloads_impl(&ReloadFilter { status: None, limit: Some(1) })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn missing_reload_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_reload_impl(42).unwrap_err().is_not_found());
    }

    #[test]
    fn parse_status_rejects_unknown() {
        assert_eq!(parse_reload_status("failed").unwrap(), ReloadStatus::Failed);
        assert!(parse_reload_status("paused").is_err());
        assert_eq!(parse_reload_source("scheduled").unwrap(), ReloadSource::Scheduled);
    }
}
