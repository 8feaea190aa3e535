//! Issue upsert, lookup and bulk-delete operations for [`SqliteStore`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use harvest_core::content_hash::compute_content_hash;
use harvest_core::enums::IssueSource;
use harvest_core::filter::IssueFilter;
use harvest_core::issue::Issue;

use crate::error::{Result, StorageError};
use crate::sqlite::store::SqliteStore;
use crate::traits::UpsertOutcome;

// ---------------------------------------------------------------------------
// Column list (shared between INSERT and SELECT)
// ---------------------------------------------------------------------------

/// All issue columns in a deterministic order for SELECT queries.
pub(crate) const ISSUE_COLUMNS: &str = r#"
    key, content_hash, summary, type_id, parent_key, source, status,
    assignee, labels, team, created_at, updated_at, harvested_at
"#;

// ---------------------------------------------------------------------------
// Row scanning
// ---------------------------------------------------------------------------

/// Deserialises a row into an [`Issue`].
pub(crate) fn scan_issue(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let labels_str: String = row.get("labels")?;
    let labels: BTreeSet<String> = serde_json::from_str(&labels_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let source: String = row.get("source")?;

    Ok(Issue {
        key: row.get("key")?,
        content_hash: row.get("content_hash")?,
        summary: row.get("summary")?,
        type_id: row.get("type_id")?,
        parent_key: row.get("parent_key")?,
        source: IssueSource::from(source),
        status: row.get("status")?,
        assignee: row.get("assignee")?,
        labels,
        team: row.get("team")?,
        created_at: get_datetime_opt(row, "created_at")?,
        updated_at: get_datetime_opt(row, "updated_at")?,
        harvested_at: get_datetime(row, "harvested_at")?,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Formats a `DateTime<Utc>` as fixed-width ISO 8601 TEXT for SQLite.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parses an ISO 8601 TEXT string from SQLite into a `DateTime<Utc>`.
pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>().ok().or_else(|| {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
            .map(|ndt| ndt.and_utc())
            .ok()
    })
}

/// Reads a required timestamp column.
pub(crate) fn get_datetime(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_datetime(&raw).ok_or_else(|| bad_timestamp(column, &raw))
}

/// Reads a nullable timestamp column.
pub(crate) fn get_datetime_opt(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    match raw {
        None => Ok(None),
        Some(raw) => parse_datetime(&raw)
            .map(Some)
            .ok_or_else(|| bad_timestamp(column, &raw)),
    }
}

fn bad_timestamp(column: &str, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("invalid timestamp in {column}: {raw:?}").into(),
    )
}

// ---------------------------------------------------------------------------
// SqliteStore issue methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Inserts or replaces a single issue.
    pub fn upsert_issue_impl(&self, issue: &Issue) -> Result<UpsertOutcome> {
        let conn = self.lock_conn()?;
        upsert_issue_on_conn(&conn, issue)
    }

    /// Retrieves an issue by key.
    pub fn get_issue_impl(&self, key: &str) -> Result<Issue> {
        let conn = self.lock_conn()?;
        get_issue_on_conn(&conn, key)
    }

    /// Lists issues matching a filter.
    pub fn list_issues_impl(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;
        list_issues_on_conn(&conn, filter)
    }

    /// Counts all stored issues.
    pub fn count_issues_impl(&self) -> Result<i64> {
        let conn = self.lock_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?)
    }

    /// Deletes issues harvested strictly before `threshold`.
    pub fn delete_issues_older_than_impl(&self, threshold: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock_conn()?;
        delete_issues_older_than_on_conn(&conn, threshold)
    }

    /// Deletes issues harvested at or after `since`.
    pub fn delete_issues_harvested_since_impl(&self, since: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock_conn()?;
        delete_issues_harvested_since_on_conn(&conn, since)
    }
}

// ---------------------------------------------------------------------------
// Connection-level helpers (used by both SqliteStore and Transaction)
// ---------------------------------------------------------------------------

/// Upserts one issue on the given connection.
///
/// The conflict branch only fires when the incoming `harvested_at` is not
/// older than the stored one, which keeps `harvested_at` monotonic even if
/// two passes interleave.
pub(crate) fn upsert_issue_on_conn(conn: &Connection, issue: &Issue) -> Result<UpsertOutcome> {
    if issue.key.is_empty() {
        return Err(StorageError::validation("issue key must not be empty"));
    }

    let content_hash = compute_content_hash(issue);
    let harvested_at = format_datetime(&issue.harvested_at);

    let existing: Option<(String, String)> = conn
        .query_row(
            "SELECT content_hash, harvested_at FROM issues WHERE key = ?1",
            params![issue.key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let outcome = match &existing {
        None => UpsertOutcome::Inserted,
        Some((_, stored_at)) if *stored_at > harvested_at => UpsertOutcome::Ignored,
        Some((stored_hash, _)) if *stored_hash == content_hash => UpsertOutcome::Unchanged,
        Some(_) => UpsertOutcome::Updated,
    };
    if outcome == UpsertOutcome::Ignored {
        return Ok(outcome);
    }

    let labels = serde_json::to_string(&issue.labels)?;
    conn.execute(
        r#"
        INSERT INTO issues (
            key, content_hash, summary, type_id, parent_key, source, status,
            assignee, labels, team, created_at, updated_at, harvested_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(key) DO UPDATE SET
            content_hash = excluded.content_hash,
            summary      = excluded.summary,
            type_id      = excluded.type_id,
            parent_key   = excluded.parent_key,
            source       = excluded.source,
            status       = excluded.status,
            assignee     = excluded.assignee,
            labels       = excluded.labels,
            team         = excluded.team,
            created_at   = excluded.created_at,
            updated_at   = excluded.updated_at,
            harvested_at = excluded.harvested_at
        WHERE excluded.harvested_at >= issues.harvested_at
        "#,
        params![
            issue.key,
            content_hash,
            issue.summary,
            issue.type_id,
            issue.parent_key,
            issue.source.as_str(),
            issue.status,
            issue.assignee,
            labels,
            issue.team,
            issue.created_at.as_ref().map(format_datetime),
            issue.updated_at.as_ref().map(format_datetime),
            harvested_at,
        ],
    )?;

    Ok(outcome)
}

/// Retrieves a single issue by key on the given connection.
pub(crate) fn get_issue_on_conn(conn: &Connection, key: &str) -> Result<Issue> {
    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE key = ?1");
    conn.query_row(&sql, params![key], scan_issue)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("issue", key),
            other => StorageError::Query(other),
        })
}

/// Lists issues on the given connection.
pub(crate) fn list_issues_on_conn(conn: &Connection, filter: &IssueFilter) -> Result<Vec<Issue>> {
    let mut where_clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(type_id) = filter.type_id {
        param_values.push(Box::new(type_id));
        where_clauses.push(format!("type_id = ?{}", param_values.len()));
    }
    if let Some(ref parent) = filter.parent_key {
        param_values.push(Box::new(parent.clone()));
        where_clauses.push(format!("parent_key = ?{}", param_values.len()));
    }
    if filter.no_parent {
        where_clauses.push("parent_key IS NULL".to_string());
    }
    if let Some(ref status) = filter.status {
        param_values.push(Box::new(status.clone()));
        where_clauses.push(format!("status = ?{}", param_values.len()));
    }
    if let Some(ref assignee) = filter.assignee {
        param_values.push(Box::new(assignee.clone()));
        where_clauses.push(format!("assignee = ?{}", param_values.len()));
    }
    if let Some(ref source) = filter.source {
        param_values.push(Box::new(source.as_str().to_string()));
        where_clauses.push(format!("source = ?{}", param_values.len()));
    }
    if let Some(ref label) = filter.label {
        param_values.push(Box::new(label.clone()));
        where_clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each(issues.labels) WHERE json_each.value = ?{})",
            param_values.len()
        ));
    }
    if let Some(ref needle) = filter.summary_contains {
        param_values.push(Box::new(format!("%{needle}%")));
        where_clauses.push(format!("summary LIKE ?{}", param_values.len()));
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_clauses.join(" AND "))
    };
    let limit_sql = filter
        .limit
        .map(|l| format!(" LIMIT {l}"))
        .unwrap_or_default();

    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues {where_sql} ORDER BY key ASC{limit_sql}");

    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(param_refs.as_slice(), scan_issue)?;

    let mut issues = Vec::new();
    for row in rows {
        issues.push(row?);
    }
    Ok(issues)
}

/// Stale cleanup: deletes issues harvested strictly before `threshold`.
pub(crate) fn delete_issues_older_than_on_conn(
    conn: &Connection,
    threshold: DateTime<Utc>,
) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM issues WHERE harvested_at < ?1",
        params![format_datetime(&threshold)],
    )?)
}

/// Crash rollback: deletes issues harvested at or after `since`.
pub(crate) fn delete_issues_harvested_since_on_conn(
    conn: &Connection,
    since: DateTime<Utc>,
) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM issues WHERE harvested_at >= ?1",
        params![format_datetime(&since)],
    )?)
}
