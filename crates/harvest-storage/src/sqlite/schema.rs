//! DDL for the SQLite schema.
//!
//! Timestamps are stored as TEXT in a fixed-width ISO 8601 format
//! (`%Y-%m-%dT%H:%M:%S%.3fZ`), so lexical comparison in SQL is chronological
//! comparison. JSON blobs (labels, child type lists) are TEXT.

/// Schema version stored in `PRAGMA user_version`. Bump on any DDL change.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// DDL applied by [`SqliteStore::open`](super::SqliteStore::open) when
/// `user_version` is behind [`CURRENT_SCHEMA_VERSION`].
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // -- Issues ---------------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS issues (
        key          TEXT PRIMARY KEY,
        content_hash TEXT NOT NULL DEFAULT '',
        summary      TEXT NOT NULL DEFAULT '',
        type_id      INTEGER NOT NULL,
        parent_key   TEXT,
        source       TEXT NOT NULL DEFAULT 'jira',
        status       TEXT NOT NULL DEFAULT '',
        assignee     TEXT,
        labels       TEXT NOT NULL DEFAULT '[]',
        team         TEXT,
        created_at   TEXT,
        updated_at   TEXT,
        harvested_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_issues_harvested_at ON issues(harvested_at)",
    "CREATE INDEX IF NOT EXISTS idx_issues_parent_key ON issues(parent_key)",
    "CREATE INDEX IF NOT EXISTS idx_issues_type_id ON issues(type_id)",
    // -- Reload tracking ------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS reload_tracking (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        reload_started    TEXT NOT NULL,
        status            TEXT NOT NULL
                          CHECK (status IN ('running', 'completed', 'failed')),
        completed_at      TEXT,
        records_processed INTEGER NOT NULL DEFAULT 0,
        issues_deleted    INTEGER NOT NULL DEFAULT 0,
        duration_seconds  INTEGER,
        source            TEXT NOT NULL
                          CHECK (source IN ('manual', 'automatic', 'scheduled')),
        triggered_by      TEXT NOT NULL DEFAULT '',
        error_message     TEXT,
        owner             TEXT NOT NULL DEFAULT '',
        heartbeat_at      TEXT,
        CHECK (status != 'failed' OR length(coalesce(error_message, '')) > 0)
    )
    "#,
    // At most one running row, enforced by the database itself.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_reload_tracking_running
        ON reload_tracking(status) WHERE status = 'running'
    "#,
    "CREATE INDEX IF NOT EXISTS idx_reload_tracking_started ON reload_tracking(reload_started)",
    // -- Harvest jobs ---------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS harvest_jobs (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        reload_id         INTEGER REFERENCES reload_tracking(id),
        started_at        TEXT NOT NULL,
        completed_at      TEXT,
        status            TEXT NOT NULL
                          CHECK (status IN ('running', 'completed', 'failed')),
        records_processed INTEGER NOT NULL DEFAULT 0,
        error_message     TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_harvest_jobs_started ON harvest_jobs(started_at)",
    // -- Issue types ----------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS issue_types (
        id        INTEGER PRIMARY KEY,
        name      TEXT NOT NULL,
        children  TEXT NOT NULL DEFAULT '[]',
        synced_at TEXT NOT NULL
    )
    "#,
];

/// In-place upgrades for databases created at an older version, keyed by
/// the version they produce. A fresh database gets the current DDL directly.
pub const UPGRADES: &[(i32, &str)] = &[(
    2,
    "ALTER TABLE reload_tracking ADD COLUMN owner TEXT NOT NULL DEFAULT '';
     ALTER TABLE reload_tracking ADD COLUMN heartbeat_at TEXT;",
)];
