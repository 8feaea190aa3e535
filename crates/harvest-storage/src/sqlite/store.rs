//! [`SqliteStore`]: the SQLite database behind every `hv` command.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::sqlite::schema::{CURRENT_SCHEMA_VERSION, SCHEMA_STATEMENTS, UPGRADES};

/// Pragmas applied to every connection. WAL lets `hv status` read while
/// `hv serve` writes; the busy timeout absorbs short write contention
/// between processes sharing the file.
const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;";

/// Implements [`Storage`](crate::traits::Storage) over a single connection.
///
/// Calls are serialized through the mutex. Processes sharing the database
/// file rely on SQLite locking plus the partial unique index on running
/// reloads, so the single-flight guard holds across processes too.
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens the database file, creating it and its schema if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening harvest database");
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Connection(format!("{}: {e}", path.display())))?;
        Self::prepare(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        debug!("opening in-memory harvest database");
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(format!("in-memory: {e}")))?;
        Self::prepare(conn)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.execute_batch(CONNECTION_PRAGMAS)
            .map_err(|e| StorageError::Connection(format!("pragmas: {e}")))?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Locks the shared connection for one storage call.
    pub(crate) fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Connection("connection mutex poisoned".into()))
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Brings the schema up to [`CURRENT_SCHEMA_VERSION`]. An existing database
/// first gets the [`UPGRADES`] newer than its version; the `IF NOT EXISTS`
/// DDL then adds whatever tables and indexes are still missing.
fn apply_schema(conn: &Connection) -> Result<()> {
    let found = schema_version(conn)?;
    if found >= CURRENT_SCHEMA_VERSION {
        debug!(version = found, "schema up to date");
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    if found > 0 {
        for (version, sql) in UPGRADES.iter().filter(|(v, _)| *v > found) {
            tx.execute_batch(sql).map_err(|e| StorageError::Migration {
                name: format!("upgrade to v{version}"),
                reason: e.to_string(),
            })?;
        }
    }
    for (n, stmt) in SCHEMA_STATEMENTS.iter().enumerate() {
        tx.execute_batch(stmt).map_err(|e| StorageError::Migration {
            name: format!("schema v{CURRENT_SCHEMA_VERSION} statement {n}"),
            reason: e.to_string(),
        })?;
    }
    // PRAGMA does not take bound parameters.
    tx.execute_batch(&format!("PRAGMA user_version = {CURRENT_SCHEMA_VERSION}"))?;
    tx.commit()?;

    info!(from = found, to = CURRENT_SCHEMA_VERSION, "harvest schema applied");
    Ok(())
}
