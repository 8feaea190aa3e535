//! Errors returned by [`Storage`](crate::traits::Storage) implementations.

/// Everything that can go wrong between `hv` and its database.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No row with that key or id.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The single-flight slot is taken; `id` is the reload holding it.
    #[error("reload {id} is already running")]
    AlreadyRunning { id: i64 },

    /// Complete/fail hit a row some other writer already finalized.
    #[error("{entity} {id} is not running (status: {status})")]
    NotRunning {
        entity: &'static str,
        id: i64,
        status: String,
    },

    /// Input rejected before touching SQL (empty keys, bad stored enums).
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    /// Schema DDL failed while opening the database.
    #[error("migration {name} failed: {reason}")]
    Migration { name: String, reason: String },

    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// Labels and child-type lists are stored as JSON text.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when a reload could not start because another one holds the slot.
    pub fn is_already_running(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. })
    }

    /// True for lock contention with another `hv` process on the same file.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Transaction(_) => true,
            Self::Query(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
