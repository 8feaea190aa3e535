//! Engine error type.

use harvest_core::hierarchy::HierarchyError;
use harvest_core::query::QueryError;
use harvest_jira::SourceError;
use harvest_storage::StorageError;

/// Errors produced by harvest passes and the reload lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed hierarchy or root criteria. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The issue source failed after its own retries.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Reading or writing the store failed.
    #[error("persistence error: {0}")]
    Persistence(#[source] StorageError),

    /// Another reload holds the running slot.
    #[error("reload {reload_id} is already running")]
    AlreadyRunning { reload_id: i64 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The reload was failed by someone else (force or recovery) before it
    /// could finalize; its finalize was rolled back.
    #[error("reload {reload_id} was superseded before it could finish")]
    Superseded { reload_id: i64 },

    /// A reload reached the `failed` state.
    #[error("reload {reload_id} failed: {cause}")]
    ReloadFailed {
        reload_id: i64,
        #[source]
        cause: Box<EngineError>,
    },

    /// Every child fetch of a pass failed.
    #[error("all {attempted} branch fetches failed; first error: {first_error}")]
    AllBranchesFailed {
        attempted: usize,
        first_error: String,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::AlreadyRunning { id } => Self::AlreadyRunning { reload_id: id },
            StorageError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Persistence(other),
        }
    }
}

impl From<QueryError> for EngineError {
    fn from(e: QueryError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<HierarchyError> for EngineError {
    fn from(e: HierarchyError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl EngineError {
    pub fn is_already_running(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether trying again later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AlreadyRunning { .. } | Self::AllBranchesFailed { .. } => true,
            Self::Source(e) => e.is_retryable(),
            Self::Persistence(e) => e.is_retryable(),
            Self::ReloadFailed { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }

    /// Message stored on a failed tracking row; never empty.
    pub fn failure_message(&self) -> String {
        let msg = self.to_string();
        if msg.trim().is_empty() {
            "reload failed".to_string()
        } else {
            msg
        }
    }
}
