//! Reload tracking rows and harvest job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{JobStatus, ReloadSource, ReloadStatus};

/// Durable record of one full reload.
///
/// Created in `running` state when a trigger acquires the single-flight slot
/// and moved exactly once to `completed` or `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadTracking {
    pub id: i64,
    pub reload_started: DateTime<Utc>,
    pub status: ReloadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: i64,
    pub issues_deleted: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    pub source: ReloadSource,
    pub triggered_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Process instance executing the reload.
    #[serde(default)]
    pub owner: String,
    /// Last liveness stamp written by the owner while running.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub heartbeat_at: Option<DateTime<Utc>>,
}

impl ReloadTracking {
    pub fn is_running(&self) -> bool {
        self.status == ReloadStatus::Running
    }

    /// When the owner last proved it was alive.
    pub fn last_seen(&self) -> DateTime<Utc> {
        self.heartbeat_at.unwrap_or(self.reload_started)
    }

    /// True when a running row has gone `lease` without a heartbeat.
    pub fn lease_expired(&self, now: DateTime<Utc>, lease: chrono::Duration) -> bool {
        self.is_running() && now - self.last_seen() >= lease
    }

    /// Whole seconds between `reload_started` and `at`, never negative.
    pub fn elapsed_seconds(&self, at: DateTime<Utc>) -> i64 {
        (at - self.reload_started).num_seconds().max(0)
    }
}

/// Values needed to open a new reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReload {
    pub reload_started: DateTime<Utc>,
    pub source: ReloadSource,
    pub triggered_by: String,
    pub owner: String,
}

/// Filter for listing reload history.
#[derive(Debug, Clone, Default)]
pub struct ReloadFilter {
    pub status: Option<ReloadStatus>,
    pub limit: Option<u32>,
}

impl ReloadFilter {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Effective row limit, clamped to `1..=MAX_LIMIT`.
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

/// Record of one harvest pass, whether part of a reload or incremental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestJob {
    pub id: i64,
    /// The reload this pass belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub records_processed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
