//! Reload lifecycle: single-flight acquisition, finalize, failure, forced
//! supersession and startup recovery.
//!
//! The running slot is a `reload_tracking` row with `status = 'running'`,
//! guarded by a unique index in the store. Every transition out of
//! `running` is a compare-and-set, so whichever of finalize, failure, force
//! or recovery gets there first wins and the others see `Superseded`.
//!
//! A running row names its owner and carries a heartbeat refreshed while
//! the reload executes. Recovery only fails rows whose owner is gone: rows
//! this coordinator is still executing are never touched, and rows owned
//! elsewhere are left alone until their lease lapses.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use harvest_core::enums::{ReloadSource, ReloadStatus};
use harvest_core::reload::{NewReload, ReloadFilter, ReloadTracking};
use harvest_storage::{Storage, StorageError};

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::traversal::{HarvestReport, Harvester};

/// Message stored on rows and jobs failed by recovery.
pub const RECOVERY_MESSAGE: &str = "Interrupted by process shutdown; recovered";

/// How long a running row stays live without a heartbeat.
pub const DEFAULT_LEASE_SECS: i64 = 120;

static NEXT_COORDINATOR: AtomicU64 = AtomicU64::new(0);

/// Who asked for a reload and whether to override a running one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub source: ReloadSource,
    pub triggered_by: String,
    pub force: bool,
}

impl ReloadRequest {
    pub fn manual(triggered_by: impl Into<String>, force: bool) -> Self {
        Self {
            source: ReloadSource::Manual,
            triggered_by: triggered_by.into(),
            force,
        }
    }

    pub fn scheduled() -> Self {
        Self {
            source: ReloadSource::Scheduled,
            triggered_by: "scheduler".to_string(),
            force: false,
        }
    }

    pub fn automatic(triggered_by: impl Into<String>) -> Self {
        Self {
            source: ReloadSource::Automatic,
            triggered_by: triggered_by.into(),
            force: false,
        }
    }
}

/// A finished reload.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadOutcome {
    pub reload: ReloadTracking,
    pub report: HarvestReport,
}

/// One running row repaired at startup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveredReload {
    pub reload_id: i64,
    pub reload_started: DateTime<Utc>,
    pub issues_rolled_back: usize,
}

/// Result of [`ReloadCoordinator::recover_and_maybe_trigger`].
#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
    pub recovered: Vec<RecoveredReload>,
    /// The reload started at startup, in its final state.
    pub reload: Option<ReloadTracking>,
}

/// Drives reloads through `running → completed | failed`.
pub struct ReloadCoordinator {
    store: Arc<dyn Storage>,
    harvester: Arc<Harvester>,
    clock: Arc<dyn Clock>,
    refresh_interval: chrono::Duration,
    /// Written to `reload_tracking.owner` for rows this coordinator opens.
    owner: String,
    lease: chrono::Duration,
    heartbeat_every: std::time::Duration,
    /// Ids of reloads this coordinator is executing right now.
    in_flight: Mutex<HashSet<i64>>,
}

/// Drops the id from the in-flight set when execution ends, however it ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<i64>>,
    id: i64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl ReloadCoordinator {
    pub fn new(
        store: Arc<dyn Storage>,
        harvester: Arc<Harvester>,
        clock: Arc<dyn Clock>,
        refresh_interval: chrono::Duration,
    ) -> Self {
        let owner = format!(
            "pid {} #{}",
            std::process::id(),
            NEXT_COORDINATOR.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            store,
            harvester,
            clock,
            refresh_interval,
            owner,
            lease: chrono::Duration::seconds(DEFAULT_LEASE_SECS),
            heartbeat_every: heartbeat_period(chrono::Duration::seconds(DEFAULT_LEASE_SECS)),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Sets the lease; heartbeats go out four times per lease.
    pub fn with_lease(mut self, lease: chrono::Duration) -> Self {
        self.lease = lease;
        self.heartbeat_every = heartbeat_period(lease);
        self
    }

    pub fn harvester(&self) -> &Arc<Harvester> {
        &self.harvester
    }

    /// Identifies this coordinator in `reload_tracking.owner`.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn lease(&self) -> chrono::Duration {
        self.lease
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<i64>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the owner of a running row may still be working on it.
    fn is_live(&self, row: &ReloadTracking, now: DateTime<Utc>) -> bool {
        if row.owner == self.owner {
            return self.in_flight().contains(&row.id);
        }
        !row.lease_expired(now, self.lease)
    }

    // -- Triggers ------------------------------------------------------------

    pub fn trigger_manual(&self, triggered_by: &str, force: bool) -> Result<ReloadOutcome> {
        self.trigger(&ReloadRequest::manual(triggered_by, force))
    }

    pub fn trigger_scheduled(&self) -> Result<ReloadOutcome> {
        self.trigger(&ReloadRequest::scheduled())
    }

    /// Acquires the running slot and runs the reload to a terminal state.
    ///
    /// Returns the completed row, or `ReloadFailed` after the row has been
    /// marked failed. `AlreadyRunning` is returned without touching the
    /// store when the slot is taken and `force` is not set.
    pub fn trigger(&self, request: &ReloadRequest) -> Result<ReloadOutcome> {
        let tracking = self.begin(request)?;
        let _in_flight = InFlight {
            set: &self.in_flight,
            id: tracking.id,
        };
        self.execute(tracking)
    }

    /// Opens the running row and registers it as in flight. With `force`,
    /// an existing running row is failed in the same transaction.
    fn begin(&self, request: &ReloadRequest) -> Result<ReloadTracking> {
        let superseded: Cell<Option<i64>> = Cell::new(None);
        let opened: RefCell<Option<ReloadTracking>> = RefCell::new(None);

        let result = self.store.run_in_transaction(&|tx| {
            // Read under the connection lock so start times follow commit order.
            let started = self.clock.now();
            if request.force {
                if let Some(active) = tx.active_reload()? {
                    let message = format!(
                        "Superseded by forced {} reload requested by {} at {}",
                        request.source,
                        request.triggered_by,
                        started.format("%Y-%m-%dT%H:%M:%S%.3fZ")
                    );
                    tx.fail_reload(active.id, started, active.records_processed, &message)?;
                    superseded.set(Some(active.id));
                }
            }
            let row = tx.insert_reload(&NewReload {
                reload_started: started,
                source: request.source,
                triggered_by: request.triggered_by.clone(),
                owner: self.owner.clone(),
            })?;
            self.in_flight().insert(row.id);
            *opened.borrow_mut() = Some(row);
            Ok(())
        });

        if let Err(e) = result {
            if let Some(row) = opened.borrow().as_ref() {
                self.in_flight().remove(&row.id);
            }
            if let StorageError::AlreadyRunning { id } = &e {
                info!(running = id, requested_by = %request.triggered_by, "reload rejected, another is running");
            }
            return Err(e.into());
        }

        let tracking = opened
            .into_inner()
            .ok_or_else(|| EngineError::Persistence(StorageError::Internal(
                "reload transaction did not open a row".into(),
            )))?;
        if let Some(old) = superseded.get() {
            warn!(
                superseded_reload_id = old,
                reload_id = tracking.id,
                forced_by = %request.triggered_by,
                "forced reload superseded a running reload"
            );
        }
        info!(
            reload_id = tracking.id,
            source = %tracking.source,
            triggered_by = %tracking.triggered_by,
            owner = %tracking.owner,
            forced = request.force,
            "reload started"
        );
        Ok(tracking)
    }

    /// Harvests for an open row and moves it to a terminal state, sending
    /// heartbeats until the harvest returns.
    fn execute(&self, tracking: ReloadTracking) -> Result<ReloadOutcome> {
        let reload_id = tracking.id;
        let started = tracking.reload_started;

        let (report, harvested) = thread::scope(|scope| {
            let (stop, stopped) = mpsc::channel::<()>();
            scope.spawn(move || self.heartbeat_loop(reload_id, stopped));
            let pass = self.harvester.run_pass(Some(reload_id), started);
            drop(stop);
            pass
        });
        if let Err(e) = harvested {
            return Err(self.fail(reload_id, e, report.records_processed));
        }

        let finished = self.clock.now();
        let records = report.records_processed;
        let completed: RefCell<Option<ReloadTracking>> = RefCell::new(None);
        let finalized = self.store.run_in_transaction(&|tx| {
            let deleted = tx.delete_issues_older_than(started)?;
            let row = tx.complete_reload(reload_id, finished, records, deleted as i64)?;
            *completed.borrow_mut() = Some(row);
            Ok(())
        });

        match finalized {
            Ok(()) => {
                let reload = match completed.into_inner() {
                    Some(row) => row,
                    None => self.store.get_reload(reload_id)?,
                };
                info!(
                    reload_id,
                    records = reload.records_processed,
                    deleted = reload.issues_deleted,
                    duration_seconds = ?reload.duration_seconds,
                    partial = report.is_partial(),
                    "reload completed"
                );
                Ok(ReloadOutcome { reload, report })
            }
            Err(StorageError::NotRunning { .. }) => {
                warn!(reload_id, "reload was superseded, finalize rolled back");
                Err(EngineError::Superseded { reload_id })
            }
            Err(e) => Err(self.fail(reload_id, EngineError::from(e), records)),
        }
    }

    /// Refreshes `heartbeat_at` every `heartbeat_every` until `stopped`
    /// disconnects or the row leaves `running`.
    fn heartbeat_loop(&self, reload_id: i64, stopped: mpsc::Receiver<()>) {
        loop {
            match stopped.recv_timeout(self.heartbeat_every) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
            match self
                .store
                .heartbeat_reload(reload_id, &self.owner, self.clock.now())
            {
                Ok(()) => debug!(reload_id, "reload heartbeat"),
                Err(StorageError::NotRunning { .. }) => {
                    debug!(reload_id, "reload no longer running, heartbeat stopped");
                    return;
                }
                Err(e) => warn!(reload_id, error = %e, "reload heartbeat failed"),
            }
        }
    }

    /// Marks the row failed and wraps `cause`. A row that already left
    /// `running` yields `Superseded` instead.
    fn fail(&self, reload_id: i64, cause: EngineError, records: i64) -> EngineError {
        let message = cause.failure_message();
        let at = self.clock.now();
        let marked = self
            .store
            .run_in_transaction(&|tx| tx.fail_reload(reload_id, at, records, &message).map(|_| ()));

        match marked {
            Ok(()) => {
                error!(reload_id, records, error = %message, "reload failed");
                EngineError::ReloadFailed {
                    reload_id,
                    cause: Box::new(cause),
                }
            }
            Err(StorageError::NotRunning { .. }) => {
                warn!(reload_id, error = %message, "reload failed after being superseded");
                EngineError::Superseded { reload_id }
            }
            Err(e) => {
                error!(reload_id, error = %e, cause = %message, "could not record reload failure");
                EngineError::ReloadFailed {
                    reload_id,
                    cause: Box::new(cause),
                }
            }
        }
    }

    // -- Startup -------------------------------------------------------------

    /// Repairs running reloads whose owner is gone: deletes issues written
    /// at or after the reload's start, fails its running harvest jobs and
    /// marks it failed. Live rows are skipped.
    pub fn recover(&self) -> Result<Vec<RecoveredReload>> {
        let recovered: RefCell<Vec<RecoveredReload>> = RefCell::new(Vec::new());
        let live: RefCell<Vec<i64>> = RefCell::new(Vec::new());

        self.store.run_in_transaction(&|tx| {
            recovered.borrow_mut().clear();
            live.borrow_mut().clear();
            let at = self.clock.now();
            for row in tx.running_reloads()? {
                if self.is_live(&row, at) {
                    live.borrow_mut().push(row.id);
                    continue;
                }
                let rolled_back = tx.delete_issues_harvested_since(row.reload_started)?;
                tx.fail_running_jobs(
                    row.id,
                    at,
                    &format!("{RECOVERY_MESSAGE} with reload {}", row.id),
                )?;
                let message = format!(
                    "{RECOVERY_MESSAGE} ({rolled_back} partially harvested issues rolled back)"
                );
                tx.fail_reload(row.id, at, row.records_processed, &message)?;
                recovered.borrow_mut().push(RecoveredReload {
                    reload_id: row.id,
                    reload_started: row.reload_started,
                    issues_rolled_back: rolled_back,
                });
            }
            Ok(())
        })?;

        for id in live.into_inner() {
            info!(reload_id = id, "running reload is live, left alone");
        }
        let recovered = recovered.into_inner();
        for r in &recovered {
            warn!(
                reload_id = r.reload_id,
                rolled_back = r.issues_rolled_back,
                "recovered interrupted reload"
            );
        }
        if recovered.is_empty() {
            debug!("nothing to recover");
        }
        Ok(recovered)
    }

    /// True when no reload is running and none has finished within the
    /// refresh interval.
    pub fn reload_needed(&self) -> Result<bool> {
        if self.store.active_reload()?.is_some() {
            return Ok(false);
        }
        let Some(latest) = self.store.latest_finished_reload()? else {
            info!("no finished reload on record, reload needed");
            return Ok(true);
        };
        let since = self.clock.now() - latest.reload_started;
        if since >= self.refresh_interval {
            info!(
                last_reload_id = latest.id,
                last_status = %latest.status,
                minutes_since = since.num_minutes(),
                "refresh interval elapsed, reload needed"
            );
            return Ok(true);
        }
        debug!(
            last_reload_id = latest.id,
            next_in_minutes = (self.refresh_interval - since).num_minutes(),
            "data is fresh"
        );
        Ok(false)
    }

    /// Process start: recovery first, then a reload if one is due.
    ///
    /// Returns `AlreadyRunning` when a live reload holds the slot, whether
    /// it survived recovery or won the race to start.
    pub fn recover_and_maybe_trigger(&self) -> Result<StartupReport> {
        let recovered = self.recover()?;

        if let Some(active) = self.store.active_reload()? {
            info!(reload_id = active.id, owner = %active.owner, "startup reload skipped, another is running");
            return Err(EngineError::AlreadyRunning {
                reload_id: active.id,
            });
        }
        if !self.reload_needed()? {
            info!("data is fresh, no startup reload needed");
            return Ok(StartupReport {
                recovered,
                reload: None,
            });
        }

        let reload = match self.trigger(&ReloadRequest::automatic("startup")) {
            Ok(outcome) => Some(outcome.reload),
            Err(EngineError::ReloadFailed { reload_id, .. })
            | Err(EngineError::Superseded { reload_id }) => Some(self.store.get_reload(reload_id)?),
            Err(e) => return Err(e),
        };
        Ok(StartupReport { recovered, reload })
    }

    // -- Queries -------------------------------------------------------------

    pub fn get_reload(&self, id: i64) -> Result<ReloadTracking> {
        Ok(self.store.get_reload(id)?)
    }

    /// Most recent first; `limit` is clamped to `1..=100`.
    pub fn list_reloads(
        &self,
        limit: Option<u32>,
        status: Option<ReloadStatus>,
    ) -> Result<Vec<ReloadTracking>> {
        Ok(self.store.list_reloads(&ReloadFilter { status, limit })?)
    }

    pub fn active_reload(&self) -> Result<Option<ReloadTracking>> {
        Ok(self.store.active_reload()?)
    }
}

fn heartbeat_period(lease: chrono::Duration) -> std::time::Duration {
    (lease / 4)
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(1))
        .max(std::time::Duration::from_millis(10))
}
