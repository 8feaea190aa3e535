//! Periodic driver for scheduled reloads and incremental passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use harvest_core::reload::ReloadTracking;

use crate::clock::Clock;
use crate::coordinator::ReloadCoordinator;
use crate::error::{EngineError, Result};
use crate::traversal::HarvestReport;

/// What one scheduler tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// A scheduled reload ran to completion.
    Reload(ReloadTracking),
    /// A scheduled reload ran and failed; the row is marked failed.
    ReloadFailed { reload_id: i64, error: EngineError },
    /// An incremental pass ran.
    Incremental(HarvestReport),
    /// Something was due, but a reload was already running.
    Busy { reload_id: i64 },
    Idle,
}

/// Polls the coordinator on a fixed interval.
pub struct Scheduler {
    coordinator: Arc<ReloadCoordinator>,
    clock: Arc<dyn Clock>,
    incremental_interval: Option<chrono::Duration>,
    poll: Duration,
    last_incremental: Mutex<DateTime<Utc>>,
}

impl Scheduler {
    pub fn new(
        coordinator: Arc<ReloadCoordinator>,
        clock: Arc<dyn Clock>,
        incremental_interval: Option<chrono::Duration>,
        poll: Duration,
    ) -> Self {
        let now = clock.now();
        Self {
            coordinator,
            clock,
            incremental_interval,
            poll,
            last_incremental: Mutex::new(now),
        }
    }

    /// Runs a scheduled reload if the data is stale, otherwise an
    /// incremental pass if one is due. Running rows whose lease lapsed
    /// since the last tick are recovered first.
    pub fn tick(&self) -> Result<TickOutcome> {
        self.coordinator.recover()?;
        if let Some(active) = self.coordinator.active_reload()? {
            debug!(reload_id = active.id, "reload in progress, skipping tick");
            return Ok(TickOutcome::Busy {
                reload_id: active.id,
            });
        }

        if self.coordinator.reload_needed()? {
            info!("refresh interval elapsed, starting scheduled reload");
            return match self.coordinator.trigger_scheduled() {
                Ok(outcome) => {
                    self.mark_incremental();
                    Ok(TickOutcome::Reload(outcome.reload))
                }
                Err(EngineError::AlreadyRunning { reload_id }) => {
                    Ok(TickOutcome::Busy { reload_id })
                }
                Err(e @ EngineError::ReloadFailed { reload_id, .. })
                | Err(e @ EngineError::Superseded { reload_id }) => {
                    Ok(TickOutcome::ReloadFailed { reload_id, error: e })
                }
                Err(e) => Err(e),
            };
        }

        let Some(interval) = self.incremental_interval else {
            return Ok(TickOutcome::Idle);
        };
        let last = *self
            .last_incremental
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if self.clock.now() - last < interval {
            return Ok(TickOutcome::Idle);
        }

        match self.coordinator.harvester().run_incremental() {
            Ok(report) => {
                self.mark_incremental();
                Ok(TickOutcome::Incremental(report))
            }
            Err(EngineError::AlreadyRunning { reload_id }) => Ok(TickOutcome::Busy { reload_id }),
            Err(e) => {
                // Wait a full interval before trying again.
                self.mark_incremental();
                Err(e)
            }
        }
    }

    fn mark_incremental(&self) {
        *self
            .last_incremental
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = self.clock.now();
    }

    /// Ticks until `stop` is set. Tick errors are logged and do not end the
    /// loop.
    pub fn run(&self, stop: &AtomicBool) {
        const STEP: Duration = Duration::from_millis(200);
        info!(poll_secs = self.poll.as_secs(), "scheduler started");

        while !stop.load(Ordering::SeqCst) {
            match self.tick() {
                Ok(TickOutcome::ReloadFailed { reload_id, error }) => {
                    warn!(reload_id, %error, "scheduled reload failed");
                }
                Ok(TickOutcome::Reload(reload)) => {
                    debug!(reload_id = reload.id, "scheduled reload finished");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "scheduler tick failed"),
            }

            let mut waited = Duration::ZERO;
            while waited < self.poll && !stop.load(Ordering::SeqCst) {
                let step = STEP.min(self.poll - waited);
                std::thread::sleep(step);
                waited += step;
            }
        }
        info!("scheduler stopped");
    }
}
