//! Harvest orchestration.
//!
//! [`Harvester`] walks the configured issue hierarchy breadth-first and
//! upserts everything it finds. [`ReloadCoordinator`] wraps a pass in the
//! single-flight reload lifecycle with stale-record cleanup and crash
//! recovery. [`Scheduler`] drives both on a timer.

pub mod clock;
pub mod coordinator;
pub mod error;
pub mod scheduler;
pub mod traversal;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{
    RECOVERY_MESSAGE, RecoveredReload, ReloadCoordinator, ReloadOutcome, ReloadRequest,
    StartupReport,
};
pub use error::{EngineError, Result};
pub use scheduler::{Scheduler, TickOutcome};
pub use traversal::{FailedBranch, HarvestOptions, HarvestReport, Harvester};
