//! Configuration management for the harvest system.
//!
//! This crate loads `.harvest/config.yaml` layered with `HARVEST_*`
//! environment overrides, discovers `.harvest/` directories in the
//! filesystem, and provides typed access to harvest settings.

pub mod config;
pub mod harvest_dir;

pub use config::{ConfigError, HarvestConfig, load_config, save_config};
pub use harvest_dir::{ensure_harvest_dir, find_harvest_dir, find_harvest_dir_or_error};
