//! Terminal styling for `hv` output.
//!
//! Ayu-themed colors for reload and job states, compact issue lines, and
//! terminal capability detection.

pub mod styles;
pub mod terminal;
