//! SQLite-backed storage implementation.

mod issue_types;
mod issues;
mod jobs;
mod reloads;
pub mod schema;
mod store;
mod transaction;

pub use reloads::{parse_reload_source, parse_reload_status};
pub use store::SqliteStore;
