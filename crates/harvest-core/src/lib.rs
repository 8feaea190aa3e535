//! Core types for the harvest system.
//!
//! Domain models shared by every other crate: harvested [`issue::Issue`]s,
//! the validated [`hierarchy::IssueTypeHierarchy`], JQL predicate building,
//! and the reload/harvest-job lifecycle records.

pub mod content_hash;
pub mod enums;
pub mod filter;
pub mod hierarchy;
pub mod issue;
pub mod query;
pub mod reload;
