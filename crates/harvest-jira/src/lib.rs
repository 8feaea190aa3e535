//! Issue sources for the harvest system.
//!
//! [`ExternalIssueSource`] is the paginated search contract the engine
//! consumes; [`JiraSource`] implements it against Jira Cloud with retry,
//! backoff and blacklist filtering.

pub mod blacklist;
pub mod client;
pub mod parse;
pub mod retry;
pub mod source;

pub use blacklist::{Blacklist, BlacklistReason};
pub use client::{JiraSettings, JiraSource};
pub use retry::RetryPolicy;
pub use source::{ExternalIssueSource, SourceError, SourceIssue, SourcePage};
