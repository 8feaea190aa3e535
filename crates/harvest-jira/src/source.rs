//! The paginated issue-source contract consumed by the harvest engine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use harvest_core::enums::IssueSource;
use harvest_core::hierarchy::TypeId;
use harvest_core::query::{Predicate, QueryError};

/// Errors surfaced by an [`ExternalIssueSource`] after its own retries.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network failure, timeout, or a 5xx response.
    #[error("source unavailable: {message}")]
    Unavailable { message: String },

    /// The source kept answering 429.
    #[error("rate limited by source{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The source refused the request (bad query, auth, permissions).
    #[error("source rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response body could not be understood.
    #[error("failed to parse source response: {0}")]
    Parse(String),

    /// The predicate failed local validation and was never sent.
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    /// Required connection settings are missing.
    #[error("source not configured: {0}")]
    NotConfigured(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::RateLimited { .. })
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// One issue as reported by the source, before type resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceIssue {
    pub key: String,
    pub source: IssueSource,
    /// Upstream type id, if it was numeric.
    pub type_id: Option<TypeId>,
    pub type_name: Option<String>,
    /// Parent as reported upstream.
    pub parent_key: Option<String>,
    pub summary: String,
    pub status: String,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
    pub team: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SourceIssue {
    /// Minimal issue, mostly for tests and fakes.
    pub fn new(key: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            key: key.into(),
            source: IssueSource::Jira,
            type_id: Some(type_id),
            type_name: None,
            parent_key: None,
            summary: String::new(),
            status: String::new(),
            assignee: None,
            labels: Vec::new(),
            team: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Project part of the key (`PV` for `PV-12`).
    pub fn project(&self) -> &str {
        self.key.split('-').next().unwrap_or_default()
    }
}

/// A page of results plus the opaque token for the next page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcePage {
    pub items: Vec<SourceIssue>,
    pub next_page_token: Option<String>,
}

/// Paginated search over an external issue tracker.
///
/// Implementations own retry, backoff and timeouts; callers only see the
/// terminal outcome of each page request.
pub trait ExternalIssueSource: Send + Sync {
    /// Fetches one page of matches. `page_token` is `None` for the first page.
    fn search(&self, predicate: &Predicate, page_token: Option<&str>) -> Result<SourcePage>;

    /// Verifies connectivity and credentials, returning the account name.
    fn check_connection(&self) -> Result<String>;

    /// Drains every page for `predicate`.
    fn search_all(&self, predicate: &Predicate) -> Result<Vec<SourceIssue>> {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.search(predicate, token.as_deref())?;
            items.extend(page.items);
            match page.next_page_token {
                Some(next) if Some(&next) != token.as_ref() => token = Some(next),
                _ => break,
            }
        }
        Ok(items)
    }
}
