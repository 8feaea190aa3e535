//! Issue struct -- the record produced by a harvest pass.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::IssueSource;
use crate::hierarchy::TypeId;

/// A single harvested record.
///
/// `key` is the global identity; every other field is overwritten on each
/// upsert. `parent_key` is a soft reference and may name an issue that is not
/// (or no longer) stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,

    /// Internal: SHA256 of the harvested content, used to detect no-op upserts.
    #[serde(skip)]
    pub content_hash: String,

    #[serde(default)]
    pub summary: String,

    /// Resolved hierarchy type id (may be the sentinel).
    pub type_id: TypeId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,

    #[serde(default)]
    pub source: IssueSource,

    #[serde(default)]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,

    // ===== Upstream timestamps =====
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// When this record was last discovered by a successful harvest.
    pub harvested_at: DateTime<Utc>,
}

impl Issue {
    /// Returns `true` if the issue carries the given label.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Returns `true` if the issue was harvested strictly before `t`.
    pub fn is_stale_at(&self, t: DateTime<Utc>) -> bool {
        self.harvested_at < t
    }
}

/// Builder for constructing an [`Issue`] with a fluent API.
pub struct IssueBuilder {
    issue: Issue,
}

impl IssueBuilder {
    /// Creates a new builder for the given key and type.
    ///
    /// `harvested_at` defaults to now; harvest passes always override it.
    pub fn new(key: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            issue: Issue {
                key: key.into(),
                content_hash: String::new(),
                summary: String::new(),
                type_id,
                parent_key: None,
                source: IssueSource::default(),
                status: String::new(),
                assignee: None,
                labels: BTreeSet::new(),
                team: None,
                created_at: None,
                updated_at: None,
                harvested_at: Utc::now(),
            },
        }
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.issue.summary = summary.into();
        self
    }

    pub fn parent_key(mut self, parent: impl Into<String>) -> Self {
        self.issue.parent_key = Some(parent.into());
        self
    }

    pub fn source(mut self, source: IssueSource) -> Self {
        self.issue.source = source;
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.issue.status = status.into();
        self
    }

    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.issue.assignee = Some(assignee.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.issue.labels.insert(label.into());
        self
    }

    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.issue.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn team(mut self, team: impl Into<String>) -> Self {
        self.issue.team = Some(team.into());
        self
    }

    pub fn created_at(mut self, t: DateTime<Utc>) -> Self {
        self.issue.created_at = Some(t);
        self
    }

    pub fn updated_at(mut self, t: DateTime<Utc>) -> Self {
        self.issue.updated_at = Some(t);
        self
    }

    pub fn harvested_at(mut self, t: DateTime<Utc>) -> Self {
        self.issue.harvested_at = t;
        self
    }

    /// Consumes the builder and returns the issue.
    pub fn build(self) -> Issue {
        self.issue
    }
}
