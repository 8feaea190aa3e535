//! Jira REST v3 search response models and their conversion to
//! [`SourceIssue`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use harvest_core::enums::IssueSource;

use crate::source::SourceIssue;

/// Custom field holding the owning team.
pub const TEAM_FIELD: &str = "customfield_10001";

/// Fields requested from the search endpoint.
pub const SEARCH_FIELDS: &[&str] = &[
    "summary",
    "assignee",
    "status",
    "labels",
    "issuetype",
    "parent",
    "created",
    "updated",
    TEAM_FIELD,
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub start_at: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub issues: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIssue {
    #[serde(default)]
    key: String,
    #[serde(default)]
    fields: RawFields,
}

#[derive(Debug, Default, Deserialize)]
struct RawFields {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    issuetype: Option<Named>,
    #[serde(default)]
    parent: Option<ParentRef>,
    #[serde(default)]
    status: Option<Named>,
    #[serde(default)]
    assignee: Option<User>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(default, rename = "customfield_10001")]
    team: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Named {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParentRef {
    #[serde(default)]
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    #[serde(default)]
    email_address: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Myself {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
}

/// Converts one element of `issues[]`. Returns `None` (with a warning) for
/// entries without a key or with a shape that cannot be read.
pub(crate) fn parse_issue(value: Value) -> Option<SourceIssue> {
    let raw: RawIssue = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "skipping unparseable issue");
            return None;
        }
    };
    if raw.key.is_empty() {
        warn!("skipping issue without a key");
        return None;
    }

    let f = raw.fields;
    let (type_id, type_name) = match f.issuetype {
        Some(t) => (t.id.as_ref().and_then(type_id_of), t.name),
        None => (None, None),
    };

    Some(SourceIssue {
        source: IssueSource::Jira,
        type_id,
        type_name,
        parent_key: f.parent.and_then(|p| p.key),
        summary: f.summary.unwrap_or_default(),
        status: f
            .status
            .and_then(|s| s.name)
            .unwrap_or_else(|| "Unknown".to_string()),
        assignee: f.assignee.and_then(|u| u.email_address.or(u.display_name)),
        labels: f.labels,
        team: f.team.as_ref().and_then(team_of),
        created_at: f.created.as_deref().and_then(|s| timestamp(&raw.key, s)),
        updated_at: f.updated.as_deref().and_then(|s| timestamp(&raw.key, s)),
        key: raw.key,
    })
}

/// Jira sends type ids as strings (`"10001"`); numbers are accepted too.
fn type_id_of(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Team may be a plain string or an option/team object.
fn team_of(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["value", "name", "displayName"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string),
        other => Some(other.to_string()),
    }
}

fn timestamp(key: &str, raw: &str) -> Option<DateTime<Utc>> {
    let parsed = parse_jira_datetime(raw);
    if parsed.is_none() {
        warn!(key, value = raw, "ignoring unparseable timestamp");
    }
    parsed
}

/// Parses Jira timestamps such as `2024-01-15T10:30:00.000+0000`, plus
/// RFC 3339 forms (`Z`, `+01:00`).
pub fn parse_jira_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
