//! Blocking Jira Cloud client implementing [`ExternalIssueSource`].

use std::fmt;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

use harvest_core::query::Predicate;

use crate::blacklist::Blacklist;
use crate::parse::{self, Myself, SEARCH_FIELDS, SearchResponse};
use crate::retry::RetryPolicy;
use crate::source::{ExternalIssueSource, Result, SourceError, SourcePage};

/// Connection settings for [`JiraSource`].
#[derive(Clone)]
pub struct JiraSettings {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub page_size: u32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub blacklist: Blacklist,
}

impl fmt::Debug for JiraSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraSettings")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("blacklist", &self.blacklist)
            .finish()
    }
}

/// Issue source backed by the Jira REST API v3 search endpoint.
pub struct JiraSource {
    settings: JiraSettings,
    agent: ureq::Agent,
    auth_header: String,
}

impl fmt::Debug for JiraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraSource")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl JiraSource {
    /// Builds a client. Fails if the base URL or credentials are missing.
    pub fn new(settings: JiraSettings) -> Result<Self> {
        if settings.base_url.trim().is_empty() {
            return Err(SourceError::NotConfigured("jira.base_url is empty".into()));
        }
        if settings.email.trim().is_empty() || settings.api_token.trim().is_empty() {
            return Err(SourceError::NotConfigured(
                "jira.email and jira.api_token are required".into(),
            ));
        }

        let config = ureq::Agent::config_builder()
            .timeout_global(Some(settings.timeout))
            .http_status_as_error(false)
            .build();
        let agent = ureq::Agent::new_with_config(config);

        let credentials = format!("{}:{}", settings.email, settings.api_token);
        let auth_header = format!("Basic {}", STANDARD.encode(credentials));

        Ok(Self {
            settings,
            agent,
            auth_header,
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/rest/api/3/{}",
            self.settings.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Sends one request and classifies the outcome.
    fn send_once<T: DeserializeOwned>(
        &self,
        method: &str,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let url = self.api_url(endpoint);
        let started = Instant::now();
        debug!(method, endpoint, "jira request");

        let sent = match body {
            Some(body) => self
                .agent
                .post(&url)
                .header("Authorization", &self.auth_header)
                .header("Accept", "application/json")
                .send_json(body),
            None => self
                .agent
                .get(&url)
                .header("Authorization", &self.auth_header)
                .header("Accept", "application/json")
                .call(),
        };
        let mut response = sent.map_err(|e| {
            SourceError::unavailable(format!("{method} {endpoint} failed: {e}"))
        })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| SourceError::unavailable(format!("reading response body: {e}")))?;

        debug!(
            method,
            endpoint,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "jira response"
        );

        classify(status, retry_after, &text)?;
        serde_json::from_str(&text).map_err(|e| {
            SourceError::Parse(format!("{e} in body: {}", truncate_for_error(&text)))
        })
    }

    fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        self.settings.retry.run(
            endpoint,
            || self.send_once(method, endpoint, body),
            std::thread::sleep,
        )
    }
}

/// Maps an HTTP status onto the source error taxonomy.
fn classify(status: u16, retry_after: Option<Duration>, body: &str) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        429 => Err(SourceError::RateLimited { retry_after }),
        500..=599 | 408 => Err(SourceError::unavailable(format!(
            "Jira API returned HTTP {status}: {}",
            truncate_for_error(body)
        ))),
        _ => Err(SourceError::Rejected {
            status,
            message: truncate_for_error(body),
        }),
    }
}

fn truncate_for_error(body: &str) -> String {
    const MAX_LEN: usize = 200;
    if body.chars().count() <= MAX_LEN {
        body.to_owned()
    } else {
        format!("{}...", body.chars().take(MAX_LEN).collect::<String>())
    }
}

/// Offset of the page after `resp`, or `None` when it was the last one.
fn next_offset(resp: &SearchResponse, returned: usize) -> Option<u64> {
    let next = resp.start_at + returned as u64;
    (returned > 0 && next < resp.total).then_some(next)
}

impl ExternalIssueSource for JiraSource {
    fn search(&self, predicate: &Predicate, page_token: Option<&str>) -> Result<SourcePage> {
        predicate.validate()?;

        let start_at: u64 = match page_token {
            None => 0,
            Some(t) => t
                .parse()
                .map_err(|_| SourceError::Parse(format!("invalid page token {t:?}")))?,
        };
        let body = json!({
            "jql": predicate.as_str(),
            "startAt": start_at,
            "maxResults": self.settings.page_size,
            "fields": SEARCH_FIELDS,
        });

        let resp: SearchResponse = self.send("POST", "search", Some(&body))?;
        let returned = resp.issues.len();
        let next_page_token = next_offset(&resp, returned).map(|n| n.to_string());

        let mut items = Vec::with_capacity(returned);
        let mut dropped = 0usize;
        for value in resp.issues {
            let Some(issue) = parse::parse_issue(value) else {
                continue;
            };
            if let Some(reason) = self.settings.blacklist.reason(&issue) {
                debug!(key = %issue.key, %reason, "skipping blacklisted issue");
                dropped += 1;
                continue;
            }
            items.push(issue);
        }
        if dropped > 0 {
            info!(dropped, jql = %predicate, "filtered blacklisted issues");
        }

        Ok(SourcePage {
            items,
            next_page_token,
        })
    }

    fn check_connection(&self) -> Result<String> {
        let me: Myself = self.send("GET", "myself", None)?;
        Ok(me
            .display_name
            .or(me.email_address)
            .unwrap_or_else(|| "unknown".to_string()))
    }
}
