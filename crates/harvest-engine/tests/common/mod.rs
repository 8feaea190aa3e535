//! Shared fixtures for the engine integration tests: an in-memory issue
//! tracker that answers the predicates the harvester builds, plus a fully
//! wired harness around a SQLite store and a manual clock.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use harvest_core::filter::IssueFilter;
use harvest_core::hierarchy::{IssueType, IssueTypeHierarchy, TypeId};
use harvest_core::issue::Issue;
use harvest_core::query::{Predicate, RootCriteria, quote};
use harvest_engine::{Clock, HarvestOptions, Harvester, ManualClock, ReloadCoordinator};
use harvest_jira::{ExternalIssueSource, SourceError, SourceIssue, SourcePage};
use harvest_storage::{SqliteStore, Storage};

pub const PV: TypeId = 10;
pub const FEATURE: TypeId = 20;
pub const ADOPTION: TypeId = 30;
pub const STORY: TypeId = 40;
pub const TASK: TypeId = 50;

const PAGE_SIZE: usize = 2;

pub fn t(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
}

pub fn hierarchy() -> IssueTypeHierarchy {
    IssueTypeHierarchy::from_types([
        IssueType::new(PV, "Product Version", [FEATURE, ADOPTION]),
        IssueType::new(FEATURE, "Feature", [STORY, TASK]),
        IssueType::new(ADOPTION, "Customer Adoption", [STORY]),
        IssueType::new(STORY, "Story", []),
        IssueType::new(TASK, "Task", []),
    ])
    .unwrap()
}

fn type_name(id: TypeId) -> Option<String> {
    let name = match id {
        PV => "Product Version",
        FEATURE => "Feature",
        ADOPTION => "Customer Adoption",
        STORY => "Story",
        TASK => "Task",
        _ => return None,
    };
    Some(name.to_string())
}

/// Builds a source record with the type name filled in for known ids.
pub fn item(key: &str, type_id: TypeId, parent: Option<&str>) -> SourceIssue {
    let mut issue = SourceIssue::new(key, type_id);
    issue.type_name = type_name(type_id);
    issue.parent_key = parent.map(str::to_string);
    issue.summary = format!("summary of {key}");
    issue.status = "Open".to_string();
    issue
}

// ---------------------------------------------------------------------------
// Fake source
// ---------------------------------------------------------------------------

/// In-memory tracker. Root queries match parentless issues whose type name
/// appears in the predicate; child queries match on `parent = "KEY"`;
/// assignee queries match on `assignee = "X"`. Results are paged.
#[derive(Default)]
pub struct FakeSource {
    issues: Mutex<Vec<SourceIssue>>,
    failing: Mutex<HashSet<String>>,
    roots_fail: Mutex<bool>,
    calls: Mutex<Vec<String>>,
    hold: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl FakeSource {
    pub fn new(issues: Vec<SourceIssue>) -> Self {
        Self {
            issues: Mutex::new(issues),
            ..Default::default()
        }
    }

    pub fn set_issues(&self, issues: Vec<SourceIssue>) {
        *self.issues.lock().unwrap() = issues;
    }

    pub fn remove(&self, key: &str) {
        self.issues.lock().unwrap().retain(|i| i.key != key);
    }

    pub fn edit(&self, key: &str, f: impl FnOnce(&mut SourceIssue)) {
        let mut issues = self.issues.lock().unwrap();
        if let Some(i) = issues.iter_mut().find(|i| i.key == key) {
            f(i);
        }
    }

    /// Child queries for `parent` (or assignee queries for that name) fail.
    pub fn fail_for(&self, parent_or_assignee: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(parent_or_assignee.to_string());
    }

    pub fn fail_roots(&self, fail: bool) {
        *self.roots_fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Makes the next root query block. Returns a receiver signalled when
    /// the query has started and a sender that lets it proceed.
    pub fn hold_next_root(&self) -> (Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.hold.lock().unwrap() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    fn matches(&self, jql: &str) -> Result<Vec<SourceIssue>, SourceError> {
        let issues = self.issues.lock().unwrap().clone();
        let failing = self.failing.lock().unwrap().clone();

        if let Some(rest) = jql.strip_prefix("parent = ") {
            let parent = first_quoted(rest);
            if failing.contains(&parent) {
                return Err(SourceError::unavailable(format!("children of {parent} timed out")));
            }
            return Ok(issues
                .into_iter()
                .filter(|i| i.parent_key.as_deref() == Some(parent.as_str()))
                .collect());
        }

        if let Some(rest) = jql.strip_prefix("assignee = ") {
            let who = first_quoted(rest);
            if failing.contains(&who) {
                return Err(SourceError::unavailable(format!("assignee {who} timed out")));
            }
            return Ok(issues
                .into_iter()
                .filter(|i| i.assignee.as_deref() == Some(who.as_str()))
                .collect());
        }

        let held = self.hold.lock().unwrap().take();
        if let Some((entered, release)) = held {
            let _ = entered.send(());
            let _ = release.recv();
        }
        if *self.roots_fail.lock().unwrap() {
            return Err(SourceError::unavailable("root query timed out"));
        }
        Ok(issues
            .into_iter()
            .filter(|i| i.parent_key.is_none())
            .filter(|i| {
                i.type_name
                    .as_deref()
                    .is_some_and(|n| jql.contains(&quote(n)))
            })
            .collect())
    }
}

fn first_quoted(s: &str) -> String {
    s.split('"').nth(1).unwrap_or_default().to_string()
}

impl ExternalIssueSource for FakeSource {
    fn search(
        &self,
        predicate: &Predicate,
        page_token: Option<&str>,
    ) -> Result<SourcePage, SourceError> {
        let jql = predicate.as_str().to_string();
        if page_token.is_none() {
            self.calls.lock().unwrap().push(jql.clone());
        }
        let all = self.matches(&jql)?;
        let offset: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (offset + PAGE_SIZE).min(all.len());
        Ok(SourcePage {
            items: all[offset.min(end)..end].to_vec(),
            next_page_token: (end < all.len()).then(|| end.to_string()),
        })
    }

    fn check_connection(&self) -> Result<String, SourceError> {
        Ok("fake".to_string())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub source: Arc<FakeSource>,
    pub store: Arc<SqliteStore>,
    pub clock: Arc<ManualClock>,
    pub harvester: Arc<Harvester>,
    pub coordinator: Arc<ReloadCoordinator>,
}

impl Harness {
    pub fn new(issues: Vec<SourceIssue>) -> Self {
        Self::with_options(issues, |_| {})
    }

    pub fn with_options(issues: Vec<SourceIssue>, tweak: impl FnOnce(&mut HarvestOptions)) -> Self {
        let mut options = HarvestOptions {
            root: RootCriteria {
                projects: Vec::new(),
                type_names: vec!["Product Version".to_string()],
                labels: Vec::new(),
            },
            ..Default::default()
        };
        tweak(&mut options);

        let source = Arc::new(FakeSource::new(issues));
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t(8, 0)));
        let harvester = Arc::new(Harvester::new(
            source.clone() as Arc<dyn ExternalIssueSource>,
            store.clone() as Arc<dyn Storage>,
            Arc::new(hierarchy()),
            clock.clone() as Arc<dyn Clock>,
            options,
        ));
        let coordinator = Arc::new(ReloadCoordinator::new(
            store.clone() as Arc<dyn Storage>,
            harvester.clone(),
            clock.clone() as Arc<dyn Clock>,
            chrono::Duration::hours(24),
        ));
        Self {
            source,
            store,
            clock,
            harvester,
            coordinator,
        }
    }

    /// Another coordinator on the same store, as a second `hv` process
    /// would have: its own owner name and lease.
    pub fn coordinator_with_lease(&self, lease: chrono::Duration) -> Arc<ReloadCoordinator> {
        Arc::new(
            ReloadCoordinator::new(
                self.store.clone() as Arc<dyn Storage>,
                self.harvester.clone(),
                self.clock.clone() as Arc<dyn Clock>,
                chrono::Duration::hours(24),
            )
            .with_lease(lease),
        )
    }

    pub fn stored(&self) -> Vec<Issue> {
        self.store.list_issues(&IssueFilter::default()).unwrap()
    }

    pub fn keys(&self) -> Vec<String> {
        self.stored().into_iter().map(|i| i.key).collect()
    }

    pub fn issue(&self, key: &str) -> Issue {
        self.store.get_issue(key).unwrap()
    }
}

/// PV-1 → FEAT-2 → STORY-3.
pub fn worked_example() -> Vec<SourceIssue> {
    vec![
        item("PV-1", PV, None),
        item("FEAT-2", FEATURE, Some("PV-1")),
        item("STORY-3", STORY, Some("FEAT-2")),
    ]
}
