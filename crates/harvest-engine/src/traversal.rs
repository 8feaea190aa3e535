//! Breadth-first harvest of the issue hierarchy.
//!
//! A pass evaluates the root predicate, upserts every match with the pass
//! timestamp, then drains a work queue of `(parent_key, child_type_ids)`
//! entries. Sibling child queries are fetched concurrently in batches of
//! `fetch_concurrency`; every upsert happens on the calling thread, so
//! writes for a key are never concurrent.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use harvest_core::hierarchy::{IssueTypeHierarchy, TypeId};
use harvest_core::issue::{Issue, IssueBuilder};
use harvest_core::query::{QueryBuilder, RootCriteria};
use harvest_core::reload::HarvestJob;
use harvest_jira::{ExternalIssueSource, SourceError, SourceIssue};
use harvest_storage::{Storage, StorageError, UpsertOutcome};

use crate::clock::Clock;
use crate::error::{EngineError, Result};

/// Tunables for a pass.
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub root: RootCriteria,
    /// Expansion stops below this many levels under the roots.
    pub max_depth: u32,
    pub fetch_concurrency: usize,
    /// Assignees queried after the hierarchy walk.
    pub team_members: Vec<String>,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            root: RootCriteria::default(),
            max_depth: 10,
            fetch_concurrency: 4,
            team_members: Vec::new(),
        }
    }
}

/// A child query that failed without aborting the pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedBranch {
    pub parent_key: String,
    pub error: String,
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HarvestReport {
    pub job_id: Option<i64>,
    pub harvested_at: Option<DateTime<Utc>>,
    /// Distinct issues upserted this pass. Includes `ignored` ones, which
    /// reached the store but lost to a newer stored copy.
    pub records_processed: i64,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Upserts skipped because the stored row was newer.
    pub ignored: usize,
    /// Issues stored under the sentinel type.
    pub unknown_types: usize,
    /// Frontier entries not expanded because of `max_depth`.
    pub depth_limited: usize,
    pub deepest_level: u32,
    pub failed_branches: Vec<FailedBranch>,
    pub team_member_records: usize,
    pub team_member_failures: Vec<FailedBranch>,
}

impl HarvestReport {
    pub fn is_partial(&self) -> bool {
        !self.failed_branches.is_empty() || !self.team_member_failures.is_empty()
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        self.records_processed += 1;
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
            UpsertOutcome::Ignored => self.ignored += 1,
        }
    }
}

struct Frontier {
    parent_key: String,
    child_types: Vec<TypeId>,
    depth: u32,
}

/// Runs harvest passes against one source and store.
pub struct Harvester {
    source: Arc<dyn ExternalIssueSource>,
    store: Arc<dyn Storage>,
    hierarchy: Arc<IssueTypeHierarchy>,
    clock: Arc<dyn Clock>,
    options: HarvestOptions,
}

impl Harvester {
    pub fn new(
        source: Arc<dyn ExternalIssueSource>,
        store: Arc<dyn Storage>,
        hierarchy: Arc<IssueTypeHierarchy>,
        clock: Arc<dyn Clock>,
        options: HarvestOptions,
    ) -> Self {
        Self {
            source,
            store,
            hierarchy,
            clock,
            options,
        }
    }

    pub fn hierarchy(&self) -> &IssueTypeHierarchy {
        &self.hierarchy
    }

    pub fn options(&self) -> &HarvestOptions {
        &self.options
    }

    /// A pass outside any reload: no stale cleanup, stamped with "now".
    ///
    /// Refused while a reload is running, since crash recovery of that
    /// reload would roll these writes back along with its own. The check,
    /// the timestamp and the job row are taken in one transaction; a reload
    /// that starts afterwards stamps a later `reload_started`, so recovery
    /// of it never reaches this pass's rows.
    pub fn run_incremental(&self) -> Result<HarvestReport> {
        let blocked: Cell<Option<i64>> = Cell::new(None);
        let opened: RefCell<Option<(HarvestJob, DateTime<Utc>)>> = RefCell::new(None);
        self.store.run_in_transaction(&|tx| {
            if let Some(active) = tx.active_reload()? {
                blocked.set(Some(active.id));
                return Ok(());
            }
            let t0 = self.clock.now();
            *opened.borrow_mut() = Some((tx.create_harvest_job(None, t0)?, t0));
            Ok(())
        })?;

        if let Some(reload_id) = blocked.get() {
            debug!(reload_id, "incremental harvest refused, reload running");
            return Err(EngineError::AlreadyRunning { reload_id });
        }
        let Some((job, t0)) = opened.into_inner() else {
            return Err(EngineError::Persistence(StorageError::Internal(
                "incremental harvest did not open a job".into(),
            )));
        };
        info!(job_id = job.id, harvested_at = %t0, "starting incremental harvest");
        let (report, result) = self.run_job(job, t0);
        result.map(|()| report)
    }

    /// One pass stamped with `harvested_at`, recorded as a harvest job.
    pub fn run(&self, reload_id: Option<i64>, harvested_at: DateTime<Utc>) -> Result<HarvestReport> {
        let (report, result) = self.run_pass(reload_id, harvested_at);
        result.map(|()| report)
    }

    /// Like [`run`](Self::run), but the report comes back on failure too,
    /// carrying whatever the pass stored before it stopped.
    pub fn run_pass(
        &self,
        reload_id: Option<i64>,
        harvested_at: DateTime<Utc>,
    ) -> (HarvestReport, Result<()>) {
        match self.store.create_harvest_job(reload_id, self.clock.now()) {
            Ok(job) => self.run_job(job, harvested_at),
            Err(e) => (HarvestReport::default(), Err(e.into())),
        }
    }

    fn run_job(&self, job: HarvestJob, harvested_at: DateTime<Utc>) -> (HarvestReport, Result<()>) {
        let reload_id = job.reload_id;
        let mut report = HarvestReport {
            job_id: Some(job.id),
            harvested_at: Some(harvested_at),
            ..Default::default()
        };
        let result = self.traverse(harvested_at, &mut report);
        let finished_at = self.clock.now();

        match result {
            Ok(()) => {
                if let Err(e) =
                    self.store
                        .complete_harvest_job(job.id, finished_at, report.records_processed)
                {
                    return (report, Err(e.into()));
                }
                info!(
                    job_id = job.id,
                    ?reload_id,
                    records = report.records_processed,
                    inserted = report.inserted,
                    updated = report.updated,
                    failed_branches = report.failed_branches.len(),
                    "harvest pass complete"
                );
                (report, Ok(()))
            }
            Err(e) => {
                if let Err(job_err) = self.store.fail_harvest_job(
                    job.id,
                    finished_at,
                    report.records_processed,
                    &e.failure_message(),
                ) {
                    warn!(job_id = job.id, error = %job_err, "could not record job failure");
                }
                warn!(
                    job_id = job.id,
                    ?reload_id,
                    records = report.records_processed,
                    error = %e,
                    "harvest pass failed"
                );
                (report, Err(e))
            }
        }
    }

    fn traverse(&self, t0: DateTime<Utc>, report: &mut HarvestReport) -> Result<()> {
        let root_predicate = QueryBuilder::root_predicate(&self.options.root)?;
        debug!(jql = %root_predicate, "root query");
        let roots = self.source.search_all(&root_predicate)?;
        if roots.is_empty() {
            warn!(jql = %root_predicate, "root query matched nothing");
        } else {
            info!(roots = roots.len(), "root issues found");
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<Frontier> = VecDeque::new();

        for item in roots {
            let parent = item.parent_key.clone();
            if let Some(frontier) = self.store_issue(item, parent, t0, 0, &mut visited, report)? {
                queue.push_back(frontier);
            }
        }

        let mut attempted = 0usize;
        let mut succeeded = 0usize;
        let batch_size = self.options.fetch_concurrency.max(1);

        while !queue.is_empty() {
            let mut batch = Vec::with_capacity(batch_size);
            while batch.len() < batch_size {
                let Some(entry) = queue.pop_front() else { break };
                if entry.depth + 1 > self.options.max_depth {
                    warn!(
                        parent_key = %entry.parent_key,
                        depth = entry.depth,
                        max_depth = self.options.max_depth,
                        "depth limit reached, not expanding"
                    );
                    report.depth_limited += 1;
                    continue;
                }
                let names = self.hierarchy.names_of(&entry.child_types);
                match QueryBuilder::child_predicate(&entry.parent_key, &names) {
                    Some(predicate) => batch.push((entry, predicate)),
                    None => continue,
                }
            }
            if batch.is_empty() {
                continue;
            }

            let results = self.fetch_batch(&batch);
            for ((entry, _), result) in batch.into_iter().zip(results) {
                attempted += 1;
                match result {
                    Ok(children) => {
                        succeeded += 1;
                        debug!(
                            parent_key = %entry.parent_key,
                            depth = entry.depth + 1,
                            children = children.len(),
                            "children fetched"
                        );
                        for child in children {
                            let next = self.store_issue(
                                child,
                                Some(entry.parent_key.clone()),
                                t0,
                                entry.depth + 1,
                                &mut visited,
                                report,
                            )?;
                            if let Some(frontier) = next {
                                queue.push_back(frontier);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(parent_key = %entry.parent_key, error = %e, "child fetch failed");
                        report.failed_branches.push(FailedBranch {
                            parent_key: entry.parent_key,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        if attempted > 0 && succeeded == 0 {
            let first_error = report
                .failed_branches
                .first()
                .map(|b| b.error.clone())
                .unwrap_or_default();
            return Err(EngineError::AllBranchesFailed {
                attempted,
                first_error,
            });
        }

        self.harvest_team_members(t0, &mut visited, report)?;
        Ok(())
    }

    /// Fetches all pages for each predicate, in parallel, preserving order.
    fn fetch_batch(
        &self,
        batch: &[(Frontier, harvest_core::query::Predicate)],
    ) -> Vec<std::result::Result<Vec<SourceIssue>, SourceError>> {
        let source: &dyn ExternalIssueSource = self.source.as_ref();
        if batch.len() == 1 {
            return vec![source.search_all(&batch[0].1)];
        }
        std::thread::scope(|s| {
            let handles: Vec<_> = batch
                .iter()
                .map(|(_, predicate)| s.spawn(move || source.search_all(predicate)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(SourceError::unavailable("fetch worker panicked"))
                    })
                })
                .collect()
        })
    }

    /// Upserts one discovered issue and returns its frontier entry, if it
    /// has children to expand. Already-visited keys are skipped.
    fn store_issue(
        &self,
        item: SourceIssue,
        parent_key: Option<String>,
        t0: DateTime<Utc>,
        depth: u32,
        visited: &mut HashSet<String>,
        report: &mut HarvestReport,
    ) -> Result<Option<Frontier>> {
        if !visited.insert(item.key.clone()) {
            return Ok(None);
        }

        let issue_type = self
            .hierarchy
            .resolve(item.type_id, item.type_name.as_deref());
        if issue_type.is_unknown() {
            debug!(
                key = %item.key,
                type_id = ?item.type_id,
                type_name = ?item.type_name,
                "unknown issue type, storing as leaf"
            );
            report.unknown_types += 1;
        }
        let type_id = issue_type.id;
        let child_types = self.hierarchy.children_of(type_id).to_vec();

        let issue = to_issue(item, type_id, parent_key, t0);
        let outcome = self.store.upsert_issue(&issue)?;
        report.record(outcome);
        report.deepest_level = report.deepest_level.max(depth);

        if child_types.is_empty() {
            return Ok(None);
        }
        Ok(Some(Frontier {
            parent_key: issue.key,
            child_types,
            depth,
        }))
    }

    /// Supplementary per-assignee queries. Failures are recorded, not fatal.
    fn harvest_team_members(
        &self,
        t0: DateTime<Utc>,
        visited: &mut HashSet<String>,
        report: &mut HarvestReport,
    ) -> Result<()> {
        for member in &self.options.team_members {
            let predicate = QueryBuilder::assignee_predicate(member, &self.options.root.labels);
            let items = match self.source.search_all(&predicate) {
                Ok(items) => items,
                Err(e) => {
                    warn!(assignee = %member, error = %e, "team member query failed");
                    report.team_member_failures.push(FailedBranch {
                        parent_key: member.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let before = report.records_processed;
            for item in items {
                let parent = item.parent_key.clone();
                // Expansion is left to the hierarchy walk.
                self.store_issue(item, parent, t0, 0, visited, report)?;
            }
            let added = (report.records_processed - before) as usize;
            report.team_member_records += added;
            debug!(assignee = %member, added, "team member issues stored");
        }
        Ok(())
    }
}

fn to_issue(item: SourceIssue, type_id: TypeId, parent_key: Option<String>, t0: DateTime<Utc>) -> Issue {
    let mut builder = IssueBuilder::new(item.key, type_id)
        .summary(item.summary)
        .source(item.source)
        .status(item.status)
        .labels(item.labels)
        .harvested_at(t0);
    if let Some(parent) = parent_key {
        builder = builder.parent_key(parent);
    }
    if let Some(assignee) = item.assignee {
        builder = builder.assignee(assignee);
    }
    if let Some(team) = item.team {
        builder = builder.team(team);
    }
    if let Some(created) = item.created_at {
        builder = builder.created_at(created);
    }
    if let Some(updated) = item.updated_at {
        builder = builder.updated_at(updated);
    }
    builder.build()
}
