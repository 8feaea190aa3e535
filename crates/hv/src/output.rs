//! Output formatting helpers for the `hv` CLI.
//!
//! JSON goes to stdout pretty-printed; human output uses aligned tables and
//! the harvest-ui styling helpers.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;

use harvest_core::hierarchy::IssueTypeHierarchy;
use harvest_core::issue::Issue;
use harvest_core::reload::{HarvestJob, ReloadTracking};
use harvest_engine::HarvestReport;
use harvest_ui::terminal::{terminal_width, truncate};
use harvest_ui::styles::{
    format_duration, format_timestamp, render_bold, render_fail, render_job_status, render_muted,
    render_reload_status, render_warn,
};

/// Print a value as pretty-printed JSON to stdout.
///
/// Terminates the process with exit code 1 if serialization fails.
pub fn output_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            // Ignore broken pipe errors (e.g., piped to `head`)
            let _ = writeln!(handle, "{}", json);
        }
        Err(e) => {
            eprintln!("Error: failed to serialize JSON: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print a simple table with headers and rows.
///
/// Column widths are computed from the data for alignment.
pub fn output_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        return;
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            let _ = write!(handle, "  ");
        }
        let _ = write!(handle, "{:<width$}", header, width = widths[i]);
    }
    let _ = writeln!(handle);

    for (i, width) in widths.iter().enumerate() {
        if i > 0 {
            let _ = write!(handle, "  ");
        }
        let _ = write!(handle, "{}", "-".repeat(*width));
    }
    let _ = writeln!(handle);

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                let _ = write!(handle, "  ");
            }
            if i < widths.len() {
                let _ = write!(handle, "{:<width$}", cell, width = widths[i]);
            } else {
                let _ = write!(handle, "{}", cell);
            }
        }
        let _ = writeln!(handle);
    }
}

fn opt_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

// ---------------------------------------------------------------------------
// Reloads & jobs
// ---------------------------------------------------------------------------

/// Row for `hv reload list`. Status is plain text so columns stay aligned.
pub fn format_reload_row(r: &ReloadTracking) -> Vec<String> {
    vec![
        r.id.to_string(),
        r.status.to_string(),
        r.source.to_string(),
        r.triggered_by.clone(),
        r.reload_started.format("%Y-%m-%d %H:%M").to_string(),
        r.duration_seconds.map(format_duration).unwrap_or_else(|| "-".into()),
        r.records_processed.to_string(),
        r.issues_deleted.to_string(),
    ]
}

pub const RELOAD_HEADERS: &[&str] = &[
    "ID", "STATUS", "SOURCE", "BY", "STARTED", "DURATION", "RECORDS", "DELETED",
];

/// Multi-line view of one reload. `now` is used for the elapsed time of a
/// running reload.
pub fn format_reload_detail(r: &ReloadTracking, now: DateTime<Utc>) -> String {
    let mut lines = vec![format!(
        "{} {}",
        render_bold(&format!("Reload #{}", r.id)),
        render_reload_status(r.status)
    )];
    lines.push(format!("Source:    {} (by {})", r.source, r.triggered_by));
    lines.push(format!("Started:   {}", format_timestamp(r.reload_started)));
    match r.completed_at {
        Some(done) => lines.push(format!("Finished:  {}", format_timestamp(done))),
        None => lines.push(format!(
            "Running:   {}",
            render_warn(&format_duration(r.elapsed_seconds(now)))
        )),
    }
    if r.is_running() {
        lines.push(format!(
            "Owner:     {} (seen {} ago)",
            r.owner,
            format_duration((now - r.last_seen()).num_seconds().max(0))
        ));
    }
    if let Some(d) = r.duration_seconds {
        lines.push(format!("Duration:  {}", format_duration(d)));
    }
    lines.push(format!("Records:   {}", r.records_processed));
    lines.push(format!("Deleted:   {}", r.issues_deleted));
    if let Some(msg) = &r.error_message {
        lines.push(format!("Error:     {}", render_fail(msg)));
    }
    lines.join("\n")
}

pub const JOB_HEADERS: &[&str] = &["ID", "STATUS", "RELOAD", "STARTED", "COMPLETED", "RECORDS"];

pub fn format_job_row(j: &HarvestJob) -> Vec<String> {
    vec![
        j.id.to_string(),
        j.status.to_string(),
        j.reload_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
        j.started_at.format("%Y-%m-%d %H:%M").to_string(),
        opt_time(j.completed_at),
        j.records_processed.to_string(),
    ]
}

/// One line per job with a colored status, for failure details.
pub fn format_job_failure(j: &HarvestJob) -> Option<String> {
    j.error_message
        .as_ref()
        .map(|msg| format!("{} #{}: {}", render_job_status(j.status), j.id, msg))
}

/// Counts from one harvest pass, plus any failed branches.
pub fn format_harvest_report(report: &HarvestReport) -> String {
    let mut lines = vec![format!(
        "Processed {} issues ({} new, {} updated, {} unchanged)",
        report.records_processed, report.inserted, report.updated, report.unchanged
    )];
    if report.ignored > 0 {
        lines.push(render_muted(&format!(
            "  {} skipped: stored copy was newer",
            report.ignored
        )));
    }
    if report.unknown_types > 0 {
        lines.push(render_warn(&format!(
            "  {} issues had a type outside the hierarchy",
            report.unknown_types
        )));
    }
    if report.depth_limited > 0 {
        lines.push(render_warn(&format!(
            "  {} branches not expanded (max depth reached)",
            report.depth_limited
        )));
    }
    if report.team_member_records > 0 {
        lines.push(format!(
            "  {} issues from team member queries",
            report.team_member_records
        ));
    }
    for failed in report
        .failed_branches
        .iter()
        .chain(&report.team_member_failures)
    {
        lines.push(render_fail(&format!(
            "  failed below {}: {}",
            failed.parent_key, failed.error
        )));
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

pub const ISSUE_HEADERS: &[&str] = &["KEY", "TYPE", "STATUS", "PARENT", "ASSIGNEE", "SUMMARY"];

/// Summary is cut to what is left of the terminal after the other columns.
pub fn format_issue_row(issue: &Issue, hierarchy: &IssueTypeHierarchy) -> Vec<String> {
    let summary_width = terminal_width().saturating_sub(70).max(20);
    vec![
        issue.key.clone(),
        type_name(issue, hierarchy).to_string(),
        issue.status.clone(),
        issue.parent_key.clone().unwrap_or_else(|| "-".into()),
        issue.assignee.clone().unwrap_or_default(),
        truncate(&issue.summary, summary_width),
    ]
}

/// Multi-line view of one issue.
pub fn format_issue_detail(issue: &Issue, hierarchy: &IssueTypeHierarchy) -> String {
    let mut lines = vec![format!(
        "{} [{}] {}",
        render_bold(&issue.key),
        type_name(issue, hierarchy),
        issue.summary
    )];
    lines.push(format!("Status: {}", issue.status));
    if let Some(parent) = &issue.parent_key {
        lines.push(format!("Parent: {parent}"));
    }
    if let Some(assignee) = &issue.assignee {
        lines.push(format!("Assignee: {assignee}"));
    }
    if let Some(team) = &issue.team {
        lines.push(format!("Team: {team}"));
    }
    if !issue.labels.is_empty() {
        let labels: Vec<&str> = issue.labels.iter().map(String::as_str).collect();
        lines.push(format!("Labels: {}", labels.join(", ")));
    }
    lines.push(format!("Source: {}", issue.source));
    if let Some(created) = issue.created_at {
        lines.push(format!("Created: {}", created.format("%Y-%m-%d %H:%M")));
    }
    if let Some(updated) = issue.updated_at {
        lines.push(format!("Updated: {}", updated.format("%Y-%m-%d %H:%M")));
    }
    lines.push(format!("Harvested: {}", format_timestamp(issue.harvested_at)));
    lines.join("\n")
}

pub fn type_name<'a>(issue: &Issue, hierarchy: &'a IssueTypeHierarchy) -> &'a str {
    hierarchy.resolve(Some(issue.type_id), None).name.as_str()
}
