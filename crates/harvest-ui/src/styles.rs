//! Ayu color theme and render helpers for `hv` output.
//!
//! Only states that need attention get color: running is yellow, failed is
//! red, completed is green. Everything else is plain text.

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;

use harvest_core::enums::{JobStatus, ReloadStatus};
use harvest_core::issue::Issue;

use crate::terminal::supports_color;

// ---------------------------------------------------------------------------
// Ayu Dark color palette (RGB values)
// ---------------------------------------------------------------------------

const PASS: (u8, u8, u8) = (0xc2, 0xd9, 0x4c); // #c2d94c
const WARN: (u8, u8, u8) = (0xff, 0xb4, 0x54); // #ffb454
const FAIL: (u8, u8, u8) = (0xf0, 0x71, 0x78); // #f07178
const MUTED: (u8, u8, u8) = (0x6c, 0x76, 0x80); // #6c7680
const ACCENT: (u8, u8, u8) = (0x59, 0xc2, 0xff); // #59c2ff

// ---------------------------------------------------------------------------
// Icons
// ---------------------------------------------------------------------------

pub const ICON_RUNNING: &str = "\u{25D0}"; // half circle
pub const ICON_PASS: &str = "\u{2713}";
pub const ICON_WARN: &str = "\u{26A0}";
pub const ICON_FAIL: &str = "\u{2716}";

pub const TREE_BRANCH: &str = "\u{251C}\u{2500} ";
pub const TREE_LAST: &str = "\u{2514}\u{2500} ";
pub const TREE_PIPE: &str = "\u{2502}  ";
pub const TREE_INDENT: &str = "   ";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn color_str(s: &str, rgb: (u8, u8, u8)) -> String {
    if supports_color() {
        s.truecolor(rgb.0, rgb.1, rgb.2).to_string()
    } else {
        s.to_string()
    }
}

fn color_bold_str(s: &str, rgb: (u8, u8, u8)) -> String {
    if supports_color() {
        s.truecolor(rgb.0, rgb.1, rgb.2).bold().to_string()
    } else {
        s.to_string()
    }
}

pub fn render_pass(s: &str) -> String {
    color_str(s, PASS)
}

pub fn render_warn(s: &str) -> String {
    color_str(s, WARN)
}

pub fn render_fail(s: &str) -> String {
    color_str(s, FAIL)
}

pub fn render_muted(s: &str) -> String {
    color_str(s, MUTED)
}

pub fn render_accent(s: &str) -> String {
    color_str(s, ACCENT)
}

pub fn render_bold(s: &str) -> String {
    if supports_color() {
        s.bold().to_string()
    } else {
        s.to_string()
    }
}

/// Uppercase accent header, e.g. for `hv reload list`.
pub fn render_category(s: &str) -> String {
    color_bold_str(&s.to_uppercase(), ACCENT)
}

// ---------------------------------------------------------------------------
// Lifecycle states
// ---------------------------------------------------------------------------

fn status_icon_and_color(terminal: Option<bool>) -> (&'static str, (u8, u8, u8)) {
    match terminal {
        None => (ICON_RUNNING, WARN),
        Some(true) => (ICON_PASS, PASS),
        Some(false) => (ICON_FAIL, FAIL),
    }
}

fn reload_state(status: ReloadStatus) -> Option<bool> {
    match status {
        ReloadStatus::Running => None,
        ReloadStatus::Completed => Some(true),
        ReloadStatus::Failed => Some(false),
    }
}

fn job_state(status: JobStatus) -> Option<bool> {
    match status {
        JobStatus::Running => None,
        JobStatus::Completed => Some(true),
        JobStatus::Failed => Some(false),
    }
}

/// `icon status`, colored by outcome.
pub fn render_reload_status(status: ReloadStatus) -> String {
    let (icon, rgb) = status_icon_and_color(reload_state(status));
    color_str(&format!("{icon} {}", status.as_str()), rgb)
}

pub fn render_job_status(status: JobStatus) -> String {
    let (icon, rgb) = status_icon_and_color(job_state(status));
    color_str(&format!("{icon} {}", status.as_str()), rgb)
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// `1h 02m 03s`, `4m 05s`, `6s`.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Rough age relative to `now`, e.g. `3h ago`.
pub fn format_age(t: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - t).num_seconds();
    if secs < 0 {
        return "in the future".to_string();
    }
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// One-line issue summary: `KEY [Type] status - summary`.
pub fn render_issue_compact(issue: &Issue, type_name: &str) -> String {
    let summary = if issue.summary.is_empty() {
        render_muted("(no summary)")
    } else {
        issue.summary.clone()
    };
    format!(
        "{} [{}] {} - {}",
        render_bold(&issue.key),
        render_accent(type_name),
        issue.status,
        summary
    )
}

/// Tree prefix for an entry at `depth`, given whether each ancestor level
/// (and this entry) is the last among its siblings.
pub fn tree_prefix(last_flags: &[bool]) -> String {
    let Some((last, ancestors)) = last_flags.split_last() else {
        return String::new();
    };
    let mut out = String::new();
    for ancestor_last in ancestors {
        out.push_str(if *ancestor_last { TREE_INDENT } else { TREE_PIPE });
    }
    out.push_str(if *last { TREE_LAST } else { TREE_BRANCH });
    render_muted(&out)
}
