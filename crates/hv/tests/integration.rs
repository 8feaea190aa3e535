//! End-to-end CLI integration tests for the `hv` binary.
//!
//! Each test creates its own temporary `.harvest` directory and exercises
//! the `hv` binary as a subprocess via `assert_cmd`. Nothing here talks to
//! a real Jira: data is seeded straight into the SQLite file, and the
//! commands that need a source either run unconfigured or point at a closed
//! local port.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use chrono::{Duration, TimeZone, Utc};
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use harvest_core::enums::ReloadSource;
use harvest_core::issue::IssueBuilder;
use harvest_core::reload::NewReload;
use harvest_storage::{SqliteStore, Storage};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `hv` with a scrubbed environment pointed at `dir`.
fn hv(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hv").unwrap();
    cmd.arg("--config")
        .arg(dir)
        .env_remove("HARVEST_DIR")
        .env_remove("HARVEST_JIRA__BASE_URL")
        .env_remove("HARVEST_JIRA__EMAIL")
        .env_remove("HARVEST_JIRA__API_TOKEN")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .env("HV_ACTOR", "tester");
    cmd
}

/// Runs `hv init` and returns the temp dir plus its `.harvest` path.
fn init_project() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join(".harvest");
    hv(&dir).args(["init", "--quiet"]).assert().success();
    (tmp, dir)
}

fn json_of(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.arg("--json").output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn store(dir: &Path) -> SqliteStore {
    SqliteStore::open(dir.join("harvest.db")).unwrap()
}

/// PV-1 -> FEAT-2 -> STORY-3, plus an orphan task.
fn seed_issues(dir: &Path) {
    let at = Utc::now();
    let store = store(dir);
    for issue in [
        IssueBuilder::new("PV-1", 10).summary("Release 1.0").status("Open"),
        IssueBuilder::new("FEAT-2", 20)
            .summary("Dark mode")
            .status("In Progress")
            .parent_key("PV-1")
            .assignee("ana"),
        IssueBuilder::new("STORY-3", 40)
            .summary("Toggle in settings")
            .status("Open")
            .parent_key("FEAT-2")
            .label("ui"),
        IssueBuilder::new("TASK-9", 50).summary("Loose end").status("Done"),
    ] {
        store.upsert_issue(&issue.harvested_at(at).build()).unwrap();
    }
}

// ---------------------------------------------------------------------------
// Setup & configuration
// ---------------------------------------------------------------------------

#[test]
fn version_prints_name() {
    let tmp = TempDir::new().unwrap();
    hv(tmp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("hv version"));
}

#[test]
fn init_creates_config_and_database() {
    let (_tmp, dir) = init_project();
    assert!(dir.join("config.yaml").is_file());
    assert!(dir.join("harvest.db").is_file());
    assert!(dir.join(".gitignore").is_file());
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let (_tmp, dir) = init_project();
    hv(&dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    hv(&dir).args(["init", "--force", "--quiet"]).assert().success();
}

#[test]
fn init_records_jira_settings() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join(".harvest");
    hv(&dir)
        .args([
            "init",
            "--quiet",
            "--jira-url",
            "https://example.atlassian.net/",
            "--jira-email",
            "bot@example.com",
        ])
        .assert()
        .success();

    let cfg = json_of(hv(&dir).args(["config", "show"]));
    assert_eq!(cfg["jira"]["base_url"], "https://example.atlassian.net");
    assert_eq!(cfg["jira"]["email"], "bot@example.com");
}

#[test]
fn config_show_redacts_token() {
    let (_tmp, dir) = init_project();
    hv(&dir)
        .args(["config", "show"])
        .env("HARVEST_JIRA__API_TOKEN", "s3cret-token")
        .assert()
        .success()
        .stdout(predicate::str::contains("<redacted>"))
        .stdout(predicate::str::contains("s3cret-token").not());
}

#[test]
fn config_path_prints_directory() {
    let (_tmp, dir) = init_project();
    hv(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(".harvest"));
}

#[test]
fn missing_directory_is_an_error() {
    let tmp = TempDir::new().unwrap();
    hv(&tmp.path().join("nope"))
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("hv init"));
}

#[test]
fn invalid_config_is_reported() {
    let (_tmp, dir) = init_project();
    hv(&dir)
        .arg("status")
        .env("HARVEST_RELOAD__REFRESH_INTERVAL_HOURS", "0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("refresh_interval_hours"));
}

#[test]
fn json_errors_are_structured() {
    let (_tmp, dir) = init_project();
    let output = hv(&dir)
        .args(["--json", "reload", "show", "99"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("\"error\""), "stderr: {stderr}");
    assert!(stderr.contains("reload not found: 99"), "stderr: {stderr}");
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[test]
fn types_prints_default_hierarchy() {
    let (_tmp, dir) = init_project();
    hv(&dir)
        .arg("types")
        .assert()
        .success()
        .stdout(predicate::str::contains("Product Version"))
        .stdout(predicate::str::contains("Customer Adoption"));
}

#[test]
fn types_tree_text() {
    let (_tmp, dir) = init_project();
    let output = hv(&dir).arg("types").output().unwrap();
    assert!(output.status.success());
    insta::assert_snapshot!(String::from_utf8(output.stdout).unwrap(), @r###"
    Product Version (10)
    ├─ Feature (20)
    │  ├─ Story (40)
    │  └─ Task (50)
    └─ Customer Adoption (30)
       └─ Story (40)
    5 types, 3 levels; unmatched types are stored as "Unknown"
    "###);
}

#[test]
fn types_sync_reports_counts() {
    let (_tmp, dir) = init_project();
    let first = json_of(hv(&dir).args(["types", "--sync"]));
    assert_eq!(first["roots"], serde_json::json!([10]));
    assert_eq!(first["depth"], 3);
    assert_eq!(first["synced"]["added"], 5);

    let second = json_of(hv(&dir).args(["types", "--sync"]));
    assert_eq!(second["synced"]["added"], 0);
    assert_eq!(second["synced"]["updated"], 0);
}

// ---------------------------------------------------------------------------
// Reloads & jobs
// ---------------------------------------------------------------------------

#[test]
fn empty_history() {
    let (_tmp, dir) = init_project();
    assert_eq!(json_of(hv(&dir).args(["reload", "list"])), serde_json::json!([]));
    assert_eq!(json_of(hv(&dir).arg("jobs")), serde_json::json!([]));
    hv(&dir)
        .args(["reload", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No reloads recorded."));
}

#[test]
fn reload_list_rejects_unknown_status() {
    let (_tmp, dir) = init_project();
    hv(&dir)
        .args(["reload", "list", "--status", "paused"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--status"));
}

#[test]
fn reload_requires_jira_credentials() {
    let (_tmp, dir) = init_project();
    hv(&dir)
        .args(["reload", "run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not configured"));
    // Rejected before a tracking row was opened.
    assert_eq!(json_of(hv(&dir).args(["reload", "list"])), serde_json::json!([]));
}

/// A closed local port makes every source call fail fast.
fn unreachable_jira(cmd: &mut Command) -> &mut Command {
    cmd.env("HARVEST_JIRA__BASE_URL", "http://127.0.0.1:9")
        .env("HARVEST_JIRA__EMAIL", "bot@example.com")
        .env("HARVEST_JIRA__API_TOKEN", "token")
        .env("HARVEST_JIRA__MAX_RETRIES", "0")
        .env("HARVEST_JIRA__TIMEOUT_SECS", "5")
}

#[test]
fn failed_reload_is_recorded_and_keeps_data() {
    let (_tmp, dir) = init_project();
    seed_issues(&dir);

    unreachable_jira(hv(&dir).args(["reload", "run"]))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed"));

    let reloads = json_of(hv(&dir).args(["reload", "list"]));
    assert_eq!(reloads.as_array().unwrap().len(), 1);
    assert_eq!(reloads[0]["status"], "failed");
    assert_eq!(reloads[0]["source"], "manual");
    assert_eq!(reloads[0]["triggered_by"], "tester");
    assert!(reloads[0]["error_message"].is_string());

    let jobs = json_of(hv(&dir).arg("jobs"));
    assert_eq!(jobs[0]["status"], "failed");
    assert_eq!(jobs[0]["reload_id"], reloads[0]["id"]);

    assert_eq!(json_of(hv(&dir).args(["issues", "count"]))["count"], 4);

    let shown = json_of(hv(&dir).args(["reload", "show", "1"]));
    assert_eq!(shown["status"], "failed");
}

#[test]
fn check_reports_unreachable_jira() {
    let (_tmp, dir) = init_project();
    unreachable_jira(hv(&dir).arg("check"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot reach Jira"));
}

#[test]
fn reload_rejected_while_one_is_running() {
    let (_tmp, dir) = init_project();
    store(&dir)
        .begin_reload(&NewReload {
            reload_started: Utc::now(),
            source: ReloadSource::Scheduled,
            triggered_by: "scheduler".into(),
            owner: "pid 1 #0".into(),
        })
        .unwrap();

    unreachable_jira(hv(&dir).args(["reload", "run"]))
        .assert()
        .failure()
        .stderr(predicate::str::contains("already running"))
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn reload_list_filters_by_status() {
    let (_tmp, dir) = init_project();
    store(&dir)
        .begin_reload(&NewReload {
            reload_started: Utc::now(),
            source: ReloadSource::Manual,
            triggered_by: "ana".into(),
            owner: "pid 1 #0".into(),
        })
        .unwrap();

    let running = json_of(hv(&dir).args(["reload", "list", "--status", "running"]));
    assert_eq!(running.as_array().unwrap().len(), 1);
    let failed = json_of(hv(&dir).args(["reload", "list", "--status", "failed"]));
    assert_eq!(failed, serde_json::json!([]));
}

// ---------------------------------------------------------------------------
// Recovery & status
// ---------------------------------------------------------------------------

#[test]
fn recover_rolls_back_interrupted_reload() {
    let (_tmp, dir) = init_project();
    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    {
        let store = store(&dir);
        store
            .upsert_issue(&IssueBuilder::new("PV-1", 10).harvested_at(t0).build())
            .unwrap();
        store
            .begin_reload(&NewReload {
                reload_started: t0 + Duration::hours(1),
                source: ReloadSource::Manual,
                triggered_by: "ana".into(),
                owner: "pid 1 #0".into(),
            })
            .unwrap();
        store
            .upsert_issue(
                &IssueBuilder::new("FEAT-2", 20)
                    .parent_key("PV-1")
                    .harvested_at(t0 + Duration::minutes(65))
                    .build(),
            )
            .unwrap();
    }

    let recovered = json_of(hv(&dir).arg("recover"));
    assert_eq!(recovered[0]["reload_id"], 1);
    assert_eq!(recovered[0]["issues_rolled_back"], 1);

    let reload = json_of(hv(&dir).args(["reload", "show", "1"]));
    assert_eq!(reload["status"], "failed");
    assert!(
        reload["error_message"]
            .as_str()
            .unwrap()
            .starts_with("Interrupted by process shutdown")
    );

    let keys: Vec<String> = json_of(hv(&dir).args(["issues", "list"]))
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["PV-1"]);

    assert_eq!(json_of(hv(&dir).arg("recover")), serde_json::json!([]));
}

#[test]
fn recover_leaves_a_live_reload_running() {
    let (_tmp, dir) = init_project();
    let row = store(&dir)
        .begin_reload(&NewReload {
            reload_started: Utc::now(),
            source: ReloadSource::Scheduled,
            triggered_by: "scheduler".into(),
            owner: "pid 1 #0".into(),
        })
        .unwrap();

    assert_eq!(json_of(hv(&dir).arg("recover")), serde_json::json!([]));

    let reload = json_of(hv(&dir).args(["reload", "show", &row.id.to_string()]));
    assert_eq!(reload["status"], "running");
    assert_eq!(reload["owner"], "pid 1 #0");
}

#[test]
fn status_on_empty_database_wants_a_reload() {
    let (_tmp, dir) = init_project();
    let status = json_of(hv(&dir).arg("status"));
    assert!(status["active"].is_null());
    assert!(status["last_finished"].is_null());
    assert_eq!(status["issue_count"], 0);
    assert_eq!(status["reload_needed"], true);
    assert_eq!(status["refresh_interval_hours"], 24);
}

#[test]
fn status_shows_running_reload() {
    let (_tmp, dir) = init_project();
    store(&dir)
        .begin_reload(&NewReload {
            reload_started: Utc::now(),
            source: ReloadSource::Manual,
            triggered_by: "ana".into(),
            owner: "pid 1 #0".into(),
        })
        .unwrap();

    let status = json_of(hv(&dir).arg("status"));
    assert_eq!(status["active"]["triggered_by"], "ana");
    assert_eq!(status["reload_needed"], false);
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

#[test]
fn issues_list_filters() {
    let (_tmp, dir) = init_project();
    seed_issues(&dir);

    let keys = |args: &[&str]| -> Vec<String> {
        let mut cmd = hv(&dir);
        cmd.args(["issues", "list"]).args(args);
        json_of(&mut cmd)
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["key"].as_str().unwrap().to_string())
            .collect()
    };

    assert_eq!(keys(&[]), vec!["FEAT-2", "PV-1", "STORY-3", "TASK-9"]);
    assert_eq!(keys(&["--type", "Feature"]), vec!["FEAT-2"]);
    assert_eq!(keys(&["--type", "40"]), vec!["STORY-3"]);
    assert_eq!(keys(&["--parent", "PV-1"]), vec!["FEAT-2"]);
    assert_eq!(keys(&["--roots"]), vec!["PV-1", "TASK-9"]);
    assert_eq!(keys(&["--assignee", "ana"]), vec!["FEAT-2"]);
    assert_eq!(keys(&["--label", "ui"]), vec!["STORY-3"]);
    assert_eq!(keys(&["--status", "Done"]), vec!["TASK-9"]);
    assert_eq!(keys(&["--search", "Dark"]), vec!["FEAT-2"]);
    assert_eq!(keys(&["--limit", "1"]), vec!["FEAT-2"]);
}

#[test]
fn issues_list_rejects_unknown_type() {
    let (_tmp, dir) = init_project();
    hv(&dir)
        .args(["issues", "list", "--type", "Epic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown issue type"));
}

#[test]
fn issues_show_includes_children() {
    let (_tmp, dir) = init_project();
    seed_issues(&dir);

    let shown = json_of(hv(&dir).args(["issues", "show", "FEAT-2"]));
    assert_eq!(shown["key"], "FEAT-2");
    assert_eq!(shown["parent_key"], "PV-1");
    assert_eq!(shown["children"][0]["key"], "STORY-3");

    hv(&dir)
        .args(["issues", "show", "FEAT-2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Feature"))
        .stdout(predicate::str::contains("Children (1)"));

    hv(&dir)
        .args(["issues", "show", "NOPE-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn issues_tree_nests_children() {
    let (_tmp, dir) = init_project();
    seed_issues(&dir);

    let forest = json_of(hv(&dir).args(["issues", "tree"]));
    assert_eq!(forest[0]["key"], "PV-1");
    assert_eq!(forest[0]["children"][0]["key"], "FEAT-2");
    assert_eq!(forest[0]["children"][0]["children"][0]["key"], "STORY-3");
    assert_eq!(forest[1]["key"], "TASK-9");

    let shallow = json_of(hv(&dir).args(["issues", "tree", "PV-1", "--depth", "1"]));
    assert_eq!(shallow[0]["children"][0]["key"], "FEAT-2");
    assert!(shallow[0]["children"][0].get("children").is_none());

    hv(&dir)
        .args(["issues", "tree"])
        .assert()
        .success()
        .stdout(predicate::str::contains("STORY-3"));
}

#[test]
fn issues_count_text() {
    let (_tmp, dir) = init_project();
    seed_issues(&dir);
    hv(&dir)
        .args(["issues", "count"])
        .assert()
        .success()
        .stdout("4\n");
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

#[test]
fn completion_bash() {
    let tmp = TempDir::new().unwrap();
    hv(tmp.path())
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hv"));
}
