//! End-to-end tests for the `reel` command line
//!
//! Every test points the binary at its own temporary data directory so the
//! runs stay hermetic.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn reel(data_dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("reel");
    cmd.arg("--data-dir").arg(data_dir.path());
    cmd
}

#[test]
fn status_reports_an_idle_recorder_on_a_fresh_data_dir() {
    let dir = TempDir::new().expect("tempdir");
    reel(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("recorder: IDLE"))
        .stdout(predicate::str::contains("sessions: 0"));
}

#[test]
fn import_list_show_export_delete_round_trip() {
    let dir = TempDir::new().expect("tempdir");

    // A session archive as `sessions export` would produce it.
    let archive = dir.path().join("imported-run.json");
    fs::write(
        &archive,
        json!({
            "session": {
                "id": "5f2c7d7e-1f2b-4c3a-9e4d-8b6a5c4d3e2f",
                "name": "Imported run",
                "tags": [],
                "create_timestamp": 1_700_000_000_000i64,
                "modify_timestamp": 1_700_000_000_000i64,
                "recorder_version": "0.1.0",
            },
            "events": [{ "timestamp": 1_700_000_000_100i64, "payload": { "kind": "click" } }],
            "media_chunks": ["3q2+7w=="],
        })
        .to_string(),
    )
    .expect("write archive");

    reel(&dir)
        .args(["sessions", "import"])
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported run"));

    // Import assigns a fresh id, so pick it up from the listing.
    let list = reel(&dir).args(["sessions", "list"]).assert().success();
    let stdout = String::from_utf8(list.get_output().stdout.clone()).expect("utf8");
    let id = stdout
        .split_whitespace()
        .next()
        .expect("listed session id")
        .to_string();

    reel(&dir)
        .args(["sessions", "show"])
        .arg(&id)
        .assert()
        .success()
        .stdout(predicate::str::contains("name:     Imported run"))
        .stdout(predicate::str::contains("events:   1"))
        .stdout(predicate::str::contains("media:    1 chunks"));

    let exports = dir.path().join("exports");
    reel(&dir)
        .args(["sessions", "export"])
        .arg(&id)
        .arg("--out")
        .arg(&exports)
        .assert()
        .success();
    let written: Vec<_> = fs::read_dir(&exports)
        .expect("read exports dir")
        .collect::<Result<_, _>>()
        .expect("list exports dir");
    assert_eq!(written.len(), 1);

    reel(&dir)
        .args(["sessions", "delete"])
        .arg(&id)
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted 1 session(s)"));
    reel(&dir)
        .args(["sessions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no sessions recorded yet"));
}

#[test]
fn show_rejects_an_unknown_session_id() {
    let dir = TempDir::new().expect("tempdir");
    reel(&dir)
        .args(["sessions", "show", "5f2c7d7e-1f2b-4c3a-9e4d-8b6a5c4d3e2f"])
        .assert()
        .failure();
}
