//! End-to-end tests for the `edusync` binary.
//!
//! Every test gets its own `EDUSYNC_HOME` and database. Stdout is not a
//! terminal under the harness, so commands answer in JSON; `--quiet` keeps
//! log lines off stderr so error objects parse.

use assert_cmd::Command;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Nothing listens on the discard port, so probes see the remote as down.
const UNREACHABLE: &str = "http://127.0.0.1:9/api";

struct Sandbox {
    home: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            home: tempfile::tempdir().unwrap(),
        }
    }

    fn db(&self) -> PathBuf {
        self.home.path().join("data").join("edusync.db")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("edusync").unwrap();
        cmd.env("EDUSYNC_HOME", self.home.path())
            .env_remove("EDUSYNC_REMOTE")
            .env_remove("EDUSYNC_TOKEN")
            .env_remove("EDUSYNC_TIMEOUT_SECS")
            .env_remove("EDUSYNC_TEST_DB")
            .env_remove("EDUSYNC_DB")
            .env_remove("RUST_LOG")
            .arg("--quiet")
            .arg("--db")
            .arg(self.db());
        cmd
    }

    fn initialized() -> Self {
        let sandbox = Self::new();
        sandbox.cmd().arg("init").assert().success();
        sandbox
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().args(args).assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).unwrap()
    }
}

fn error_code(stderr: &[u8]) -> String {
    let value: Value = serde_json::from_slice(stderr).unwrap();
    value["error"]["code"].as_str().unwrap().to_string()
}

fn exists(path: &Path) -> bool {
    path.try_exists().unwrap()
}

#[test]
fn init_creates_database_and_config() {
    let sandbox = Sandbox::new();
    sandbox.cmd().arg("init").assert().success();

    assert!(exists(&sandbox.db()));
    assert!(exists(&sandbox.home.path().join("config.json")));
}

#[test]
fn init_twice_requires_force() {
    let sandbox = Sandbox::initialized();

    let assert = sandbox.cmd().arg("init").assert().code(2);
    assert_eq!(error_code(&assert.get_output().stderr), "ALREADY_INITIALIZED");

    sandbox.cmd().args(["init", "--force"]).assert().success();
}

#[test]
fn commands_require_init() {
    let sandbox = Sandbox::new();
    let assert = sandbox.cmd().args(["content", "list"]).assert().code(2);
    assert_eq!(error_code(&assert.get_output().stderr), "NOT_INITIALIZED");
}

#[test]
fn status_works_without_remote() {
    let sandbox = Sandbox::initialized();
    let status = sandbox.json(&["status"]);

    assert_eq!(status["remote"], Value::Null);
    assert_eq!(status["content_units"], 0);
    assert_eq!(status["outbox"]["pending"], 0);
    assert_eq!(status["online"]["isOnline"], false);
    assert_eq!(status["sync"]["totalCount"], 0);
}

#[test]
fn empty_store_lists_nothing() {
    let sandbox = Sandbox::initialized();

    assert_eq!(sandbox.json(&["content", "list"])["count"], 0);
    assert_eq!(sandbox.json(&["outbox", "list"])["count"], 0);
}

#[test]
fn unknown_ids_exit_not_found() {
    let sandbox = Sandbox::initialized();

    let assert = sandbox.cmd().args(["content", "show", "missing"]).assert().code(3);
    assert_eq!(error_code(&assert.get_output().stderr), "CONTENT_NOT_FOUND");

    let assert = sandbox
        .cmd()
        .args(["outbox", "discard", "obx_missing"])
        .assert()
        .code(3);
    assert_eq!(error_code(&assert.get_output().stderr), "OUTBOX_ENTRY_NOT_FOUND");
}

#[test]
fn sync_without_remote_is_a_config_error() {
    let sandbox = Sandbox::initialized();
    let assert = sandbox.cmd().arg("sync").assert().code(7);
    assert_eq!(error_code(&assert.get_output().stderr), "CONFIG_ERROR");
}

#[test]
fn sync_against_unreachable_remote_keeps_local_state() {
    let sandbox = Sandbox::initialized();
    let assert = sandbox
        .cmd()
        .args(["--remote", UNREACHABLE, "sync"])
        .assert()
        .code(6);

    let report: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["outcome"]["kind"], "skipped_offline");
    assert_eq!(sandbox.json(&["content", "list"])["count"], 0);
}

#[test]
fn offline_write_is_readable_and_queued() {
    let sandbox = Sandbox::initialized();

    let written = sandbox.json(&[
        "--remote",
        UNREACHABLE,
        "write",
        "bio-1",
        "celula",
        "--name",
        "La célula",
        "--body",
        "<p>Membrana</p>",
    ]);
    assert_eq!(written["status"], "queued");
    let entry_id = written["entry_id"].as_str().unwrap().to_string();

    let unit = sandbox.json(&["content", "show", "celula"]);
    assert_eq!(unit["body"], "<p>Membrana</p>");
    assert_eq!(unit["synced"], true);

    let outbox = sandbox.json(&["outbox", "list"]);
    assert_eq!(outbox["count"], 1);
    assert_eq!(outbox["entries"][0]["id"], entry_id.as_str());
    assert_eq!(outbox["entries"][0]["method"], "PUT");

    let drained = sandbox
        .cmd()
        .args(["--remote", UNREACHABLE, "outbox", "drain"])
        .assert()
        .code(6);
    let report: Value = serde_json::from_slice(&drained.get_output().stdout).unwrap();
    assert_eq!(report["skipped"], true);
    assert_eq!(report["remaining"], 1);

    sandbox
        .cmd()
        .args(["outbox", "discard", &entry_id])
        .assert()
        .success();
    assert_eq!(sandbox.json(&["outbox", "list"])["count"], 0);
    assert_eq!(sandbox.json(&["content", "list"])["count"], 1);
}

#[test]
fn mirror_needs_collection_names() {
    let sandbox = Sandbox::initialized();
    let assert = sandbox
        .cmd()
        .args(["--remote", UNREACHABLE, "mirror"])
        .assert()
        .code(4);
    assert_eq!(error_code(&assert.get_output().stderr), "INVALID_ARGUMENT");

    let assert = sandbox
        .cmd()
        .args(["--remote", UNREACHABLE, "mirror", "../users"])
        .assert()
        .code(4);
    assert_eq!(error_code(&assert.get_output().stderr), "INVALID_ARGUMENT");
}

#[test]
fn mirror_while_offline_keeps_local_copy() {
    let sandbox = Sandbox::initialized();
    let assert = sandbox
        .cmd()
        .args(["--remote", UNREACHABLE, "mirror", "licenses"])
        .assert()
        .code(6);

    let report: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["collections"][0]["collection"], "licenses");
    assert_eq!(report["collections"][0]["outcome"]["kind"], "skipped_offline");
    assert_eq!(sandbox.json(&["collection", "list"])["count"], 0);
    assert_eq!(sandbox.json(&["collection", "list", "licenses"])["count"], 0);

    let assert = sandbox
        .cmd()
        .args(["collection", "show", "licenses", "l1"])
        .assert()
        .code(3);
    assert_eq!(error_code(&assert.get_output().stderr), "DOCUMENT_NOT_FOUND");
}

#[test]
fn ai_answers_are_saved_and_listed() {
    let sandbox = Sandbox::initialized();
    let saved = sandbox.json(&[
        "ai",
        "save",
        "grado-5",
        "ciencias",
        "--query",
        "¿Qué es la fotosíntesis?",
        "--content",
        "Es el proceso por el que las plantas...",
        "--license",
        "LIC-1",
    ]);
    let id = saved["id"].as_str().unwrap().to_string();
    assert_eq!(saved["licenseKey"], "LIC-1");

    let listed = sandbox.json(&["ai", "list", "grado-5", "ciencias"]);
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["answers"][0]["id"], id.as_str());
    assert_eq!(sandbox.json(&["ai", "list", "grado-5", "historia"])["count"], 0);

    let shown = sandbox.json(&["ai", "show", &id]);
    assert_eq!(shown["query"], "¿Qué es la fotosíntesis?");

    let assert = sandbox.cmd().args(["ai", "show", "ai_missing"]).assert().code(3);
    assert_eq!(error_code(&assert.get_output().stderr), "AI_CONTENT_NOT_FOUND");

    let assert = sandbox
        .cmd()
        .args(["ai", "save", "grado-5", "ciencias", "--query", "q", "--content", " "])
        .assert()
        .code(4);
    assert_eq!(error_code(&assert.get_output().stderr), "INVALID_ARGUMENT");
}

#[test]
fn version_reports_package_version() {
    let sandbox = Sandbox::new();
    let version = sandbox.json(&["version"]);
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));
}
