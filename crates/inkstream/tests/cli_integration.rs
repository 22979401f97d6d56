//! CLI integration tests for the inkstream command-line interface.
//!
//! Each test gets its own config and data directories, so streams are
//! created in a throwaway SQLite database.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct TestEnv {
    config_dir: TempDir,
    data_dir: TempDir,
}

impl TestEnv {
    /// Echo generator without word delay.
    fn new() -> Self {
        Self::with_config("[generator]\nkind = \"echo\"\nword_delay_ms = 0\n")
    }

    fn with_config(toml: &str) -> Self {
        let config_dir = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        std::fs::write(config_dir.path().join("config.toml"), toml).unwrap();
        Self {
            config_dir,
            data_dir,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("inkstream").unwrap();
        cmd.env("INKSTREAM_CONFIG_DIR", self.config_dir.path())
            .env("INKSTREAM_DATA_DIR", self.data_dir.path())
            .env_remove("RUST_LOG")
            .current_dir(self.data_dir.path());
        cmd
    }

    fn create(&self, input: &str) -> String {
        let output = self.cmd().args(["create", "--input", input]).output().unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    TestEnv::new()
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("drive"))
        .stdout(predicate::str::contains("body"))
        .stdout(predicate::str::contains("sweep"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    TestEnv::new()
        .cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("inkstream"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_prints_effective_toml() {
    TestEnv::with_config("[server]\nport = 9191\n")
        .cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[server]"))
        .stdout(predicate::str::contains("port = 9191"))
        .stdout(predicate::str::contains("[flush]"));
}

#[test]
fn test_invalid_config_is_rejected() {
    TestEnv::with_config("[flush]\nmax_buffer_bytes = 0\n")
        .cmd()
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_buffer_bytes"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_create_drive_and_read_back() {
    let env = TestEnv::new();
    let id = env.create("Hello world. This is a test.");
    assert!(!id.is_empty());

    env.cmd()
        .args(["status", &id])
        .assert()
        .success()
        .stdout("pending\n");

    env.cmd()
        .args(["drive", &id])
        .assert()
        .success()
        .stdout("Hello world. This is a test.\n");

    env.cmd()
        .args(["body", &id])
        .assert()
        .success()
        .stdout("Hello world. This is a test.\n");

    env.cmd()
        .args(["status", &id])
        .assert()
        .success()
        .stdout("done\n");
}

#[test]
fn test_second_drive_fails() {
    let env = TestEnv::new();
    let id = env.create("only once");

    env.cmd().args(["drive", &id]).assert().success();
    env.cmd()
        .args(["drive", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already done"));
}

#[test]
fn test_unknown_stream_fails() {
    TestEnv::new()
        .cmd()
        .args(["body", "no-such-stream"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_chunks_json_after_sequence() {
    let env = TestEnv::new();
    let id = env.create("One. Two. Three");
    env.cmd().args(["drive", &id]).assert().success();

    let output = env
        .cmd()
        .args(["--json", "chunks", &id, "--after", "0"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let delta: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let chunks = delta["chunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0]["sequence"], 1);
    assert_eq!(delta["status"], "done");
}

#[test]
fn test_sweep_with_nothing_abandoned() {
    let env = TestEnv::new();
    env.create("left pending");

    env.cmd()
        .args(["sweep", "--stale-after", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No abandoned streams"));
}
