//! Integration tests for the command-line interface
//!
//! Runs the built binary against temp files. HOME points into the temp dir so
//! no user config or state is touched.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn cockpit(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_lab-cockpit"));
    cmd.env("HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("calc.py"),
        "def add(a, b):\n    return a - b\n\nprint(add(1, 2))\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("fix.patch"),
        "Fix the operator:\n<<<PATCH\nREPLACE \"return a - b\"\n    return a + b\nPATCH>>>\n",
    )
    .unwrap();
    dir
}

#[test]
fn classify_reports_brain() {
    let dir = TempDir::new().unwrap();

    let output = cockpit(dir.path())
        .args(["classify", "fix the failing test"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("Scriptor"));

    let output = cockpit(dir.path())
        .args(["classify", "what should the roadmap look like"])
        .output()
        .unwrap();
    assert!(stdout(&output).starts_with("Master"));
}

#[test]
fn window_prints_line_ids() {
    let dir = setup_workspace();
    let file = dir.path().join("calc.py");

    let output = cockpit(dir.path())
        .args(["window", "--file"])
        .arg(&file)
        .args(["--budget", "30", "--all"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains("#1| def add(a, b):"));
    assert!(text.contains("#4| print(add(1, 2))"));
    assert!(text.contains("continues at #"));
}

#[test]
fn patch_dry_run_leaves_file() {
    let dir = setup_workspace();
    let file = dir.path().join("calc.py");

    let output = cockpit(dir.path())
        .args(["patch", "--file"])
        .arg(&file)
        .arg("--patch")
        .arg(dir.path().join("fix.patch"))
        .args(["--dry-run", "--diff"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains("DRY RUN"));
    assert!(text.contains("+    return a + b"));
    assert!(fs::read_to_string(&file).unwrap().contains("a - b"));
}

#[test]
fn patch_writes_file() {
    let dir = setup_workspace();
    let file = dir.path().join("calc.py");

    let output = cockpit(dir.path())
        .args(["patch", "--file"])
        .arg(&file)
        .arg("--patch")
        .arg(dir.path().join("fix.patch"))
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "def add(a, b):\n    return a + b\n\nprint(add(1, 2))\n"
    );
}

#[test]
fn patch_keeps_crlf_line_endings() {
    let dir = setup_workspace();
    let file = dir.path().join("calc.py");
    fs::write(
        &file,
        "def add(a, b):\r\n    return a - b\r\n\r\nprint(add(1, 2))\r\n",
    )
    .unwrap();

    let output = cockpit(dir.path())
        .args(["patch", "--file"])
        .arg(&file)
        .arg("--patch")
        .arg(dir.path().join("fix.patch"))
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "def add(a, b):\r\n    return a + b\r\n\r\nprint(add(1, 2))\r\n"
    );
}

#[test]
fn rejected_patch_fails_and_leaves_file() {
    let dir = setup_workspace();
    let file = dir.path().join("calc.py");
    let patch = dir.path().join("bad.patch");
    fs::write(&patch, "<<<PATCH\nDELETE #40\nPATCH>>>\n").unwrap();

    let output = cockpit(dir.path())
        .args(["patch", "--file"])
        .arg(&file)
        .arg("--patch")
        .arg(&patch)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("stale anchor"));
    assert!(fs::read_to_string(&file).unwrap().contains("a - b"));
}

#[test]
fn ask_without_endpoint_uses_fallback() {
    let dir = TempDir::new().unwrap();

    let output = cockpit(dir.path())
        .args(["ask", "--brain", "master", "sketch a plan"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("[Fallback Master]"));

    let journal = fs::read_to_string(dir.path().join(".lab-cockpit/memory.log")).unwrap();
    assert!(journal.contains("[MASTER USER] sketch a plan"));
}

#[test]
fn status_lists_both_brains() {
    let dir = TempDir::new().unwrap();

    let output = cockpit(dir.path()).arg("status").output().unwrap();
    assert!(output.status.success());

    let text = stdout(&output);
    assert!(text.contains("Scriptor ready"));
    assert!(text.contains("Master ready"));
    assert!(text.contains("fallback echo"));
}

#[test]
fn invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("cockpit.toml");
    fs::write(&config, "[feeder]\nchunk_chars = 0\n").unwrap();

    let output = cockpit(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["classify", "fix"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid cockpit config"));
}
