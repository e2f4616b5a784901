//! End-to-end checks against the built `holdfast` binary.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

fn holdfast(dir: &Path, args: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_holdfast"))
        .current_dir(dir)
        .env("RUST_LOG", "holdfast=debug")
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap()
}

fn send(child: &Child, signal: Signal) {
    kill(Pid::from_raw(child.id() as i32), signal).unwrap();
}

/// Wait until `path` exists with at least `lines` lines.
fn wait_for_lines(path: &Path, lines: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if contents.lines().count() >= lines {
                return;
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for {}", path.display());
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_exit_code_of_child_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    let output = holdfast(dir.path(), &["--", "sh", "-c", "exit 3"])
        .wait_with_output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_interrupt_during_run_lets_child_finish_then_exits_130() {
    let dir = tempfile::tempdir().unwrap();
    let script = "echo started > started; sleep 1; echo done > marker";
    let child = holdfast(dir.path(), &["--", "sh", "-c", script]);

    wait_for_lines(&dir.path().join("started"), 1);
    send(&child, Signal::SIGINT);

    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(130), "stderr: {}", stderr(&output));
    let marker = std::fs::read_to_string(dir.path().join("marker")).unwrap();
    assert_eq!(marker.trim(), "done");
    assert!(stderr(&output).contains("exiting with code 130 (SIGINT)"));
}

#[test]
fn test_interrupt_then_terminate_during_run_exits_143() {
    let dir = tempfile::tempdir().unwrap();
    let script = "echo started > started; sleep 1; echo done > marker";
    let child = holdfast(dir.path(), &["--", "sh", "-c", script]);

    wait_for_lines(&dir.path().join("started"), 1);
    send(&child, Signal::SIGINT);
    std::thread::sleep(Duration::from_millis(100));
    send(&child, Signal::SIGTERM);

    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(143), "stderr: {}", stderr(&output));
    assert!(dir.path().join("marker").exists());
}

#[test]
fn test_terminate_between_runs_exits_143_without_running_again() {
    let dir = tempfile::tempdir().unwrap();
    let runs = dir.path().join("runs");
    let script = format!("echo run >> {}", runs.display());
    let child = holdfast(
        dir.path(),
        &["--repeat", "3", "--pause-ms", "5000", "--", "sh", "-c", &script],
    );

    wait_for_lines(&runs, 1);
    std::thread::sleep(Duration::from_millis(200));
    let sent = Instant::now();
    send(&child, Signal::SIGTERM);

    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(143), "stderr: {}", stderr(&output));
    // Did not sit out the 5s pause.
    assert!(sent.elapsed() < Duration::from_secs(3));
    let contents = std::fs::read_to_string(&runs).unwrap();
    assert_eq!(contents.lines().count(), 1);
}

#[test]
fn test_repeat_runs_command_each_time() {
    let dir = tempfile::tempdir().unwrap();
    let runs = dir.path().join("runs");
    let script = format!("echo run >> {}", runs.display());
    let output = holdfast(dir.path(), &["--repeat", "3", "--", "sh", "-c", &script])
        .wait_with_output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let contents = std::fs::read_to_string(&runs).unwrap();
    assert_eq!(contents.lines().count(), 3);
}

#[test]
fn test_config_file_sets_repeat() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("holdfast.toml"), "[run]\nrepeat = 2\n").unwrap();
    let runs = dir.path().join("runs");
    let script = format!("echo run >> {}", runs.display());
    let output = holdfast(dir.path(), &["--", "sh", "-c", &script])
        .wait_with_output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(std::fs::read_to_string(&runs).unwrap().lines().count(), 2);
}

#[test]
fn test_dry_run_prints_settings_without_running() {
    let dir = tempfile::tempdir().unwrap();
    let output = holdfast(
        dir.path(),
        &["--dry-run", "--repeat", "4", "--", "sh", "-c", "echo ran > ran"],
    )
    .wait_with_output()
    .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("repeat = 4"));
    assert!(stdout.contains("Dry run"));
    assert!(!dir.path().join("ran").exists());
}

#[test]
fn test_malformed_config_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("holdfast.toml"), "[run\n").unwrap();
    let output = holdfast(dir.path(), &["--", "true"]).wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("invalid configuration"));
}

#[test]
fn test_missing_command_binary_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let output = holdfast(dir.path(), &["--", "nonexistent-binary-xyz"])
        .wait_with_output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("failed to spawn"));
}
