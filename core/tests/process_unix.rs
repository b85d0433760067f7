//! Integration tests for Unix process management
//!
//! These tests verify that the process layer correctly:
//! - Creates children in their own process groups (via setsid)
//! - Reports exit codes and terminating signals
//! - Tolerates signals aimed at groups that are already gone
//! - Honors environment replacement and output sinks

#![cfg(unix)]

use nix::sys::signal::Signal;
use std::collections::HashMap;
use std::path::PathBuf;
use vigil_core::process::unix::{group_alive, kill_group, signal_group, spawn};
use vigil_core::supervisor::ChildCommand;
use vigil_core::{OutputSink, ServiceError};

fn sh(script: &str) -> ChildCommand {
    ChildCommand {
        program: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        directory: PathBuf::from("/"),
        environment: None,
        stdout: OutputSink::Discard,
        stderr: OutputSink::Discard,
    }
}

fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("vigil-{}-{}", std::process::id(), name))
}

#[tokio::test]
async fn test_child_is_its_own_group_leader() {
    let child = spawn(&sh("sleep 5")).expect("failed to spawn");

    assert!(child.pid() > 0);
    assert_eq!(child.pid(), child.pgid());
    assert!(group_alive(child.pgid()));

    kill_group(child.pgid()).expect("failed to kill");
}

#[tokio::test]
async fn test_wait_reports_exit_codes() {
    let mut child = spawn(&sh("exit 0")).expect("failed to spawn");
    let exit = child.wait().await.expect("failed to wait");
    assert_eq!(exit.exit_code, Some(0));
    assert!(exit.is_success());

    let mut child = spawn(&sh("exit 3")).expect("failed to spawn");
    let exit = child.wait().await.expect("failed to wait");
    assert_eq!(exit.exit_code, Some(3));
    assert!(!exit.is_success());
}

#[tokio::test]
async fn test_kill_group_reports_signal() {
    let mut child = spawn(&sh("sleep 10")).expect("failed to spawn");
    let pgid = child.pgid();

    kill_group(pgid).expect("failed to kill");
    let exit = child.wait().await.expect("failed to wait");

    assert_eq!(exit.exit_code, None);
    assert_eq!(exit.signal, Some(libc::SIGKILL));
    assert!(!group_alive(pgid));
}

#[tokio::test]
async fn test_sigterm_terminates_group() {
    let mut child = spawn(&sh("sleep 10")).expect("failed to spawn");

    signal_group(child.pgid(), Signal::SIGTERM).expect("failed to signal");
    let exit = child.wait().await.expect("failed to wait");

    assert_eq!(exit.signal, Some(libc::SIGTERM));
}

#[tokio::test]
async fn test_spawn_missing_program_fails() {
    let mut command = sh("true");
    command.program = "nonexistent_command_12345".to_string();

    match spawn(&command) {
        Err(ServiceError::Spawn { program, .. }) => {
            assert_eq!(program, "nonexistent_command_12345");
        }
        Ok(child) => panic!("unexpected successful spawn with pid {}", child.pid()),
        Err(other) => panic!("expected Spawn error, got: {other}"),
    }
}

#[tokio::test]
async fn test_signals_to_gone_group_are_tolerated() {
    assert!(signal_group(3_999_999, Signal::SIGTERM).is_ok());
    assert!(kill_group(3_999_999).is_ok());
    assert!(!group_alive(3_999_999));
}

#[tokio::test]
async fn test_stdout_append_sink() {
    let path = scratch_file("stdout.log");
    let mut command = sh("echo first && echo second");
    command.stdout = OutputSink::Append { path: path.clone() };

    let mut child = spawn(&command).expect("failed to spawn");
    let exit = child.wait().await.expect("failed to wait");
    assert!(exit.is_success());

    let contents = std::fs::read_to_string(&path).expect("failed to read sink");
    assert_eq!(contents, "first\nsecond\n");
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_environment_replacement() {
    let path = scratch_file("env.log");
    let mut command = sh("echo \"marker=$VIGIL_MARKER\"");
    command.stdout = OutputSink::Append { path: path.clone() };
    command.environment = Some(HashMap::from([(
        "VIGIL_MARKER".to_string(),
        "present".to_string(),
    )]));

    let mut child = spawn(&command).expect("failed to spawn");
    child.wait().await.expect("failed to wait");

    let contents = std::fs::read_to_string(&path).expect("failed to read sink");
    assert_eq!(contents.trim(), "marker=present");
    let _ = std::fs::remove_file(&path);
}
