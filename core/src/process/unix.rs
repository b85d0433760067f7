//! Unix process management with safe spawn/kill using process groups
//!
//! Every child is placed in its own session and process group via
//! `setsid()`, so stop signals and kill escalation reach the child's
//! whole process tree through `killpg`. `ESRCH` (group already gone)
//! and `EPERM` (ownership changed, which on a reaped group amounts to
//! the same thing) are treated as successful deliveries.

#![allow(unsafe_code)]

use crate::error::{Result, ServiceError};
use crate::supervisor::ChildCommand;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use schema::{OutputSink, ProcessExit};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, error};

/// A child process running as the leader of its own process group
#[derive(Debug)]
pub struct ChildProcess {
    pid: Pid,
    child: Child,
}

impl ChildProcess {
    /// Process ID of the spawned child.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Process group ID (same as the PID for session leaders).
    #[must_use]
    pub fn pgid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Wait for the child to exit and describe how it finished.
    pub async fn wait(&mut self) -> Result<ProcessExit> {
        let status = self.child.wait().await?;
        let (exit_code, signal) = status.code().map_or_else(
            || {
                // No exit code on Unix means the child was killed by a signal.
                use std::os::unix::process::ExitStatusExt;
                (None, status.signal())
            },
            |code| (Some(code), None),
        );
        Ok(ProcessExit {
            pid: self.pid(),
            exit_code,
            signal,
        })
    }
}

/// Spawn the child described by `command` in a fresh session.
///
/// The child becomes its own session and process group leader, detached
/// from the controlling terminal, so the whole tree it forks can be
/// signaled with one `killpg`.
pub fn spawn(command: &ChildCommand) -> Result<ChildProcess> {
    debug!("spawning process: {} {:?}", command.program, command.args);

    let mut builder = Command::new(&command.program);
    builder
        .args(&command.args)
        .current_dir(&command.directory)
        .stdin(Stdio::null())
        .stdout(stdio_for(&command.stdout)?)
        .stderr(stdio_for(&command.stderr)?);
    if let Some(environment) = &command.environment {
        builder.env_clear().envs(environment);
    }

    // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec.
    unsafe {
        builder.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = builder.spawn().map_err(|e| {
        error!("failed to spawn process '{}': {}", command.program, e);
        ServiceError::Spawn {
            program: command.program.clone(),
            message: e.to_string(),
        }
    })?;

    let raw_pid = child.id().ok_or_else(|| ServiceError::Spawn {
        program: command.program.clone(),
        message: "spawned child did not report a PID".to_string(),
    })?;
    let pid = Pid::from_raw(raw_pid as i32);
    debug!("spawned process {} in new process group", pid);

    Ok(ChildProcess { pid, child })
}

fn stdio_for(sink: &OutputSink) -> Result<Stdio> {
    Ok(match sink {
        OutputSink::Discard => Stdio::null(),
        OutputSink::Inherit => Stdio::inherit(),
        OutputSink::Append { path } => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Stdio::from(file)
        }
    })
}

/// Send `signal` to the process group `pgid`.
pub fn signal_group(pgid: u32, signal: Signal) -> Result<()> {
    debug!("sending {} to process group {}", signal, pgid);

    match killpg(Pid::from_raw(pgid as i32), signal) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) | Err(nix::errno::Errno::EPERM) => {
            debug!("process group {} already exited", pgid);
            Ok(())
        }
        Err(e) => {
            error!("failed to send {} to process group {}: {}", signal, pgid, e);
            Err(ServiceError::Signal {
                pid: pgid,
                message: e.to_string(),
            })
        }
    }
}

/// Send SIGKILL to the process group `pgid` for forceful termination.
pub fn kill_group(pgid: u32) -> Result<()> {
    signal_group(pgid, Signal::SIGKILL)
}

/// Probe whether the process group `pgid` still exists.
///
/// Uses `killpg(pgid, 0)`: no signal is delivered, but existence and
/// permission are checked. `EPERM` means the group exists under another
/// owner, so it counts as alive.
#[must_use]
pub fn group_alive(pgid: u32) -> bool {
    match killpg(Pid::from_raw(pgid as i32), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}
