//! Service state and process-exit types for the vigil supervisor
//!
//! This module contains the state enumeration a supervised service moves
//! through, the description of a finished child process, and the exit
//! causes attached to `exited`/`backoff` events.
//!
//! ## Service Lifecycle
//!
//! Services progress through the following states:
//! - `Stopped`: initial and terminal resting state
//! - `Starting`: a start attempt is in flight
//! - `Running`: the child survived the start window
//! - `Stopping`: a stop signal has been delivered
//! - `Exited`: the child exited (or could not be launched)
//! - `Backoff`: the child exited before the start window elapsed
//! - `Fatal`: start retries are exhausted; only `shutdown` leaves this state

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Current state of a supervised service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ServiceState {
    /// Service is not running
    Stopped,
    /// A start attempt is in flight
    Starting,
    /// The child process survived the start window
    Running,
    /// The child has been signaled and is being waited on
    Stopping,
    /// The child exited after running, or could not be launched
    Exited,
    /// The child exited before the start window elapsed
    Backoff,
    /// Start retries are exhausted
    Fatal,
}

impl ServiceState {
    /// Wire spelling of the state, as it appears in emitted events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Exited => "exited",
            ServiceState::Backoff => "backoff",
            ServiceState::Fatal => "fatal",
        }
    }

    /// A child process exists exactly while the service is in one of
    /// these states.
    #[must_use]
    pub const fn has_child(&self) -> bool {
        matches!(self, ServiceState::Running | ServiceState::Stopping)
    }

    /// States from which an external `start` (or `restart`) may begin a
    /// start attempt.
    #[must_use]
    pub const fn can_start(&self) -> bool {
        matches!(self, ServiceState::Stopped | ServiceState::Exited)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a child's stdout or stderr should be sent
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OutputSink {
    /// Discard the stream (/dev/null)
    #[default]
    Discard,
    /// Inherit the supervisor's own stream
    Inherit,
    /// Append to a file, created if missing
    Append {
        /// Path of the file to append to
        path: PathBuf,
    },
}

/// How a child process finished
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExit {
    /// PID of the process that exited
    pub pid: u32,
    /// Exit code, when the process exited on its own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Signal number, when the process was killed by a signal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// True for a clean zero-status exit.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Short human-readable status, e.g. `exit code 1` or `signal 9`.
    #[must_use]
    pub fn describe(&self) -> String {
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("exit code {code}"),
            (None, Some(signal)) => format!("signal {signal}"),
            (None, None) => "unknown status".to_string(),
        }
    }
}

/// Why a service reached `exited` or `backoff`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExitCause {
    /// The child could not be launched at all
    LaunchFailed {
        /// Host-level launch error
        message: String,
    },
    /// The child ran past the start window and then exited
    Exited {
        /// How the child finished
        exit: ProcessExit,
    },
    /// The child exited before the start window elapsed
    Premature {
        /// How the child finished
        exit: ProcessExit,
    },
}

impl ExitCause {
    /// Cause for a launch failure, wrapping the host error.
    pub fn launch_failed(error: impl fmt::Display) -> Self {
        ExitCause::LaunchFailed {
            message: error.to_string(),
        }
    }

    /// Cause for an exit observed after the start window.
    #[must_use]
    pub const fn exited(exit: ProcessExit) -> Self {
        ExitCause::Exited { exit }
    }

    /// Cause for an exit observed inside the start window.
    #[must_use]
    pub const fn premature(exit: ProcessExit) -> Self {
        ExitCause::Premature { exit }
    }
}

impl fmt::Display for ExitCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCause::LaunchFailed { message } => write!(f, "failed to launch: {message}"),
            ExitCause::Exited { exit } if exit.is_success() => {
                f.write_str("exited normally with success")
            }
            ExitCause::Exited { exit } => {
                write!(f, "exited normally with failure ({})", exit.describe())
            }
            ExitCause::Premature { exit } if exit.is_success() => {
                f.write_str("exited prematurely with success")
            }
            ExitCause::Premature { exit } => {
                write!(f, "exited prematurely with failure ({})", exit.describe())
            }
        }
    }
}
