//! Service configuration
//!
//! A [`Service`] is created in `stopped` with default configuration;
//! its public fields may be adjusted freely before it is handed to a
//! control loop, which treats them as immutable from then on.

use crate::error::{Result, ServiceError};
use nix::sys::signal::Signal;
use schema::OutputSink;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// How long a child must survive before it counts as running.
pub const DEFAULT_START_WINDOW: Duration = Duration::from_secs(1);

/// How many times a start is retried after premature exits.
pub const DEFAULT_START_RETRIES: u32 = 3;

/// Signal delivered to the child when stopping.
pub const DEFAULT_STOP_SIGNAL: Signal = Signal::SIGINT;

/// How long to wait after the stop signal before a SIGKILL.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether a child that exits unexpectedly is restarted.
pub const DEFAULT_RESTART_ON_EXIT: bool = true;

/// Everything needed to launch one child process
#[derive(Debug, Clone)]
pub struct ChildCommand {
    /// Program to execute (looked up on PATH unless absolute)
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Working directory of the child
    pub directory: PathBuf,
    /// `None` inherits the supervisor's environment; `Some` replaces it
    pub environment: Option<HashMap<String, String>>,
    /// Where the child's stdout goes
    pub stdout: OutputSink,
    /// Where the child's stderr goes
    pub stderr: OutputSink,
}

/// Configuration of one supervised process
#[derive(Debug, Clone)]
pub struct Service {
    /// Identifier carried on events and responses; defaults to the program name
    pub id: String,
    /// Working directory of the child; defaults to the current directory
    pub directory: PathBuf,
    /// Environment of the child; `None` inherits the current environment
    pub environment: Option<HashMap<String, String>>,
    /// Where the child's stdout goes; discarded by default
    pub stdout: OutputSink,
    /// Where the child's stderr goes; discarded by default
    pub stderr: OutputSink,
    /// How long the child must survive before it counts as running
    pub start_window: Duration,
    /// How many times a start is retried after premature exits
    pub start_retries: u32,
    /// Signal delivered on stop
    pub stop_signal: Signal,
    /// How long to wait after the stop signal before a SIGKILL
    pub stop_timeout: Duration,
    /// Whether to restart a child that exits unexpectedly
    pub restart_on_exit: bool,
    args: Vec<String>,
}

impl Service {
    /// Create a service with default configuration for `args`.
    ///
    /// Fails if `args` is empty or the current working directory cannot
    /// be determined.
    pub fn new(args: Vec<String>) -> Result<Self> {
        let program = args.first().cloned().ok_or(ServiceError::EmptyCommand)?;
        let directory = std::env::current_dir()?;

        Ok(Self {
            id: program,
            directory,
            environment: None,
            stdout: OutputSink::default(),
            stderr: OutputSink::default(),
            start_window: DEFAULT_START_WINDOW,
            start_retries: DEFAULT_START_RETRIES,
            stop_signal: DEFAULT_STOP_SIGNAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            restart_on_exit: DEFAULT_RESTART_ON_EXIT,
            args,
        })
    }

    /// The configured command line.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Assemble the launch description for one start attempt.
    pub(crate) fn child_command(&self) -> ChildCommand {
        ChildCommand {
            program: self.args[0].clone(),
            args: self.args[1..].to_vec(),
            directory: self.directory.clone(),
            environment: self.environment.clone(),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }
}
