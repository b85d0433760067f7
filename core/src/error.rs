//! Core error types and utilities

use schema::{ExitCause, ServiceState};
use thiserror::Error;

/// Errors produced by the supervisor and its process host
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A command arrived in a state that forbids its transition
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// State the service was in when the command arrived
        from: ServiceState,
        /// State the command would have entered
        to: ServiceState,
    },

    /// A command arrived while another command was still in flight
    #[error("command is currently executing")]
    CommandBusy,

    /// A command arrived after shutdown was accepted, or was preempted by one
    #[error("service is shutting down")]
    ShuttingDown,

    /// A start or restart ended in `exited` or `fatal`
    #[error("{cause}")]
    StartFailed {
        /// The exit cause of the last attempt
        cause: ExitCause,
    },

    /// The supervisor loop is no longer running
    #[error("supervisor task has shut down")]
    SupervisorGone,

    /// A service was created with an empty command line
    #[error("command line must not be empty")]
    EmptyCommand,

    /// The child process could not be spawned
    #[error("failed to spawn '{program}': {message}")]
    Spawn {
        /// Program that was being launched
        program: String,
        /// Host-level error message
        message: String,
    },

    /// A signal could not be delivered to a process group
    #[error("failed to signal process group {pid}: {message}")]
    Signal {
        /// Target process group
        pid: u32,
        /// Host-level error message
        message: String,
    },

    /// I/O error from the host environment
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure wiring up logging
    #[error("initialization error: {0}")]
    Init(String),
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, ServiceError>;
