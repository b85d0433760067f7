//! Single-process supervisor
//!
//! This module provides the supervisor for one external process: the
//! control loop that owns the service state machine, the command and
//! response types used to drive it, and the handle returned when the
//! loop is spawned on its own task.
//!
//! ## Architecture
//!
//! Each service gets one control-loop task that owns every mutable
//! field and multiplexes three inbound streams: commands, lifecycle
//! reports from the current start attempt, and kill-timer
//! notifications. State transitions:
//!
//! ```text
//! stopped → starting → running → stopping → stopped
//!               ↓          ↓
//!            backoff     exited
//!               ↓
//!             fatal
//! ```
//!
//! ## Components
//!
//! - [`ServiceHandle`]: control interface returned by [`spawn_supervisor`]
//! - [`Command`] / [`Response`]: the message protocol driving the loop
//! - [`ProcessHost`]: trait abstracting the operating system's process surface
//! - [`ServiceSupervisor`]: the per-service control loop

use crate::error::{Result, ServiceError};
use schema::{CommandName, ServiceEvent, ServiceState};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

pub mod adapters;
mod service;
mod service_task;


#[cfg(unix)]
pub use adapters::UnixProcessHost;
pub use adapters::{ChildHandle, MockInstruction, MockProcessHost, ProcessHost};
pub use service::{
    ChildCommand, Service, DEFAULT_RESTART_ON_EXIT, DEFAULT_START_RETRIES, DEFAULT_START_WINDOW,
    DEFAULT_STOP_SIGNAL, DEFAULT_STOP_TIMEOUT,
};
pub use service_task::ServiceSupervisor;

/// Command sent to a supervisor to initiate a state change
#[derive(Debug)]
pub struct Command {
    /// Which transition to perform
    pub name: CommandName,
    /// Where to deliver the response; `None` means fire-and-forget
    pub reply: Option<oneshot::Sender<Response>>,
}

impl Command {
    /// A command without a reply channel.
    #[must_use]
    pub fn new(name: CommandName) -> Self {
        Self { name, reply: None }
    }

    /// A command paired with a receiver for its response.
    #[must_use]
    pub fn with_reply(name: CommandName) -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                name,
                reply: Some(tx),
            },
            rx,
        )
    }

    /// Deliver the response for this command, if anyone is listening.
    pub(crate) fn respond(self, service_id: &str, error: Option<ServiceError>) {
        if let Some(reply) = self.reply {
            let _ = reply.send(Response {
                service_id: service_id.to_string(),
                name: self.name,
                error,
            });
        }
    }
}

/// Result of a command
#[derive(Debug)]
pub struct Response {
    /// Identifier of the service that executed the command
    pub service_id: String,
    /// The command this response answers
    pub name: CommandName,
    /// `None` on success
    pub error: Option<ServiceError>,
}

impl Response {
    /// True if the command succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Snapshot of a supervisor's externally visible state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Current service state
    pub state: ServiceState,
    /// PID of the child, or 0 unless running or stopping
    pub pid: u32,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            state: ServiceState::Stopped,
            pid: 0,
        }
    }
}

/// Configuration for spawning a supervisor
pub struct SupervisorConfig {
    /// The service to supervise
    pub service: Service,
    /// Process host used to spawn and signal children
    pub host: Arc<dyn ProcessHost>,
    /// Where state-change events are delivered; the loop awaits every
    /// send, so the channel's capacity is the caller's event buffer
    pub events: mpsc::Sender<ServiceEvent>,
}

/// Spawn a supervisor task for the given service.
///
/// The returned [`ServiceHandle`] drives the loop; the loop runs until
/// a `shutdown` command completes (or every handle is dropped).
pub fn spawn_supervisor(config: SupervisorConfig) -> ServiceHandle {
    let SupervisorConfig {
        service,
        host,
        events,
    } = config;

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(ServiceStatus::default());

    let service_id = service.id.clone();
    info!("spawning supervisor for service '{}'", service_id);

    let task_id = service_id.clone();
    tokio::spawn(async move {
        let supervisor = ServiceSupervisor::new(service, host, events, status_tx);
        supervisor.run(control_rx).await;
        debug!("supervisor task for service '{}' terminated", task_id);
    });

    ServiceHandle {
        service_id,
        control_tx,
        status_rx,
    }
}

/// Handle for controlling a supervisor instance
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    service_id: String,
    control_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ServiceStatus>,
}

impl ServiceHandle {
    /// Identifier of the supervised service.
    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Send a command without waiting for its response.
    pub fn send(&self, command: Command) -> Result<()> {
        self.control_tx
            .send(command)
            .map_err(|_| ServiceError::SupervisorGone)
    }

    /// Send a command and wait for its response.
    pub async fn request(&self, name: CommandName) -> Result<Response> {
        let (command, reply) = Command::with_reply(name);
        self.send(command)?;
        reply.await.map_err(|_| ServiceError::SupervisorGone)
    }

    /// Start the service and wait for it to reach `running` (or fail).
    pub async fn start(&self) -> Result<Response> {
        self.request(CommandName::Start).await
    }

    /// Stop the service and wait for it to reach `stopped`.
    pub async fn stop(&self) -> Result<Response> {
        self.request(CommandName::Stop).await
    }

    /// Restart the service and wait for it to reach `running` again.
    pub async fn restart(&self) -> Result<Response> {
        self.request(CommandName::Restart).await
    }

    /// Shut the supervisor down; the loop exits once this responds.
    pub async fn shutdown(&self) -> Result<Response> {
        self.request(CommandName::Shutdown).await
    }

    /// Current state of the service.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        self.status_rx.borrow().state
    }

    /// PID of the child, or 0 unless running or stopping.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.status_rx.borrow().pid
    }

    /// Subscribe to status changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<ServiceStatus> {
        self.status_rx.clone()
    }
}
