//! Supervisor control loop
//!
//! [`ServiceSupervisor`] owns every mutable field of a service and runs
//! the single select loop that multiplexes external commands, lifecycle
//! reports from the current start attempt, and kill-timer
//! notifications. Start attempts and kill timers run on transient
//! tasks and talk back to the loop exclusively through bounded
//! channels, so no state is shared.
//!
//! At most one command is in flight at a time. Its response is held
//! back until every event it caused has been emitted; a second command
//! arriving meanwhile is rejected, except `shutdown`, which preempts
//! the in-flight command and sticks until the loop exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use schema::{CommandName, ExitCause, ProcessExit, ServiceEvent, ServiceState};

use super::adapters::ProcessHost;
use super::{ChildCommand, Command, Service, ServiceStatus};
use crate::error::ServiceError;

/// An attempt posts at most two reports; a little slack keeps helpers
/// from ever blocking the loop.
const REPORT_CAPACITY: usize = 4;
const KILL_CAPACITY: usize = 4;

/// Lifecycle notification posted by one start attempt
#[derive(Debug)]
enum ChildReport {
    /// The start window elapsed with the child still alive
    Running { pid: u32 },
    /// The child exited after running, or could not be launched
    Exited { cause: ExitCause },
    /// The child exited before the start window elapsed
    Premature { cause: ExitCause },
}

/// Control loop managing the lifecycle of a single service
pub struct ServiceSupervisor {
    service: Service,
    host: Arc<dyn ProcessHost>,
    events: mpsc::Sender<ServiceEvent>,
    status_tx: watch::Sender<ServiceStatus>,
    state: ServiceState,
    pid: Option<u32>,
    retries: u32,
    pending: Option<Command>,
    shutting_down: bool,
    done: bool,
}

impl ServiceSupervisor {
    /// Create a supervisor for `service` in state `stopped`.
    pub fn new(
        service: Service,
        host: Arc<dyn ProcessHost>,
        events: mpsc::Sender<ServiceEvent>,
        status_tx: watch::Sender<ServiceStatus>,
    ) -> Self {
        Self {
            service,
            host,
            events,
            status_tx,
            state: ServiceState::Stopped,
            pid: None,
            retries: 0,
            pending: None,
            shutting_down: false,
            done: false,
        }
    }

    /// Current state of the service.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// PID of the child, or 0 unless running or stopping.
    #[must_use]
    pub fn pid(&self) -> u32 {
        if self.state.has_child() {
            self.pid.unwrap_or(0)
        } else {
            0
        }
    }

    /// Drive the service until a `shutdown` command completes.
    ///
    /// A closed command channel counts as a `shutdown`: the child is
    /// stopped before the loop exits.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("starting supervisor for service '{}'", self.service.id);

        let (report_tx, mut report_rx) = mpsc::channel(REPORT_CAPACITY);
        let (kill_tx, mut kill_rx) = mpsc::channel(KILL_CAPACITY);
        let mut commands_open = true;

        while !self.done {
            tokio::select! {
                Some(report) = report_rx.recv() => {
                    self.handle_report(report, &report_tx, &kill_tx).await;
                }
                command = commands.recv(), if commands_open => {
                    match command {
                        Some(command) => {
                            self.handle_command(command, &report_tx, &kill_tx).await;
                        }
                        None => {
                            debug!("command channel closed, shutting down service '{}'", self.service.id);
                            commands_open = false;
                            let shutdown = Command::new(CommandName::Shutdown);
                            self.handle_command(shutdown, &report_tx, &kill_tx).await;
                        }
                    }
                }
                Some(pid) = kill_rx.recv() => {
                    self.handle_kill(pid);
                }
            }
        }

        info!("supervisor for service '{}' terminated", self.service.id);
    }

    async fn handle_command(
        &mut self,
        command: Command,
        report_tx: &mpsc::Sender<ChildReport>,
        kill_tx: &mpsc::Sender<u32>,
    ) {
        debug!("service '{}' received command '{}'", self.service.id, command.name);

        // Shutdown cannot be overridden; everything after it is rejected.
        if self.shutting_down {
            command.respond(&self.service.id, Some(ServiceError::ShuttingDown));
            return;
        }

        match command.name {
            CommandName::Shutdown => {
                if let Some(pending) = self.pending.take() {
                    pending.respond(&self.service.id, Some(ServiceError::ShuttingDown));
                }
                self.shutting_down = true;
                self.begin_shutdown(command, kill_tx).await;
            }
            _ if self.pending.is_some() => {
                command.respond(&self.service.id, Some(ServiceError::CommandBusy));
            }
            CommandName::Start => self.command_start(command, report_tx).await,
            CommandName::Stop => self.command_stop(command, kill_tx).await,
            CommandName::Restart => self.command_restart(command, report_tx, kill_tx).await,
        }
    }

    async fn command_start(&mut self, command: Command, report_tx: &mpsc::Sender<ChildReport>) {
        if !self.state.can_start() {
            let error = ServiceError::InvalidTransition {
                from: self.state,
                to: ServiceState::Starting,
            };
            command.respond(&self.service.id, Some(error));
            return;
        }

        self.pending = Some(command);
        self.begin_attempt(report_tx).await;
    }

    async fn command_stop(&mut self, command: Command, kill_tx: &mpsc::Sender<u32>) {
        if self.state != ServiceState::Running {
            let error = ServiceError::InvalidTransition {
                from: self.state,
                to: ServiceState::Stopping,
            };
            command.respond(&self.service.id, Some(error));
            return;
        }

        self.pending = Some(command);
        self.begin_stop(kill_tx).await;
    }

    async fn command_restart(
        &mut self,
        command: Command,
        report_tx: &mpsc::Sender<ChildReport>,
        kill_tx: &mpsc::Sender<u32>,
    ) {
        if self.state == ServiceState::Running {
            self.pending = Some(command);
            self.begin_stop(kill_tx).await;
        } else if self.state.can_start() {
            self.pending = Some(command);
            self.begin_attempt(report_tx).await;
        } else {
            let error = ServiceError::InvalidTransition {
                from: self.state,
                to: ServiceState::Stopping,
            };
            command.respond(&self.service.id, Some(error));
        }
    }

    async fn begin_shutdown(&mut self, command: Command, kill_tx: &mpsc::Sender<u32>) {
        match self.state {
            ServiceState::Stopped | ServiceState::Exited | ServiceState::Fatal => {
                self.finish(command);
            }
            ServiceState::Running => {
                self.pending = Some(command);
                self.begin_stop(kill_tx).await;
            }
            ServiceState::Starting | ServiceState::Stopping => {
                // Deferred: the next child report resolves it.
                self.pending = Some(command);
            }
            ServiceState::Backoff => {
                self.transition(ServiceState::Exited, None).await;
                self.finish(command);
            }
        }
    }

    /// Respond to a completed `shutdown` and stop the loop.
    fn finish(&mut self, command: Command) {
        command.respond(&self.service.id, None);
        self.done = true;
    }

    /// Emit `starting` and launch a lifecycle task for one attempt.
    async fn begin_attempt(&mut self, report_tx: &mpsc::Sender<ChildReport>) {
        self.transition(ServiceState::Starting, None).await;

        let host = self.host.clone();
        let command = self.service.child_command();
        let start_window = self.service.start_window;
        let reports = report_tx.clone();
        tokio::spawn(run_attempt(host, command, start_window, reports));
    }

    /// Emit `stopping`, deliver the stop signal, and arm the kill timer.
    async fn begin_stop(&mut self, kill_tx: &mpsc::Sender<u32>) {
        self.transition(ServiceState::Stopping, None).await;

        if let Some(pid) = self.pid {
            if let Err(error) = self.host.signal(pid, self.service.stop_signal) {
                warn!("failed to deliver stop signal to {}: {}", pid, error);
            }

            // The timer carries the PID captured now: after a fast
            // restart a late timer must not kill the newer child.
            let stop_timeout = self.service.stop_timeout;
            let kills = kill_tx.clone();
            tokio::spawn(async move {
                sleep(stop_timeout).await;
                let _ = kills.send(pid).await;
            });
        }
    }

    async fn handle_report(
        &mut self,
        report: ChildReport,
        report_tx: &mpsc::Sender<ChildReport>,
        kill_tx: &mpsc::Sender<u32>,
    ) {
        match report {
            ChildReport::Running { pid } => self.on_running(pid, kill_tx).await,
            // An exit observed while stopping is the stop completing,
            // whatever shape the exit took.
            ChildReport::Exited { .. } | ChildReport::Premature { .. }
                if self.state == ServiceState::Stopping =>
            {
                self.on_stopped(report_tx).await;
            }
            ChildReport::Exited { cause } => self.on_exited(cause, report_tx).await,
            ChildReport::Premature { cause } => self.on_backoff(cause, report_tx).await,
        }
    }

    async fn on_running(&mut self, pid: u32, kill_tx: &mpsc::Sender<u32>) {
        if self.state != ServiceState::Starting {
            debug!("ignoring stale running report for pid {}", pid);
            return;
        }

        self.retries = 0;
        self.pid = Some(pid);
        self.transition(ServiceState::Running, None).await;

        match self.pending.as_ref().map(|c| c.name) {
            Some(CommandName::Start | CommandName::Restart) => {
                if let Some(pending) = self.pending.take() {
                    pending.respond(&self.service.id, None);
                }
            }
            Some(CommandName::Shutdown) => self.begin_stop(kill_tx).await,
            _ => {}
        }
    }

    async fn on_stopped(&mut self, report_tx: &mpsc::Sender<ChildReport>) {
        self.pid = None;
        self.transition(ServiceState::Stopped, None).await;

        match self.pending.as_ref().map(|c| c.name) {
            Some(CommandName::Stop) => {
                if let Some(pending) = self.pending.take() {
                    pending.respond(&self.service.id, None);
                }
            }
            Some(CommandName::Restart) => self.begin_attempt(report_tx).await,
            Some(CommandName::Shutdown) => {
                if let Some(pending) = self.pending.take() {
                    self.finish(pending);
                }
            }
            _ => {}
        }
    }

    async fn on_exited(&mut self, cause: ExitCause, report_tx: &mpsc::Sender<ChildReport>) {
        let from = self.state;
        self.pid = None;
        self.transition(ServiceState::Exited, Some(cause.clone())).await;

        match self.pending.as_ref().map(|c| c.name) {
            Some(CommandName::Shutdown) => {
                if let Some(pending) = self.pending.take() {
                    self.finish(pending);
                }
                return;
            }
            Some(CommandName::Start | CommandName::Restart) => {
                // The attempt never reached running: surface the cause.
                if let Some(pending) = self.pending.take() {
                    pending.respond(&self.service.id, Some(ServiceError::StartFailed { cause }));
                }
                return;
            }
            _ => {}
        }

        if from == ServiceState::Running && self.service.restart_on_exit {
            debug!("service '{}' exited unexpectedly, restarting", self.service.id);
            self.begin_attempt(report_tx).await;
        }
    }

    async fn on_backoff(&mut self, cause: ExitCause, report_tx: &mpsc::Sender<ChildReport>) {
        self.pid = None;

        // A pending shutdown abandons the retry sequence.
        if let Some(CommandName::Shutdown) = self.pending.as_ref().map(|c| c.name) {
            self.transition(ServiceState::Exited, Some(cause)).await;
            if let Some(pending) = self.pending.take() {
                self.finish(pending);
            }
            return;
        }

        if self.retries < self.service.start_retries {
            self.transition(ServiceState::Backoff, Some(cause)).await;
            self.retries += 1;
            self.begin_attempt(report_tx).await;
        } else {
            self.transition(ServiceState::Fatal, Some(cause.clone())).await;
            self.retries = 0;
            if let Some(pending) = self.pending.take() {
                pending.respond(&self.service.id, Some(ServiceError::StartFailed { cause }));
            }
        }
    }

    fn handle_kill(&mut self, pid: u32) {
        if self.pid == Some(pid) {
            warn!(
                "service '{}' did not stop within {:?}, killing pid {}",
                self.service.id, self.service.stop_timeout, pid
            );
            if let Err(error) = self.host.kill(pid) {
                warn!("failed to kill pid {}: {}", pid, error);
            }
        } else {
            debug!("kill timer fired for pid {}, which is no longer current", pid);
        }
    }

    /// Enter `to`, publish the status snapshot, and emit the event.
    async fn transition(&mut self, to: ServiceState, cause: Option<ExitCause>) {
        let from = self.state;
        self.state = to;
        debug!("service '{}' transitioning from {} to {}", self.service.id, from, to);

        self.status_tx.send_replace(ServiceStatus {
            state: to,
            pid: self.pid(),
        });

        let mut event = ServiceEvent::new(self.service.id.clone(), to);
        if let Some(cause) = cause {
            event = event.with_cause(cause);
        }
        if self.events.send(event).await.is_err() {
            warn!(
                "event receiver for service '{}' dropped, state change not delivered",
                self.service.id
            );
        }
    }
}

/// One start attempt: launch the child and classify its exit.
///
/// Posts exactly one of `Premature`, `Exited` (launch failure), or
/// `Running` followed later by `Exited`, then terminates.
async fn run_attempt(
    host: Arc<dyn ProcessHost>,
    command: ChildCommand,
    start_window: Duration,
    reports: mpsc::Sender<ChildReport>,
) {
    let mut child = match host.spawn(&command).await {
        Ok(child) => child,
        Err(error) => {
            warn!("failed to launch '{}': {}", command.program, error);
            let cause = ExitCause::launch_failed(error);
            let _ = reports.send(ChildReport::Exited { cause }).await;
            return;
        }
    };

    let pid = child.pid();
    debug!("launched '{}' with pid {}", command.program, pid);

    let window = sleep(start_window);
    tokio::pin!(window);

    tokio::select! {
        exit = child.wait() => {
            let cause = ExitCause::premature(settled_exit(exit, pid));
            let _ = reports.send(ChildReport::Premature { cause }).await;
        }
        () = &mut window => {
            let _ = reports.send(ChildReport::Running { pid }).await;
            let exit = child.wait().await;
            let cause = ExitCause::exited(settled_exit(exit, pid));
            let _ = reports.send(ChildReport::Exited { cause }).await;
        }
    }
}

/// Fall back to an opaque exit when the host cannot report one.
fn settled_exit(result: crate::error::Result<ProcessExit>, pid: u32) -> ProcessExit {
    result.unwrap_or_else(|error| {
        warn!("failed to wait on pid {}: {}", pid, error);
        ProcessExit {
            pid,
            exit_code: None,
            signal: None,
        }
    })
}
