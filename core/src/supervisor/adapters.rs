//! Process hosts for spawning and signaling children
//!
//! [`ProcessHost`] is the complete operating-system surface the
//! supervisor consumes: launch a child from a description, wait for it,
//! deliver a signal to a PID, forcibly kill a PID, and probe a PID's
//! liveness. Signaling is keyed by PID rather than by handle because
//! the handle lives inside the lifecycle task that waits on the child,
//! while stop signals and kill escalation are issued from the control
//! loop.
//!
//! [`UnixProcessHost`] signals whole process groups; [`MockProcessHost`]
//! runs scripted in-memory children for deterministic tests.

use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use nix::sys::signal::Signal;
use schema::ProcessExit;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

use super::ChildCommand;

/// Trait for the operating-system process surface
#[async_trait]
pub trait ProcessHost: Send + Sync {
    /// Launch a child according to the given description.
    async fn spawn(&self, command: &ChildCommand) -> Result<Box<dyn ChildHandle>>;

    /// Send a signal to the process (group) identified by `pid`.
    fn signal(&self, pid: u32, signal: Signal) -> Result<()>;

    /// Forcibly kill the process (group) identified by `pid`.
    fn kill(&self, pid: u32) -> Result<()>;

    /// Whether `pid` still identifies a live process (group).
    fn is_alive(&self, pid: u32) -> bool;
}

/// A spawned child that can be waited on
#[async_trait]
pub trait ChildHandle: Send + std::fmt::Debug {
    /// Process ID of the child.
    fn pid(&self) -> u32;

    /// Wait for the child to exit.
    async fn wait(&mut self) -> Result<ProcessExit>;
}

/// Process host backed by real Unix processes
#[cfg(unix)]
#[derive(Copy, Clone, Debug, Default)]
pub struct UnixProcessHost;

#[cfg(unix)]
impl UnixProcessHost {
    /// Create a new Unix process host.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
#[async_trait]
impl ProcessHost for UnixProcessHost {
    async fn spawn(&self, command: &ChildCommand) -> Result<Box<dyn ChildHandle>> {
        let child = crate::process::unix::spawn(command)?;
        Ok(Box::new(UnixChild { inner: child }))
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<()> {
        crate::process::unix::signal_group(pid, signal)
    }

    fn kill(&self, pid: u32) -> Result<()> {
        crate::process::unix::kill_group(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        crate::process::unix::group_alive(pid)
    }
}

#[cfg(unix)]
#[derive(Debug)]
struct UnixChild {
    inner: crate::process::unix::ChildProcess,
}

#[cfg(unix)]
#[async_trait]
impl ChildHandle for UnixChild {
    fn pid(&self) -> u32 {
        self.inner.pid()
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        self.inner.wait().await
    }
}

/// Scripted behavior for one mock child
#[derive(Debug, Clone, Copy)]
pub struct MockInstruction {
    /// How long the child runs before exiting on its own
    pub exit_delay: Duration,
    /// Exit code of the natural exit
    pub exit_code: Option<i32>,
    /// Signal of the natural exit
    pub signal: Option<i32>,
    /// Whether stop signals terminate the child
    pub responds_to_signals: bool,
    /// Whether the launch itself fails before a child exists
    pub fail_launch: bool,
}

impl Default for MockInstruction {
    fn default() -> Self {
        Self {
            exit_delay: Duration::from_millis(50),
            exit_code: Some(0),
            signal: None,
            responds_to_signals: true,
            fail_launch: false,
        }
    }
}

impl MockInstruction {
    /// A child that keeps running until signaled.
    #[must_use]
    pub fn long_running() -> Self {
        Self {
            exit_delay: Duration::from_secs(3600),
            ..Self::default()
        }
    }

    /// A child that exits almost immediately with `code`.
    #[must_use]
    pub fn exits_with(code: i32) -> Self {
        Self {
            exit_delay: Duration::from_millis(1),
            exit_code: Some(code),
            ..Self::default()
        }
    }

    /// A child that ignores stop signals and must be killed.
    #[must_use]
    pub fn ignores_signals() -> Self {
        Self {
            exit_delay: Duration::from_secs(3600),
            responds_to_signals: false,
            ..Self::default()
        }
    }

    /// A launch that fails before a child exists.
    #[must_use]
    pub fn fails_to_launch() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }
}

/// Mock process host for testing
///
/// Spawns scripted children: instructions pushed with
/// [`MockProcessHost::push_instruction`] are consumed first, then the
/// fallback instruction applies to every further spawn. Delivered
/// signals and kills are recorded for assertions.
#[derive(Clone)]
pub struct MockProcessHost {
    state: Arc<Mutex<MockHostState>>,
}

#[derive(Debug)]
struct MockHostState {
    queue: VecDeque<MockInstruction>,
    fallback: MockInstruction,
    children: HashMap<u32, MockChildState>,
    signals: Vec<(u32, Signal)>,
    kills: Vec<u32>,
    next_pid: u32,
}

#[derive(Debug)]
struct MockChildState {
    alive: bool,
    responds_to_signals: bool,
    forced_signal: Option<i32>,
    exit_notify: Arc<Notify>,
}

impl Default for MockProcessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProcessHost {
    /// Create a mock host whose children follow the default instruction.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fallback(MockInstruction::default())
    }

    /// Create a mock host with a fallback instruction for every spawn
    /// not covered by the queue.
    #[must_use]
    pub fn with_fallback(fallback: MockInstruction) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockHostState {
                queue: VecDeque::new(),
                fallback,
                children: HashMap::new(),
                signals: Vec::new(),
                kills: Vec::new(),
                next_pid: 40_000,
            })),
        }
    }

    /// Queue an instruction for the next spawned child.
    pub fn push_instruction(&self, instruction: MockInstruction) {
        self.locked().queue.push_back(instruction);
    }

    /// Signals delivered through this host, in order.
    #[must_use]
    pub fn recorded_signals(&self) -> Vec<(u32, Signal)> {
        self.locked().signals.clone()
    }

    /// Kills issued through this host, in order.
    #[must_use]
    pub fn recorded_kills(&self) -> Vec<u32> {
        self.locked().kills.clone()
    }

    fn locked(&self) -> MutexGuard<'_, MockHostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProcessHost for MockProcessHost {
    async fn spawn(&self, command: &ChildCommand) -> Result<Box<dyn ChildHandle>> {
        debug!("spawning mock process for: {} {:?}", command.program, command.args);

        let (pid, instruction, notify) = {
            let mut state = self.locked();
            let instruction = state.queue.pop_front().unwrap_or(state.fallback);

            if instruction.fail_launch {
                return Err(ServiceError::Spawn {
                    program: command.program.clone(),
                    message: "mock launch failure".to_string(),
                });
            }

            state.next_pid += 1;
            let pid = state.next_pid;
            let notify = Arc::new(Notify::new());
            state.children.insert(
                pid,
                MockChildState {
                    alive: true,
                    responds_to_signals: instruction.responds_to_signals,
                    forced_signal: None,
                    exit_notify: notify.clone(),
                },
            );
            (pid, instruction, notify)
        };

        Ok(Box::new(MockChild {
            pid,
            instruction,
            exit_deadline: tokio::time::Instant::now() + instruction.exit_delay,
            notify,
            host: self.state.clone(),
        }))
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<()> {
        let mut state = self.locked();
        state.signals.push((pid, signal));
        if let Some(child) = state.children.get_mut(&pid) {
            if child.alive && child.responds_to_signals {
                child.forced_signal = Some(signal as i32);
                child.exit_notify.notify_one();
            }
        }
        // Signaling a gone PID mirrors the ESRCH-tolerant Unix host.
        Ok(())
    }

    fn kill(&self, pid: u32) -> Result<()> {
        let mut state = self.locked();
        state.kills.push(pid);
        if let Some(child) = state.children.get_mut(&pid) {
            if child.alive {
                child.forced_signal = Some(Signal::SIGKILL as i32);
                child.exit_notify.notify_one();
            }
        }
        Ok(())
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.locked().children.get(&pid).is_some_and(|c| c.alive)
    }
}

/// Mock child that exits on schedule or when signaled
#[derive(Debug)]
struct MockChild {
    pid: u32,
    instruction: MockInstruction,
    exit_deadline: tokio::time::Instant,
    notify: Arc<Notify>,
    host: Arc<Mutex<MockHostState>>,
}

#[async_trait]
impl ChildHandle for MockChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        let natural = tokio::time::sleep_until(self.exit_deadline);
        tokio::pin!(natural);
        tokio::select! {
            () = &mut natural => {}
            () = self.notify.notified() => {}
        }

        let mut state = self.host.lock().unwrap_or_else(PoisonError::into_inner);
        let forced = state.children.get_mut(&self.pid).and_then(|child| {
            child.alive = false;
            child.forced_signal
        });

        Ok(match forced {
            Some(signal) => ProcessExit {
                pid: self.pid,
                exit_code: None,
                signal: Some(signal),
            },
            None => ProcessExit {
                pid: self.pid,
                exit_code: self.instruction.exit_code,
                signal: self.instruction.signal,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn mock_command() -> ChildCommand {
        ChildCommand {
            program: "mock-child".to_string(),
            args: vec![],
            directory: PathBuf::from("/"),
            environment: None,
            stdout: schema::OutputSink::Discard,
            stderr: schema::OutputSink::Discard,
        }
    }

    #[tokio::test]
    async fn test_mock_natural_exit() {
        let host = MockProcessHost::new();
        let mut child = host.spawn(&mock_command()).await.unwrap();

        assert!(child.pid() > 0);
        assert!(host.is_alive(child.pid()));

        let exit = child.wait().await.unwrap();
        assert_eq!(exit.exit_code, Some(0));
        assert_eq!(exit.signal, None);
        assert!(!host.is_alive(exit.pid));
    }

    #[tokio::test]
    async fn test_mock_signal_terminates_child() {
        let host = MockProcessHost::with_fallback(MockInstruction::long_running());
        let mut child = host.spawn(&mock_command()).await.unwrap();
        let pid = child.pid();

        host.signal(pid, Signal::SIGTERM).unwrap();
        let exit = child.wait().await.unwrap();

        assert_eq!(exit.exit_code, None);
        assert_eq!(exit.signal, Some(Signal::SIGTERM as i32));
        assert_eq!(host.recorded_signals(), vec![(pid, Signal::SIGTERM)]);
    }

    #[tokio::test]
    async fn test_mock_stubborn_child_requires_kill() {
        let host = MockProcessHost::with_fallback(MockInstruction::ignores_signals());
        let mut child = host.spawn(&mock_command()).await.unwrap();
        let pid = child.pid();

        host.signal(pid, Signal::SIGINT).unwrap();
        assert!(host.is_alive(pid));

        host.kill(pid).unwrap();
        let exit = child.wait().await.unwrap();

        assert_eq!(exit.signal, Some(Signal::SIGKILL as i32));
        assert_eq!(host.recorded_kills(), vec![pid]);
    }

    #[tokio::test]
    async fn test_mock_launch_failure() {
        let host = MockProcessHost::new();
        host.push_instruction(MockInstruction::fails_to_launch());

        let error = host.spawn(&mock_command()).await.unwrap_err();
        assert!(matches!(error, ServiceError::Spawn { .. }));

        // The queue is consumed; the next spawn falls back and succeeds.
        assert!(host.spawn(&mock_command()).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_signal_to_gone_pid_is_tolerated() {
        let host = MockProcessHost::new();
        assert!(host.signal(12345, Signal::SIGTERM).is_ok());
        assert!(host.kill(12345).is_ok());
        assert!(!host.is_alive(12345));
    }
}
