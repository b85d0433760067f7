//! End-to-end supervisor tests against real Unix children

#![cfg(unix)]

use nix::sys::signal::Signal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use vigil_core::supervisor::{spawn_supervisor, ProcessHost, SupervisorConfig, UnixProcessHost};
use vigil_core::{Service, ServiceEvent, ServiceHandle, ServiceState};

const EVENT_WAIT: Duration = Duration::from_secs(5);

fn spawn_service(
    args: &[&str],
    configure: impl FnOnce(&mut Service),
) -> (ServiceHandle, mpsc::Receiver<ServiceEvent>) {
    let mut service =
        Service::new(args.iter().map(|s| s.to_string()).collect()).expect("service");
    service.start_window = Duration::from_millis(100);
    service.stop_signal = Signal::SIGTERM;
    service.stop_timeout = Duration::from_secs(2);
    configure(&mut service);

    let (event_tx, event_rx) = mpsc::channel(64);
    let handle = spawn_supervisor(SupervisorConfig {
        service,
        host: Arc::new(UnixProcessHost::new()),
        events: event_tx,
    });
    (handle, event_rx)
}

async fn expect_states(events: &mut mpsc::Receiver<ServiceEvent>, expected: &[ServiceState]) {
    for state in expected {
        let event = timeout(EVENT_WAIT, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        assert_eq!(event.state, *state, "unexpected event order");
    }
}

#[tokio::test]
async fn test_real_child_lifecycle() {
    let (handle, mut events) = spawn_service(&["/bin/sh", "-c", "sleep 30"], |_| {});

    let response = handle.start().await.expect("start");
    assert!(response.success(), "start failed: {:?}", response.error);
    expect_states(&mut events, &[ServiceState::Starting, ServiceState::Running]).await;

    let pid = handle.pid();
    assert_ne!(pid, 0);
    assert!(UnixProcessHost::new().is_alive(pid));

    let response = handle.stop().await.expect("stop");
    assert!(response.success(), "stop failed: {:?}", response.error);
    expect_states(&mut events, &[ServiceState::Stopping, ServiceState::Stopped]).await;
    assert_eq!(handle.pid(), 0);

    let response = handle.shutdown().await.expect("shutdown");
    assert!(response.success());
}

#[tokio::test]
async fn test_real_premature_exits_reach_fatal() {
    let (handle, mut events) = spawn_service(&["/bin/sh", "-c", "exit 1"], |service| {
        service.start_window = Duration::from_millis(500);
        service.start_retries = 2;
    });

    let response = handle.start().await.expect("start");
    assert!(!response.success());
    let message = response.error.map(|e| e.to_string()).unwrap_or_default();
    assert!(
        message.contains("exited prematurely with failure"),
        "unexpected error: {message}"
    );

    expect_states(
        &mut events,
        &[
            ServiceState::Starting,
            ServiceState::Backoff,
            ServiceState::Starting,
            ServiceState::Backoff,
            ServiceState::Starting,
            ServiceState::Fatal,
        ],
    )
    .await;

    let response = handle.shutdown().await.expect("shutdown");
    assert!(response.success());
}

#[tokio::test]
async fn test_real_unexpected_exit_restarts() {
    let (handle, mut events) = spawn_service(&["/bin/sh", "-c", "sleep 0.4"], |service| {
        service.start_window = Duration::from_millis(50);
    });

    let response = handle.start().await.expect("start");
    assert!(response.success(), "start failed: {:?}", response.error);
    expect_states(&mut events, &[ServiceState::Starting, ServiceState::Running]).await;

    // The child ends on its own after 400ms; auto-restart kicks in.
    expect_states(
        &mut events,
        &[
            ServiceState::Exited,
            ServiceState::Starting,
            ServiceState::Running,
        ],
    )
    .await;

    let response = handle.shutdown().await.expect("shutdown");
    assert!(response.success(), "shutdown failed: {:?}", response.error);
    expect_states(&mut events, &[ServiceState::Stopping, ServiceState::Stopped]).await;
}
