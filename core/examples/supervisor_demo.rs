//! Drives a `sleep 10` child through a full supervisor lifecycle
//!
//! Start, restart, stop, start again, let the child die and watch the
//! auto-restart, then shut down. Run with:
//!
//! ```text
//! cargo run --example supervisor_demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;
use vigil_core::supervisor::{spawn_supervisor, SupervisorConfig, UnixProcessHost};
use vigil_core::{CommandName, Result, Service};

#[tokio::main]
async fn main() -> Result<()> {
    vigil_core::utils::init_tracing("info")?;

    let service = Service::new(vec!["sleep".to_string(), "10".to_string()])?;
    let (event_tx, mut event_rx) = mpsc::channel(64);

    let handle = spawn_supervisor(SupervisorConfig {
        service,
        host: Arc::new(UnixProcessHost::new()),
        events: event_tx,
    });

    let watcher = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event.cause {
                Some(cause) => info!("service '{}' is {} ({})", event.service_id, event.state, cause),
                None => info!("service '{}' is {}", event.service_id, event.state),
            }
        }
    });

    let script = [
        (CommandName::Start, Duration::from_secs(5)),
        (CommandName::Restart, Duration::from_secs(5)),
        (CommandName::Stop, Duration::from_secs(5)),
        (CommandName::Start, Duration::from_secs(15)),
        (CommandName::Shutdown, Duration::ZERO),
    ];

    for (command, pause) in script {
        let response = handle.request(command).await?;
        match response.error {
            None => info!("command {} succeeded", response.name),
            Some(error) => info!("command {} failed: {}", response.name, error),
        }
        tokio::time::sleep(pause).await;
    }

    watcher.await.ok();
    Ok(())
}
