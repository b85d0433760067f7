//! Core functionality for the vigil supervisor
//!
//! This crate supervises exactly one external process per supervisor:
//! it launches the configured command line, watches its lifetime, and
//! exposes a controllable state machine driven by `start`, `stop`,
//! `restart`, and `shutdown` commands.

pub mod error;
#[cfg(unix)]
pub mod process;
pub mod supervisor;


// Re-export schema types for convenience
pub use schema::*;

pub use error::{Result, ServiceError};
pub use supervisor::{
    spawn_supervisor, Command, Response, Service, ServiceHandle, ServiceStatus, ServiceSupervisor,
    SupervisorConfig,
};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::ServiceError::Init(e.to_string()))?;

        info!("tracing initialized with level: {}", level);
        Ok(())
    }
}
