//! Event type emitted by a supervisor on every state change
//!
//! Events are designed to be serializable and can be:
//! - Logged to structured log files
//! - Sent to monitoring systems
//! - Used to multiplex several supervisors onto one consumer (each
//!   event carries the identifier of the service it belongs to)

use crate::service::{ExitCause, ServiceState};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// A state change observed on a supervised service
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEvent {
    /// Identifier of the service the event belongs to
    pub service_id: String,
    /// The state the service just entered
    pub state: ServiceState,
    /// Why the service exited, when `state` is `exited` or `backoff`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<ExitCause>,
    /// Event timestamp in RFC3339 format
    pub timestamp: String,
}

impl ServiceEvent {
    /// Create an event for a state change, stamped with the current time.
    pub fn new(service_id: impl Into<String>, state: ServiceState) -> Self {
        Self {
            service_id: service_id.into(),
            state,
            cause: None,
            timestamp: Self::current_timestamp(),
        }
    }

    /// Attach the exit cause that produced this state change.
    #[must_use]
    pub fn with_cause(mut self, cause: ExitCause) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Create a current timestamp string in RFC3339 format
    #[must_use]
    pub fn current_timestamp() -> String {
        humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
    }
}
