//! Wire-level command identifiers accepted by a supervisor
//!
//! The spellings here are the strings a caller embeds in a command and
//! sees echoed back in the response: `start`, `stop`, `restart`,
//! `shutdown`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of a supervisor command
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum CommandName {
    /// Begin a start attempt
    Start,
    /// Signal the child and wait for it to stop
    Stop,
    /// Stop, then start again
    Restart,
    /// Stop if needed, then terminate the supervisor loop
    Shutdown,
}

impl CommandName {
    /// Wire spelling of the command.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CommandName::Start => "start",
            CommandName::Stop => "stop",
            CommandName::Restart => "restart",
            CommandName::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized command string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown command '{}'", self.0)
    }
}

impl std::error::Error for UnknownCommand {}

impl FromStr for CommandName {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(CommandName::Start),
            "stop" => Ok(CommandName::Stop),
            "restart" => Ok(CommandName::Restart),
            "shutdown" => Ok(CommandName::Shutdown),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}
