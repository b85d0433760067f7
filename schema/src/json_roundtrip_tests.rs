//! JSON round-trip tests for schema types
//!
//! These tests verify that all schema types can be properly serialized to
//! JSON and deserialized back to the original values, and that the wire
//! spellings of states and commands match the documented strings.

use crate::command::*;
use crate::events::*;
use crate::service::*;
use std::path::PathBuf;

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to test JSON round-trip for any serializable type
    fn test_json_roundtrip<T>(original: &T)
    where
        T: serde::Serialize + serde::de::DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let json = serde_json::to_string(original).expect("Failed to serialize to JSON");
        let deserialized: T = serde_json::from_str(&json).expect("Failed to deserialize from JSON");
        assert_eq!(*original, deserialized, "Round-trip failed for JSON: {}", json);
    }

    #[test]
    fn test_service_state_json_roundtrip() {
        let states = [
            ServiceState::Stopped,
            ServiceState::Starting,
            ServiceState::Running,
            ServiceState::Stopping,
            ServiceState::Exited,
            ServiceState::Backoff,
            ServiceState::Fatal,
        ];

        for state in &states {
            test_json_roundtrip(state);
        }
    }

    #[test]
    fn test_service_state_json_spelling_matches_wire_string() {
        let states = [
            ServiceState::Stopped,
            ServiceState::Starting,
            ServiceState::Running,
            ServiceState::Stopping,
            ServiceState::Exited,
            ServiceState::Backoff,
            ServiceState::Fatal,
        ];

        for state in &states {
            let json = serde_json::to_string(state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }

    #[test]
    fn test_command_name_json_roundtrip() {
        let commands = [
            CommandName::Start,
            CommandName::Stop,
            CommandName::Restart,
            CommandName::Shutdown,
        ];

        for command in &commands {
            test_json_roundtrip(command);
            let json = serde_json::to_string(command).unwrap();
            assert_eq!(json, format!("\"{}\"", command.as_str()));
        }
    }

    #[test]
    fn test_output_sink_json_roundtrip() {
        test_json_roundtrip(&OutputSink::Discard);
        test_json_roundtrip(&OutputSink::Inherit);
        test_json_roundtrip(&OutputSink::Append {
            path: PathBuf::from("/var/log/service.out"),
        });
    }

    #[test]
    fn test_process_exit_json_roundtrip() {
        test_json_roundtrip(&ProcessExit {
            pid: 1234,
            exit_code: Some(0),
            signal: None,
        });
        test_json_roundtrip(&ProcessExit {
            pid: 1234,
            exit_code: None,
            signal: Some(9),
        });
    }

    #[test]
    fn test_exit_cause_json_roundtrip() {
        test_json_roundtrip(&ExitCause::launch_failed("no such file or directory"));
        test_json_roundtrip(&ExitCause::exited(ProcessExit {
            pid: 1234,
            exit_code: Some(1),
            signal: None,
        }));
        test_json_roundtrip(&ExitCause::premature(ProcessExit {
            pid: 1234,
            exit_code: None,
            signal: Some(15),
        }));
    }

    #[test]
    fn test_service_event_json_roundtrip() {
        test_json_roundtrip(&ServiceEvent::new("svc", ServiceState::Starting));
        test_json_roundtrip(
            &ServiceEvent::new("svc", ServiceState::Backoff).with_cause(ExitCause::premature(
                ProcessExit {
                    pid: 77,
                    exit_code: Some(2),
                    signal: None,
                },
            )),
        );
    }

    #[test]
    fn test_service_event_omits_empty_cause() {
        let event = ServiceEvent::new("svc", ServiceState::Running);
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("cause"));
    }
}
