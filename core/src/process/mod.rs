//! Platform-specific process spawning and signaling
//!
//! Only Unix is currently supported; children are managed as whole
//! process groups so signals reach everything a service forked.

#[cfg(unix)]
pub mod unix;
