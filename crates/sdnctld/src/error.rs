//! Error types for sdnctld

use sdn_policy::PolicyError;
use thiserror::Error;

/// Controller daemon errors
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Configuration file could not be parsed or is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Topology or policy error
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Malformed line in an event stream
    #[error("Event error at line {line}: {message}")]
    Event { line: usize, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    pub fn event(line: usize, message: impl Into<String>) -> Self {
        Self::Event {
            line,
            message: message.into(),
        }
    }
}

/// Result type for sdnctld operations
pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaemonError::Configuration("channel_capacity must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: channel_capacity must be > 0"
        );
    }

    #[test]
    fn test_error_event() {
        let err = DaemonError::event(3, "unknown event kind");
        assert_eq!(err.to_string(), "Event error at line 3: unknown event kind");
    }

    #[test]
    fn test_error_from_policy() {
        let err: DaemonError = PolicyError::UnknownSwitch(99).into();
        assert_eq!(err.to_string(), "Policy error: unknown switch: dpid 99");
    }
}
