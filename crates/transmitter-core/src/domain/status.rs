//! Connection and stream status.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff between failed connection attempts.
pub const ESTABLISH_PERIOD: Duration = Duration::from_millis(2000);

/// Poll period of the retry timer while a connection is being monitored.
pub const RETRY_PERIOD: Duration = Duration::from_millis(5000);

/// Delay used when a timer should fire on the very next loop iteration.
pub const IMMEDIATE: Duration = Duration::from_millis(1);

/// Status of one remote's connection.
///
/// ```text
/// Initializing ──► Establishing ──► Ready ──► Disconnected
///                       ▲                          │
///                       └───────── retry ──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Configured, no attempt made yet.
    #[default]
    Initializing,
    /// A connection attempt is outstanding.
    Establishing,
    /// Connected and capability negotiation complete.
    Ready,
    /// The transport failed or hung up; waiting for the retry timer.
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Initializing => "initializing",
            ConnectionStatus::Establishing => "establishing",
            ConnectionStatus::Ready => "ready",
            ConnectionStatus::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Transmission status of one surface stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StreamStatus {
    #[default]
    Initializing,
    /// Remote-side surface exists; frames are being pushed.
    Ready,
    /// The remote-side objects were lost with the connection.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_initializing() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Initializing);
        assert_eq!(StreamStatus::default(), StreamStatus::Initializing);
    }

    #[test]
    fn test_periods_match_reconnection_policy() {
        assert_eq!(ESTABLISH_PERIOD.as_millis(), 2000);
        assert_eq!(RETRY_PERIOD.as_millis(), 5000);
        assert!(IMMEDIATE < ESTABLISH_PERIOD);
    }

    #[test]
    fn test_connection_status_display_is_lowercase() {
        assert_eq!(ConnectionStatus::Disconnected.to_string(), "disconnected");
    }
}
