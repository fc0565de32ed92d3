// Common types for the monitoring core

use crate::reading::SensorReading;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors that can occur while running a monitoring session
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Session already running")]
    AlreadyRunning,
}

/// Connection state of the active session
///
/// Establishment is atomic from the reconciler's point of view: `start()`
/// awaits the source handshake before flipping to `Connected`, so no
/// intermediate state is modeled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Events emitted by the reconciler to a registered callback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    ConnectionChanged {
        session_id: String,
        state: ConnectionState,
        #[serde(default)]
        reason: Option<String>,
    },
    ReadingReceived {
        session_id: String,
        reading: SensorReading,
    },
    DecodeError {
        session_id: String,
        message: String,
    },
}

/// Statistics about the current monitoring session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorStats {
    pub readings_received: u64,
    pub decode_failures: u64,
    pub history_len: usize,
    pub history_capacity: usize,
    pub connected: bool,
    pub uptime_seconds: Option<f64>,
    pub last_error: Option<String>,
}
