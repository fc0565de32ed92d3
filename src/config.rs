// Session configuration
//
// All values are compiled-in defaults matching the deployed device; nothing
// is read from disk. The binary overrides them from CLI flags.

use crate::source::SourceConfig;
use crate::types::{MonitorError, MonitorResult};
use serde::{Deserialize, Serialize};

/// WebSocket endpoint of the sensor device on the local network
pub const DEFAULT_ENDPOINT: &str = "ws://192.168.48.231:81";

/// Number of readings kept for charting
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Height of the milk container in cm, used by the level transform
pub const DEFAULT_CONTAINER_HEIGHT_CM: f64 = 40.0;

/// Cadence of the synthetic generator
pub const DEFAULT_SYNTHETIC_INTERVAL_MS: u64 = 1000;

/// Configuration for a monitoring session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub session_id: String,
    pub source: SourceConfig,
    pub history_capacity: usize,
    pub container_height_cm: f64,
    /// Capacity of the source -> reconciler channel
    pub channel_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            source: SourceConfig::WebSocket {
                url: DEFAULT_ENDPOINT.to_string(),
            },
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            container_height_cm: DEFAULT_CONTAINER_HEIGHT_CM,
            channel_capacity: 100,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> MonitorResult<()> {
        if self.history_capacity == 0 {
            return Err(MonitorError::InvalidConfig(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.container_height_cm <= 0.0 {
            return Err(MonitorError::InvalidConfig(format!(
                "container_height_cm must be positive, got {}",
                self.container_height_cm
            )));
        }
        if self.channel_capacity == 0 {
            return Err(MonitorError::InvalidConfig(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
