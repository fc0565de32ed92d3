// Pluggable sensor sources
//
// Sources deliver raw text payloads through an async channel; decoding and
// validation live in the reconciler so the wire format is handled in exactly
// one place. New source types are added by:
// 1. Implementing the SensorSource trait
// 2. Adding a variant to SourceConfig
// 3. Registering in the factory function
//
// Current implementations:
// - WebSocket: live connection to the device
// - Synthetic: fixed-cadence generated data for demos and development

mod synthetic;
mod websocket;

use crate::types::MonitorResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use synthetic::SyntheticSensorSource;
pub use websocket::WebSocketSensorSource;

/// Configuration for the available source types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Live WebSocket connection to the device
    WebSocket { url: String },

    /// Locally generated readings at a fixed cadence
    Synthetic { interval_ms: u64 },
}

/// Trait for all sensor sources
///
/// `run` sends raw payloads until the connection ends (close, error, or the
/// receiver going away) and only then returns; the caller decides what a
/// completed run means for session state.
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Establish the connection to the source
    async fn connect(&mut self) -> MonitorResult<()>;

    /// Stream raw payloads into the channel until the connection ends
    async fn run(&mut self, sender: mpsc::Sender<String>) -> MonitorResult<()>;

    /// Close the connection
    async fn stop(&mut self) -> MonitorResult<()>;

    /// Whether the source currently holds a connection
    fn is_connected(&self) -> bool;

    /// Human-readable description for log lines
    fn describe(&self) -> String;
}

/// Create a source from configuration
pub fn create_source(
    config: &SourceConfig,
    container_height_cm: f64,
) -> Box<dyn SensorSource> {
    match config {
        SourceConfig::WebSocket { url } => Box::new(WebSocketSensorSource::new(url.clone())),
        SourceConfig::Synthetic { interval_ms } => Box::new(SyntheticSensorSource::new(
            *interval_ms,
            container_height_cm,
        )),
    }
}
