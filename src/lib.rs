// Client-side monitoring core for an embedded milk-tank sensor
//
// This crate owns the one piece of real state in the dashboard: a live
// streaming session against a sensor device (or a synthetic generator),
// reconciled into a bounded rolling history of validated readings. The
// presentation layer only ever sees snapshots.
//
// Architecture:
// - `source`: Trait-based system for pluggable sensor sources (WebSocket, synthetic)
// - `history`: Bounded FIFO buffer of recent readings
// - `reading`: Wire message decoding and the derived level transform
// - `signal`: Stateless trend/status classification over a snapshot
// - `reconciler`: Session lifecycle, ingest and state ownership

pub mod config;
pub mod history;
pub mod reading;
pub mod reconciler;
pub mod signal;
pub mod source;
pub mod types;

pub use config::MonitorConfig;
pub use history::HistoryBuffer;
pub use reading::{DataPoint, RawSensorMessage, SensorReading};
pub use reconciler::Reconciler;
pub use signal::{Metric, Status, Trend};
pub use source::{create_source, SensorSource, SourceConfig};
pub use types::{ConnectionState, MonitorError, MonitorEvent, MonitorResult, MonitorStats};
