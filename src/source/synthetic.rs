// Synthetic sensor source
//
// Generates device-shaped payloads at a fixed cadence, useful for:
// - Demoing the dashboard without the device on the network
// - Development and testing of the ingest path
//
// The walk mimics the real tank: temperature drifts gently around 32.8 °C,
// the level drains slowly as the distance to the surface grows, pressure
// hovers near 1013 hPa, and the buzzer fires occasionally.

use super::SensorSource;
use crate::reading::RawSensorMessage;
use crate::types::{MonitorError, MonitorResult};
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

const BASE_TEMPERATURE: f64 = 32.8;
const BASE_PRESSURE: f64 = 1013.0;
const BUZZER_PROBABILITY: f64 = 0.05;

pub struct SyntheticSensorSource {
    interval_ms: u64,
    container_height_cm: f64,
    temperature: f64,
    distance: f64,
    pressure: f64,
    is_connected: bool,
}

impl SyntheticSensorSource {
    pub fn new(interval_ms: u64, container_height_cm: f64) -> Self {
        Self {
            interval_ms,
            container_height_cm,
            temperature: BASE_TEMPERATURE,
            // Start around 72% full
            distance: container_height_cm * 0.28,
            pressure: BASE_PRESSURE,
            is_connected: false,
        }
    }

    fn next_message(&mut self, rng: &mut StdRng) -> RawSensorMessage {
        // Small random fluctuation around the current values
        self.temperature =
            (self.temperature + (rng.random::<f64>() - 0.5) * 0.2).clamp(0.0, 50.0);
        self.pressure = (self.pressure + (rng.random::<f64>() - 0.5) * 0.5).clamp(950.0, 1050.0);

        // The tank only drains: the surface distance creeps up over time
        self.distance =
            (self.distance + rng.random::<f64>() * 0.2).clamp(0.0, self.container_height_cm);

        RawSensorMessage {
            temperature: self.temperature,
            distance: self.distance,
            pressure: Some(self.pressure),
            buzzer: Some(rng.random_bool(BUZZER_PROBABILITY)),
        }
    }
}

#[async_trait]
impl SensorSource for SyntheticSensorSource {
    async fn connect(&mut self) -> MonitorResult<()> {
        log::info!(
            "Synthetic source ready ({} ms cadence)",
            self.interval_ms
        );
        self.is_connected = true;
        Ok(())
    }

    async fn run(&mut self, sender: mpsc::Sender<String>) -> MonitorResult<()> {
        if !self.is_connected {
            self.connect().await?;
        }

        let mut rng = StdRng::from_os_rng();

        loop {
            let msg = self.next_message(&mut rng);
            let payload = serde_json::to_string(&msg)
                .map_err(|e| MonitorError::Parse(e.to_string()))?;

            if sender.send(payload).await.is_err() {
                log::warn!("Payload receiver closed, stopping synthetic source");
                self.is_connected = false;
                return Ok(());
            }

            sleep(Duration::from_millis(self.interval_ms)).await;
        }
    }

    async fn stop(&mut self) -> MonitorResult<()> {
        log::info!("Stopping synthetic source");
        self.is_connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected
    }

    fn describe(&self) -> String {
        format!("synthetic ({} ms cadence)", self.interval_ms)
    }
}
