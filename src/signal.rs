// Stateless derived signals over a history snapshot
//
// Trend and status are recomputed from the snapshot on every call rather
// than cached on the reconciler; staleness is impossible by construction.

use crate::reading::{DataPoint, SensorReading};
use serde::{Deserialize, Serialize};

/// Number of buffered values the trend baseline averages over
pub const TREND_WINDOW: usize = 5;

/// The metrics this dashboard knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    MilkLevel,
    Pressure,
    Buzzer,
}

impl Metric {
    pub fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::MilkLevel => "%",
            Self::Pressure => "hPa",
            Self::Buzzer => "",
        }
    }

    /// Dead band around the trend baseline. Temperature moves in small
    /// steps so it gets a tighter epsilon than level or pressure.
    pub fn trend_epsilon(self) -> f64 {
        match self {
            Self::Temperature => 0.1,
            _ => 1.0,
        }
    }

    /// Extract this metric's value from a reading, if present
    pub fn value_of(self, reading: &SensorReading) -> Option<f64> {
        match self {
            Self::Temperature => Some(reading.temperature),
            Self::MilkLevel => Some(reading.milk_level),
            Self::Pressure => reading.pressure,
            Self::Buzzer => reading.buzzer.map(|b| if b { 1.0 } else { 0.0 }),
        }
    }

    /// Classify a value against this metric's fixed thresholds
    ///
    /// Metrics without thresholds (pressure, buzzer) are always normal.
    pub fn status_of(self, value: f64) -> Status {
        match self {
            Self::Temperature => {
                if value > 38.0 {
                    Status::Critical
                } else if value > 35.0 {
                    Status::Warning
                } else {
                    Status::Normal
                }
            }
            Self::MilkLevel => {
                if value < 10.0 {
                    Status::Critical
                } else if value < 30.0 {
                    Status::Warning
                } else {
                    Status::Normal
                }
            }
            Self::Pressure | Self::Buzzer => Status::Normal,
        }
    }
}

/// Direction of a metric relative to its recent average
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "↑"),
            Self::Down => write!(f, "↓"),
            Self::Stable => write!(f, "→"),
        }
    }
}

/// Severity classification against fixed per-metric thresholds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Compare a latest value against the mean of the last `TREND_WINDOW`
/// buffered values. Fewer than `TREND_WINDOW` buffered values, or a move
/// within the metric's epsilon, reads as stable.
pub fn trend(metric: Metric, latest: f64, buffered: &[f64]) -> Trend {
    if buffered.len() < TREND_WINDOW {
        return Trend::Stable;
    }
    let window = &buffered[buffered.len() - TREND_WINDOW..];
    let mean = window.iter().sum::<f64>() / TREND_WINDOW as f64;
    let epsilon = metric.trend_epsilon();

    if latest > mean + epsilon {
        Trend::Up
    } else if latest < mean - epsilon {
        Trend::Down
    } else {
        Trend::Stable
    }
}

/// Trend of a metric over a snapshot: newest reading against the readings
/// before it.
pub fn trend_for(snapshot: &[SensorReading], metric: Metric) -> Trend {
    let values: Vec<f64> = snapshot
        .iter()
        .filter_map(|r| metric.value_of(r))
        .collect();
    match values.split_last() {
        Some((latest, earlier)) => trend(metric, *latest, earlier),
        None => Trend::Stable,
    }
}

/// Status of a metric's newest value in a snapshot
pub fn status_for(snapshot: &[SensorReading], metric: Metric) -> Status {
    snapshot
        .iter()
        .rev()
        .find_map(|r| metric.value_of(r))
        .map(|v| metric.status_of(v))
        .unwrap_or_default()
}

/// Extract one metric's chartable series from a snapshot
pub fn series(snapshot: &[SensorReading], metric: Metric) -> Vec<DataPoint> {
    snapshot
        .iter()
        .filter_map(|r| {
            metric.value_of(r).map(|value| DataPoint {
                timestamp_ms: r.timestamp_ms,
                value,
            })
        })
        .collect()
}

/// Client-side time filter for charting: points at or after `since_ms`
pub fn window_since(points: &[DataPoint], since_ms: i64) -> Vec<DataPoint> {
    points
        .iter()
        .copied()
        .filter(|p| p.timestamp_ms >= since_ms)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_up_past_epsilon() {
        let buffered = [10.0, 10.0, 10.0, 10.0, 10.0];
        assert_eq!(trend(Metric::Temperature, 10.5, &buffered), Trend::Up);
    }

    #[test]
    fn test_trend_stable_within_epsilon() {
        let buffered = [10.0, 10.0, 10.0, 10.0, 10.0];
        assert_eq!(trend(Metric::Temperature, 10.05, &buffered), Trend::Stable);
    }

    #[test]
    fn test_trend_down() {
        let buffered = [10.0, 10.0, 10.0, 10.0, 10.0];
        assert_eq!(trend(Metric::Temperature, 9.0, &buffered), Trend::Down);
    }

    #[test]
    fn test_trend_needs_full_window() {
        let buffered = [10.0, 10.0, 10.0, 10.0];
        assert_eq!(trend(Metric::Temperature, 50.0, &buffered), Trend::Stable);
    }

    #[test]
    fn test_trend_epsilon_wider_for_level() {
        let buffered = [70.0, 70.0, 70.0, 70.0, 70.0];
        // 0.5 above the mean is within the level dead band of 1.0
        assert_eq!(trend(Metric::MilkLevel, 70.5, &buffered), Trend::Stable);
        assert_eq!(trend(Metric::MilkLevel, 71.5, &buffered), Trend::Up);
    }

    #[test]
    fn test_temperature_status_thresholds() {
        assert_eq!(Metric::Temperature.status_of(39.0), Status::Critical);
        assert_eq!(Metric::Temperature.status_of(36.0), Status::Warning);
        assert_eq!(Metric::Temperature.status_of(20.0), Status::Normal);
    }

    #[test]
    fn test_level_status_thresholds() {
        assert_eq!(Metric::MilkLevel.status_of(5.0), Status::Critical);
        assert_eq!(Metric::MilkLevel.status_of(25.0), Status::Warning);
        assert_eq!(Metric::MilkLevel.status_of(80.0), Status::Normal);
    }

    #[test]
    fn test_unthresholded_metrics_always_normal() {
        assert_eq!(Metric::Pressure.status_of(2000.0), Status::Normal);
        assert_eq!(Metric::Buzzer.status_of(1.0), Status::Normal);
    }

    #[test]
    fn test_trend_for_snapshot() {
        let mut snapshot: Vec<SensorReading> = (0..5)
            .map(|n| SensorReading {
                timestamp_ms: n,
                temperature: 10.0,
                ..SensorReading::zero()
            })
            .collect();
        snapshot.push(SensorReading {
            timestamp_ms: 5,
            temperature: 10.5,
            ..SensorReading::zero()
        });
        assert_eq!(trend_for(&snapshot, Metric::Temperature), Trend::Up);
        assert_eq!(trend_for(&[], Metric::Temperature), Trend::Stable);
    }

    #[test]
    fn test_series_skips_absent_metrics() {
        let with_pressure = SensorReading {
            timestamp_ms: 1,
            pressure: Some(1013.0),
            ..SensorReading::zero()
        };
        let without = SensorReading {
            timestamp_ms: 2,
            ..SensorReading::zero()
        };
        let points = series(&[with_pressure, without], Metric::Pressure);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 1013.0);
    }

    #[test]
    fn test_window_since() {
        let points = [
            DataPoint { timestamp_ms: 100, value: 1.0 },
            DataPoint { timestamp_ms: 200, value: 2.0 },
            DataPoint { timestamp_ms: 300, value: 3.0 },
        ];
        let filtered = window_since(&points, 200);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].timestamp_ms, 200);
    }
}
