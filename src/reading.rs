// Wire message decoding and the derived level transform
//
// The device sends small JSON objects over the socket:
// {
//   "temperature": 32.9,
//   "distance": 11.2,
//   "pressure": 1013.2,   // optional, richer firmware only
//   "buzzer": false       // optional
// }
//
// Payloads carry no timestamp; capture time is stamped on decode. The milk
// level is derived from the ultrasonic distance against the known container
// height and never shipped by the device.

use serde::{Deserialize, Serialize};

/// Raw message shape as sent by the device
///
/// A payload missing `temperature` or `distance` is malformed and rejected
/// by serde; the optional fields default to absent for older firmware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSensorMessage {
    pub temperature: f64,
    pub distance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buzzer: Option<bool>,
}

/// A validated point-in-time sensor reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    /// Capture time in Unix milliseconds, stamped on decode
    pub timestamp_ms: i64,

    /// Temperature in °C
    pub temperature: f64,

    /// Raw ultrasonic distance to the milk surface in cm
    pub distance: f64,

    /// Fill percentage derived from `distance`, clamped to [0, 100]
    pub milk_level: f64,

    /// Ambient pressure in hPa, if the firmware reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,

    /// Buzzer state, if the firmware reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buzzer: Option<bool>,
}

impl SensorReading {
    /// Build a reading from a decoded message, deriving the milk level
    pub fn from_raw(msg: &RawSensorMessage, container_height_cm: f64, timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            temperature: msg.temperature,
            distance: msg.distance,
            milk_level: milk_level_percent(msg.distance, container_height_cm),
            pressure: msg.pressure,
            buzzer: msg.buzzer,
        }
    }

    /// Zero-value reading returned before anything has arrived
    pub fn zero() -> Self {
        Self {
            timestamp_ms: 0,
            temperature: 0.0,
            distance: 0.0,
            milk_level: 0.0,
            pressure: None,
            buzzer: None,
        }
    }
}

impl Default for SensorReading {
    fn default() -> Self {
        Self::zero()
    }
}

/// A single chartable point extracted from a reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp_ms: i64,
    pub value: f64,
}

/// Fill percentage from a surface distance measurement
///
/// `((height - distance) / height) * 100`, clamped to [0, 100] and rounded
/// to one decimal place. A distance beyond the container bottom reads 0%,
/// a (nonsensical) negative distance reads 100%.
pub fn milk_level_percent(distance_cm: f64, container_height_cm: f64) -> f64 {
    if container_height_cm <= 0.0 {
        return 0.0;
    }
    let pct = ((container_height_cm - distance_cm) / container_height_cm) * 100.0;
    (pct.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_known_values() {
        assert_eq!(milk_level_percent(10.0, 40.0), 75.0);
        assert_eq!(milk_level_percent(40.0, 40.0), 0.0);
        assert_eq!(milk_level_percent(0.0, 40.0), 100.0);
    }

    #[test]
    fn test_level_clamped() {
        // Distance past the container bottom
        assert_eq!(milk_level_percent(55.0, 40.0), 0.0);
        // Negative distance (sensor glitch)
        assert_eq!(milk_level_percent(-3.0, 40.0), 100.0);
    }

    #[test]
    fn test_level_rounded_to_one_decimal() {
        // (40 - 27.7) / 40 * 100 = 30.75 -> 30.8
        assert_eq!(milk_level_percent(27.7, 40.0), 30.8);
    }

    #[test]
    fn test_level_in_range_for_any_finite_distance() {
        for d in [-1e9, -40.0, 0.0, 13.37, 40.0, 41.0, 1e9] {
            let level = milk_level_percent(d, 40.0);
            assert!((0.0..=100.0).contains(&level), "level {} for d {}", level, d);
        }
    }

    #[test]
    fn test_from_raw_derives_level() {
        let msg = RawSensorMessage {
            temperature: 33.1,
            distance: 10.0,
            pressure: Some(1013.2),
            buzzer: Some(false),
        };
        let reading = SensorReading::from_raw(&msg, 40.0, 1234);
        assert_eq!(reading.timestamp_ms, 1234);
        assert_eq!(reading.temperature, 33.1);
        assert_eq!(reading.milk_level, 75.0);
        assert_eq!(reading.pressure, Some(1013.2));
    }

    #[test]
    fn test_decode_requires_primary_fields() {
        assert!(serde_json::from_str::<RawSensorMessage>(r#"{"temperature": 30.0}"#).is_err());
        assert!(serde_json::from_str::<RawSensorMessage>(r#"{"distance": 10.0}"#).is_err());
        let msg: RawSensorMessage =
            serde_json::from_str(r#"{"temperature": 30.0, "distance": 10.0}"#).unwrap();
        assert!(msg.pressure.is_none());
        assert!(msg.buzzer.is_none());
    }
}
