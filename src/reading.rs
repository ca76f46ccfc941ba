//! Reading and stream identity types for the analyzer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single decoded sensor reading.
///
/// Produced by a source connector from one inbound message and consumed
/// exactly once by the [`StreamProcessor`](crate::processor::StreamProcessor).
/// Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub machine_id: String,
    pub sensor_id: String,
    /// Timestamp of the reading (defaults to current server time if not provided)
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl SensorReading {
    pub fn new(
        machine_id: impl Into<String>,
        sensor_id: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            sensor_id: sensor_id.into(),
            timestamp: Utc::now(),
            value,
        }
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = ts;
        self
    }

    /// Stream key identifying the time series this reading belongs to.
    pub fn key(&self) -> StreamKey {
        StreamKey::new(&self.machine_id, &self.sensor_id)
    }
}

/// Identifies one logical time series to analyze.
///
/// Keyed by machine *and* sensor so that windows for the same sensor type on
/// different machines are never cross-contaminated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub machine_id: String,
    pub sensor_id: String,
}

impl StreamKey {
    pub fn new(machine_id: impl Into<String>, sensor_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            sensor_id: sensor_id.into(),
        }
    }

    /// Sink path for the raw reading: `machines.<machine_id>.<sensor_id>`.
    pub fn raw_path(&self) -> String {
        format!("machines.{}.{}", self.machine_id, self.sensor_id)
    }

    /// Sink path for the moving average:
    /// `machines.<machine_id>.<sensor_id>.<sensor_id>_moving_average`.
    pub fn moving_average_path(&self) -> String {
        format!(
            "machines.{}.{}.{}_moving_average",
            self.machine_id, self.sensor_id, self.sensor_id
        )
    }

    /// Sink path for the trend slope:
    /// `machines.<machine_id>.<sensor_id>.<sensor_id>_trend`.
    pub fn trend_path(&self) -> String {
        format!(
            "machines.{}.{}.{}_trend",
            self.machine_id, self.sensor_id, self.sensor_id
        )
    }

    /// Sink path for the outlier alarm:
    /// `machines.<machine_id>.alarms.<sensor_id>_outlier`.
    ///
    /// Alarm paths carry the machine prefix so that the same sensor type on
    /// two machines never collides on one dashboard series.
    pub fn outlier_alarm_path(&self) -> String {
        format!("machines.{}.alarms.{}_outlier", self.machine_id, self.sensor_id)
    }

    /// Sink path for the inactivity alarm:
    /// `machines.<machine_id>.alarms.inactive_<sensor_id>`.
    pub fn inactivity_alarm_path(&self) -> String {
        format!(
            "machines.{}.alarms.inactive_{}",
            self.machine_id, self.sensor_id
        )
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.machine_id, self.sensor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_reading_new() {
        let reading = SensorReading::new("m1", "cpu_usage", 42.5);
        assert_eq!(reading.machine_id, "m1");
        assert_eq!(reading.sensor_id, "cpu_usage");
        assert_eq!(reading.value, 42.5);
    }

    #[test]
    fn test_reading_with_timestamp() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
        let reading = SensorReading::new("m1", "cpu_usage", 1.0).with_timestamp(ts);
        assert_eq!(reading.timestamp, ts);
    }

    #[test]
    fn test_reading_key() {
        let reading = SensorReading::new("m1", "memory_usage", 73.0);
        assert_eq!(reading.key(), StreamKey::new("m1", "memory_usage"));
    }

    #[test]
    fn test_paths_are_deterministic() {
        let key = StreamKey::new("m1", "cpu_usage");
        assert_eq!(key.raw_path(), "machines.m1.cpu_usage");
        assert_eq!(
            key.moving_average_path(),
            "machines.m1.cpu_usage.cpu_usage_moving_average"
        );
        assert_eq!(key.trend_path(), "machines.m1.cpu_usage.cpu_usage_trend");
        assert_eq!(key.outlier_alarm_path(), "machines.m1.alarms.cpu_usage_outlier");
        assert_eq!(
            key.inactivity_alarm_path(),
            "machines.m1.alarms.inactive_cpu_usage"
        );
    }

    #[test]
    fn test_paths_do_not_collide_across_machines() {
        let a = StreamKey::new("m1", "cpu_usage");
        let b = StreamKey::new("m2", "cpu_usage");
        assert_ne!(a.raw_path(), b.raw_path());
        assert_ne!(a.moving_average_path(), b.moving_average_path());
        assert_ne!(a.outlier_alarm_path(), b.outlier_alarm_path());
        assert_ne!(a.inactivity_alarm_path(), b.inactivity_alarm_path());
    }

    #[test]
    fn test_key_display() {
        let key = StreamKey::new("m1", "cpu_usage");
        assert_eq!(key.to_string(), "m1/cpu_usage");
    }

    #[test]
    fn test_keys_differ_by_machine() {
        let a = StreamKey::new("m1", "cpu_usage");
        let b = StreamKey::new("m2", "cpu_usage");
        assert_ne!(a, b);
    }
}
