//! Collector configuration.

use crate::error::{CollectorError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`Collector`](crate::Collector).
///
/// Read-only once handed to the collector. Durations serialize as seconds,
/// with a fractional part only when one is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Serial device path (e.g. "/dev/ttyUSB0")
    pub device: String,
    /// Optional display name prefixed to channel names
    #[serde(default)]
    pub name: Option<String>,
    /// Target period between the starts of consecutive cycles
    #[serde(default = "default_measure_interval", with = "duration_secs")]
    pub measure_interval: Duration,
    /// Time the sensor is given to stabilise after waking; zero keeps it awake
    #[serde(default = "default_warmup_delay", with = "duration_secs")]
    pub warmup_delay: Duration,
    /// Raw samples averaged per cycle
    #[serde(default = "default_number_of_measurements")]
    pub number_of_measurements: u32,
}

fn default_measure_interval() -> Duration {
    crate::DEFAULT_MEASURE_INTERVAL
}

fn default_warmup_delay() -> Duration {
    crate::DEFAULT_WARMUP_DELAY
}

fn default_number_of_measurements() -> u32 {
    crate::DEFAULT_NUMBER_OF_MEASUREMENTS
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            name: None,
            measure_interval: default_measure_interval(),
            warmup_delay: default_warmup_delay(),
            number_of_measurements: default_number_of_measurements(),
        }
    }
}

impl CollectorConfig {
    /// Create a configuration for the given device with default timings.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Set the measure interval.
    pub fn with_measure_interval(mut self, interval: Duration) -> Self {
        self.measure_interval = interval;
        self
    }

    /// Set the warm-up delay.
    pub fn with_warmup_delay(mut self, delay: Duration) -> Self {
        self.warmup_delay = delay;
        self
    }

    /// Set the number of raw samples per cycle.
    pub fn with_number_of_measurements(mut self, count: u32) -> Self {
        self.number_of_measurements = count;
        self
    }

    /// Whether the sensor is powered down between cycles.
    pub fn sleep_mode(&self) -> bool {
        !self.warmup_delay.is_zero()
    }

    /// Check the invariants the collector relies on.
    pub fn validate(&self) -> Result<()> {
        if self.number_of_measurements == 0 {
            return Err(CollectorError::config_error(
                "number_of_measurements must be at least 1",
            ));
        }
        if self.device.trim().is_empty() {
            return Err(CollectorError::config_error("device path must not be empty"));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if value.subsec_nanos() == 0 {
            serializer.serialize_u64(value.as_secs())
        } else {
            serializer.serialize_f64(value.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| de::Error::custom(format!("invalid duration {}: {}", secs, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::new("/dev/ttyAMA0");
        assert_eq!(config.device, "/dev/ttyAMA0");
        assert_eq!(config.measure_interval, Duration::from_secs(60));
        assert_eq!(config.warmup_delay, Duration::from_secs(15));
        assert_eq!(config.number_of_measurements, 5);
        assert!(config.sleep_mode());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_warmup_disables_sleep_mode() {
        let config = CollectorConfig::default().with_warmup_delay(Duration::ZERO);
        assert!(!config.sleep_mode());
    }

    #[test]
    fn test_rejects_zero_measurements() {
        let config = CollectorConfig::default().with_number_of_measurements(0);
        assert!(matches!(config.validate(), Err(CollectorError::Config(_))));
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let config: CollectorConfig =
            serde_json::from_str(r#"{"device": "/dev/ttyUSB1", "warmup_delay": 0}"#).unwrap();
        assert_eq!(config.device, "/dev/ttyUSB1");
        assert_eq!(config.name, None);
        assert_eq!(config.measure_interval, Duration::from_secs(60));
        assert_eq!(config.warmup_delay, Duration::ZERO);
        assert_eq!(config.number_of_measurements, 5);
    }

    #[test]
    fn test_serializes_durations_as_seconds() {
        let config = CollectorConfig::new("/dev/ttyUSB0")
            .with_measure_interval(Duration::from_secs(120))
            .with_name(Some("Attic".to_string()));
        let json: serde_json::Value = serde_json::to_value(&config).unwrap();
        assert_eq!(json["measure_interval"], 120);
        assert_eq!(json["warmup_delay"], 15);
        assert_eq!(json["name"], "Attic");
    }

    #[test]
    fn test_fractional_durations_survive_serialization() {
        let config = CollectorConfig::new("/dev/ttyUSB0")
            .with_measure_interval(Duration::from_millis(1_500))
            .with_warmup_delay(Duration::from_millis(250));
        let json = serde_json::to_string(&config).unwrap();
        let restored: CollectorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.measure_interval, Duration::from_millis(1_500));
        assert_eq!(restored.warmup_delay, Duration::from_millis(250));
        assert_eq!(restored, config);
    }

    #[test]
    fn test_rejects_negative_duration() {
        let result: std::result::Result<CollectorConfig, _> =
            serde_json::from_str(r#"{"device": "/dev/ttyUSB0", "warmup_delay": -1}"#);
        assert!(result.is_err());
    }
}
