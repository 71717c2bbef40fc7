use std::io::Read;
use std::time::Duration;

use frame_scheduler::{DEFAULT_INTERVAL, FrameSchedulerConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Ticks on refresh boundaries.
    Throttled,
    /// Ticks as soon as the previous frame finished.
    Unthrottled,
    /// Ticks when the embedder forwards a hardware vsync.
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub clock_mode: ClockMode,
    #[serde(rename = "refresh_interval_us", with = "duration_micros")]
    pub refresh_interval: Duration,
    pub max_pending_swaps: u32,
    /// Vsync signals the external clock buffers between polls.
    pub external_signal_capacity: usize,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            clock_mode: ClockMode::Throttled,
            refresh_interval: DEFAULT_INTERVAL,
            max_pending_swaps: FrameSchedulerConfig::default().max_pending_swaps,
            external_signal_capacity: 8,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("parse display settings failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid display setting `{field}`: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

impl DisplaySettings {
    /// Parses settings; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_reader(reader)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_pending_swaps == 0 {
            return Err(SettingsError::InvalidValue {
                field: "max_pending_swaps",
                reason: "must be at least 1",
            });
        }
        if self.refresh_interval.is_zero() {
            return Err(SettingsError::InvalidValue {
                field: "refresh_interval_us",
                reason: "must be non-zero",
            });
        }
        if self.clock_mode == ClockMode::External && self.external_signal_capacity == 0 {
            return Err(SettingsError::InvalidValue {
                field: "external_signal_capacity",
                reason: "must be non-zero for an external clock",
            });
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> FrameSchedulerConfig {
        FrameSchedulerConfig {
            max_pending_swaps: self.max_pending_swaps,
        }
    }
}

mod duration_micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        serializer.serialize_u64(micros)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_micros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_keep_defaults() {
        let settings = DisplaySettings::from_json(r#"{ "clock_mode": "unthrottled" }"#)
            .expect("valid settings");
        assert_eq!(settings.clock_mode, ClockMode::Unthrottled);
        assert_eq!(settings.refresh_interval, DEFAULT_INTERVAL);
        assert_eq!(settings.max_pending_swaps, 2);
    }

    #[test]
    fn refresh_interval_is_read_in_microseconds() {
        let settings = DisplaySettings::from_reader(
            br#"{ "refresh_interval_us": 8333, "max_pending_swaps": 1 }"#.as_slice(),
        )
        .expect("valid settings");
        assert_eq!(settings.refresh_interval, Duration::from_micros(8333));
        assert_eq!(settings.scheduler_config().max_pending_swaps, 1);

        let written = settings.to_json().expect("serializable");
        assert_eq!(DisplaySettings::from_json(&written).expect("round trip"), settings);
    }

    #[test]
    fn zero_values_are_rejected() {
        let error = DisplaySettings::from_json(r#"{ "max_pending_swaps": 0 }"#)
            .expect_err("zero swaps");
        assert!(matches!(
            error,
            SettingsError::InvalidValue {
                field: "max_pending_swaps",
                ..
            }
        ));
        assert!(DisplaySettings::from_json(r#"{ "refresh_interval_us": 0 }"#).is_err());
        assert!(
            DisplaySettings::from_json(
                r#"{ "clock_mode": "external", "external_signal_capacity": 0 }"#
            )
            .is_err()
        );
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let error = DisplaySettings::from_json("{ clock_mode").expect_err("broken json");
        assert!(matches!(error, SettingsError::Json(_)));
        assert!(DisplaySettings::from_json(r#"{ "clock_mode": "sometimes" }"#).is_err());
    }
}
