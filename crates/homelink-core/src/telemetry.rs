//! Telemetry sample types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Locally attached sensor kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Degrees Celsius
    Temperature,
    /// Relative humidity in percent
    Humidity,
    /// Digital gas detector (0 = clear, 1 = detected)
    Gas,
    /// Digital light sensor (0 = dark, 1 = light)
    Light,
}

impl SensorKind {
    pub const ALL: [SensorKind; 4] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::Gas,
        SensorKind::Light,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Gas => "gas",
            Self::Light => "light",
        }
    }

    /// Range the sensor can physically report; anything outside is a bad read
    pub fn physical_bounds(self) -> (f64, f64) {
        match self {
            Self::Temperature => (-40.0, 80.0),
            Self::Humidity => (0.0, 100.0),
            Self::Gas | Self::Light => (0.0, 1.0),
        }
    }

    /// Range the simulated source stays within
    pub fn plausible_range(self) -> (f64, f64) {
        match self {
            Self::Temperature => (18.0, 28.0),
            Self::Humidity => (30.0, 60.0),
            Self::Gas | Self::Light => (0.0, 1.0),
        }
    }

    /// Whether the sensor reports a 0/1 level rather than a measurement
    pub fn is_digital(self) -> bool {
        matches!(self, Self::Gas | Self::Light)
    }

    pub fn within_bounds(self, value: f64) -> bool {
        let (min, max) = self.physical_bounds();
        value.is_finite() && value >= min && value <= max
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("Unknown sensor kind: {0}")]
pub struct UnknownSensorKind(pub String);

impl FromStr for SensorKind {
    type Err = UnknownSensorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" | "temp" => Ok(Self::Temperature),
            "humidity" => Ok(Self::Humidity),
            "gas" => Ok(Self::Gas),
            "light" => Ok(Self::Light),
            other => Err(UnknownSensorKind(other.to_string())),
        }
    }
}

/// Where a sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleSource {
    Hardware,
    Simulated,
}

/// One published sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub sensor_kind: SensorKind,
    pub raw_value: f64,
    /// `raw_value` plus the configured offset for the kind
    pub calibrated_value: f64,
    pub source: SampleSource,
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySample {
    pub fn new(sensor_kind: SensorKind, raw_value: f64, offset: f64, source: SampleSource) -> Self {
        Self {
            sensor_kind,
            raw_value,
            calibrated_value: raw_value + offset,
            source,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_bounds() {
        assert!(SensorKind::Temperature.within_bounds(-40.0));
        assert!(SensorKind::Temperature.within_bounds(80.0));
        assert!(!SensorKind::Temperature.within_bounds(85.0));
        assert!(!SensorKind::Humidity.within_bounds(-0.1));
        assert!(!SensorKind::Gas.within_bounds(2.0));
        assert!(!SensorKind::Light.within_bounds(f64::NAN));
    }

    #[test]
    fn test_plausible_range_inside_physical_bounds() {
        for kind in SensorKind::ALL {
            let (lo, hi) = kind.plausible_range();
            assert!(kind.within_bounds(lo) && kind.within_bounds(hi), "{kind}");
        }
    }

    #[test]
    fn test_calibration_applied() {
        let sample = TelemetrySample::new(SensorKind::Temperature, 21.5, -0.5, SampleSource::Hardware);
        assert_eq!(sample.calibrated_value, 21.0);
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("Temperature".parse::<SensorKind>(), Ok(SensorKind::Temperature));
        assert!("pressure".parse::<SensorKind>().is_err());
    }
}
