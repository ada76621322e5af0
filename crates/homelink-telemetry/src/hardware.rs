//! Sysfs-backed sensors

use async_trait::async_trait;
use homelink_core::{SampleSource, SensorKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::source::{SensorError, SensorSource};

/// Digital sensor wired to a sysfs GPIO line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioInput {
    pub pin: u32,
    /// Module pulls the line low when it triggers (MQ-2 and LDR boards do)
    #[serde(default = "default_active_low")]
    pub active_low: bool,
}

fn default_active_low() -> bool {
    true
}

/// Reads the DHT22 through the kernel IIO driver and digital sensors through
/// sysfs GPIO value files
#[derive(Debug, Clone)]
pub struct HardwareSensors {
    /// IIO device directory, e.g. `/sys/bus/iio/devices/iio:device0`
    iio_dir: PathBuf,
    /// GPIO class directory, normally `/sys/class/gpio`
    gpio_dir: PathBuf,
    gas: Option<GpioInput>,
    light: Option<GpioInput>,
}

impl HardwareSensors {
    pub fn new(iio_dir: impl Into<PathBuf>, gpio_dir: impl Into<PathBuf>) -> Self {
        Self {
            iio_dir: iio_dir.into(),
            gpio_dir: gpio_dir.into(),
            gas: None,
            light: None,
        }
    }

    pub fn with_gas(mut self, input: Option<GpioInput>) -> Self {
        self.gas = input;
        self
    }

    pub fn with_light(mut self, input: Option<GpioInput>) -> Self {
        self.light = input;
        self
    }

    /// IIO channels report milli-units
    async fn read_iio(&self, channel: &str) -> Result<f64, SensorError> {
        let path = self.iio_dir.join(channel);
        let milli = read_number(&path).await?;
        Ok(milli / 1000.0)
    }

    async fn read_gpio(&self, kind: SensorKind, input: Option<GpioInput>) -> Result<f64, SensorError> {
        let input = input.ok_or(SensorError::NotConfigured(kind))?;
        let path = self.gpio_dir.join(format!("gpio{}", input.pin)).join("value");
        let level = read_number(&path).await? != 0.0;
        Ok(if level != input.active_low { 1.0 } else { 0.0 })
    }
}

async fn read_number(path: &Path) -> Result<f64, SensorError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|source| SensorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    trace!(path = %path.display(), value = raw.trim(), "Read sysfs value");
    raw.trim().parse().map_err(|_| SensorError::Parse {
        path: path.to_path_buf(),
        value: raw.trim().to_string(),
    })
}

#[async_trait]
impl SensorSource for HardwareSensors {
    fn source(&self) -> SampleSource {
        SampleSource::Hardware
    }

    async fn read(&self, kind: SensorKind) -> Result<f64, SensorError> {
        match kind {
            SensorKind::Temperature => self.read_iio("in_temp_input").await,
            SensorKind::Humidity => self.read_iio("in_humidityrelative_input").await,
            SensorKind::Gas => self.read_gpio(kind, self.gas).await,
            SensorKind::Light => self.read_gpio(kind, self.light).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, HardwareSensors) {
        let dir = TempDir::new().unwrap();
        let iio = dir.path().join("iio:device0");
        let gpio = dir.path().join("gpio");
        fs::create_dir_all(&iio).unwrap();
        fs::create_dir_all(gpio.join("gpio17")).unwrap();
        fs::create_dir_all(gpio.join("gpio27")).unwrap();
        fs::write(iio.join("in_temp_input"), "21400\n").unwrap();
        fs::write(iio.join("in_humidityrelative_input"), "45200\n").unwrap();
        fs::write(gpio.join("gpio17/value"), "0\n").unwrap();
        fs::write(gpio.join("gpio27/value"), "1\n").unwrap();

        let sensors = HardwareSensors::new(iio, gpio)
            .with_gas(Some(GpioInput { pin: 17, active_low: true }))
            .with_light(Some(GpioInput { pin: 27, active_low: false }));
        (dir, sensors)
    }

    #[tokio::test]
    async fn test_reads_iio_channels() {
        let (_dir, sensors) = fixture();
        assert_eq!(sensors.read(SensorKind::Temperature).await.unwrap(), 21.4);
        assert_eq!(sensors.read(SensorKind::Humidity).await.unwrap(), 45.2);
    }

    #[tokio::test]
    async fn test_reads_gpio_with_polarity() {
        let (_dir, sensors) = fixture();
        // Active-low line at 0 means triggered
        assert_eq!(sensors.read(SensorKind::Gas).await.unwrap(), 1.0);
        assert_eq!(sensors.read(SensorKind::Light).await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn test_missing_hardware_errors() {
        let sensors = HardwareSensors::new("/nonexistent/iio", "/nonexistent/gpio");
        assert!(matches!(
            sensors.read(SensorKind::Temperature).await,
            Err(SensorError::Io { .. })
        ));
        assert!(matches!(
            sensors.read(SensorKind::Gas).await,
            Err(SensorError::NotConfigured(SensorKind::Gas))
        ));
    }

    #[tokio::test]
    async fn test_garbage_value_errors() {
        let (dir, sensors) = fixture();
        fs::write(dir.path().join("iio:device0/in_temp_input"), "EIO").unwrap();
        assert!(matches!(
            sensors.read(SensorKind::Temperature).await,
            Err(SensorError::Parse { .. })
        ));
    }
}
