//! Configuration loading and validation

use anyhow::{Context, Result};
use homelink_core::{SensorKind, DEFAULT_EVENT_CAPACITY, DEFAULT_MISS_THRESHOLD};
use homelink_telemetry::{Calibration, GpioInput, DEFAULT_HISTORY};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Full discovery cycle interval in seconds
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,
    /// Events buffered per WebSocket subscriber before the oldest are dropped
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            discovery_interval_secs: default_discovery_interval(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_discovery_interval() -> u64 {
    60
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Consecutive missed scans before a device is dropped
    #[serde(default = "default_miss_threshold")]
    pub miss_threshold: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            miss_threshold: default_miss_threshold(),
        }
    }
}

fn default_miss_threshold() -> u32 {
    DEFAULT_MISS_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_scan_timeout")]
    pub timeout_secs: u64,
    /// Interface to probe (first non-loopback interface if unset)
    #[serde(default)]
    pub interface: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_scan_timeout(),
            interface: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_radio_timeout")]
    pub timeout_secs: u64,
    /// How long the radio listens for advertisements
    #[serde(default = "default_radio_scan")]
    pub scan_secs: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_radio_timeout(),
            scan_secs: default_radio_scan(),
        }
    }
}

fn default_radio_timeout() -> u64 {
    15
}

fn default_radio_scan() -> u64 {
    8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_hub_url")]
    pub url: String,
    /// Long-lived access token
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_scan_timeout")]
    pub timeout_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_hub_url(),
            token: None,
            timeout_secs: default_scan_timeout(),
        }
    }
}

fn default_hub_url() -> String {
    "http://homeassistant.local:8123".to_string()
}

fn default_scan_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Upper bound for one control attempt
    #[serde(default = "default_scan_timeout")]
    pub timeout_secs: u64,
    /// Extra attempts after a transient failure
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scan_timeout(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

fn default_retries() -> u32 {
    1
}

fn default_retry_backoff() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Read attached sensors; when off every sample is simulated
    #[serde(default = "default_true", alias = "enabled")]
    pub hardware_enabled: bool,
    #[serde(default = "default_telemetry_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_sensors")]
    pub sensors: Vec<SensorKind>,
    /// Samples retained per sensor kind
    #[serde(default = "default_history")]
    pub history: usize,
    /// IIO device of the DHT22 driver
    #[serde(default = "default_iio_path")]
    pub iio_path: String,
    #[serde(default = "default_gpio_path")]
    pub gpio_path: String,
    #[serde(default)]
    pub gas_gpio: Option<GpioInput>,
    #[serde(default)]
    pub light_gpio: Option<GpioInput>,
    /// Seed for the simulated fallback
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Offsets added to raw readings, per sensor kind
    #[serde(default)]
    pub calibration: Calibration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            hardware_enabled: true,
            interval_secs: default_telemetry_interval(),
            sensors: default_sensors(),
            history: default_history(),
            iio_path: default_iio_path(),
            gpio_path: default_gpio_path(),
            gas_gpio: None,
            light_gpio: None,
            seed: default_seed(),
            calibration: Calibration::default(),
        }
    }
}

fn default_telemetry_interval() -> u64 {
    5
}

fn default_sensors() -> Vec<SensorKind> {
    SensorKind::ALL.to_vec()
}

fn default_history() -> usize {
    DEFAULT_HISTORY
}

fn default_iio_path() -> String {
    "/sys/bus/iio/devices/iio:device0".to_string()
}

fn default_gpio_path() -> String {
    "/sys/class/gpio".to_string()
}

fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Copy safe to hand out over the API
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.hub.token.is_some() {
            config.hub.token = Some("********".to_string());
        }
        config
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.daemon.discovery_interval_secs.max(1))
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.interval_secs.max(1))
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let mut config = Config::default();
    config.telemetry.gas_gpio = Some(GpioInput {
        pin: 17,
        active_low: true,
    });
    config.telemetry.light_gpio = Some(GpioInput {
        pin: 27,
        active_low: true,
    });
    config.telemetry.calibration = Calibration::default()
        .with_offset(SensorKind::Temperature, 0.0)
        .with_offset(SensorKind::Humidity, 0.0);

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.daemon.discovery_interval_secs, 60);
        assert_eq!(config.registry.miss_threshold, 3);
        assert_eq!(config.radio.timeout_secs, 15);
        assert_eq!(config.control.retry_backoff_ms, 1000);
        assert_eq!(config.telemetry.interval_secs, 5);
        assert_eq!(config.telemetry.history, 20);
        assert_eq!(config.daemon.event_capacity, 32);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("homelink.toml");
        std::fs::write(
            &path,
            r#"
[hub]
url = "http://10.0.0.5:8123"
token = "abc"

[radio]
enabled = false

[telemetry]
sensors = ["temperature", "humidity"]

[telemetry.calibration]
temperature = -1.2
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.hub.url, "http://10.0.0.5:8123");
        assert_eq!(config.hub.timeout_secs, 10);
        assert!(!config.radio.enabled);
        assert!(config.network.enabled);
        assert_eq!(config.telemetry.sensors, vec![SensorKind::Temperature, SensorKind::Humidity]);
        assert_eq!(config.telemetry.calibration.offset(SensorKind::Temperature), -1.2);
        assert!(config.telemetry.hardware_enabled);
    }

    #[test]
    fn test_hardware_toggle_accepts_old_key() {
        let config: Config = toml::from_str("[telemetry]\nhardware_enabled = false\n").unwrap();
        assert!(!config.telemetry.hardware_enabled);
        assert!(!config.telemetry.sensors.is_empty());

        let config: Config = toml::from_str("[telemetry]\nenabled = false\n").unwrap();
        assert!(!config.telemetry.hardware_enabled);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("homelink.toml");
        std::fs::write(&path, "[daemon]\nbind = 12").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_default_config_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("homelink.toml");
        save_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.telemetry.gas_gpio.map(|g| g.pin), Some(17));
        assert_eq!(config.daemon, DaemonConfig::default());
    }

    #[test]
    fn test_redacted_hides_token() {
        let mut config = Config::default();
        config.hub.token = Some("secret".into());
        assert_eq!(config.redacted().hub.token.as_deref(), Some("********"));
        assert_eq!(Config::default().redacted().hub.token, None);
    }
}
