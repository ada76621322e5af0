//! Application state

use anyhow::{Context, Result};
use homelink_core::{
    BackendResult, ControlAction, ControlParams, ControlRequest, Device, DeviceId, DeviceRegistry, EventHub,
    RegistrySnapshot, SensorKind, Subscription, TelemetrySample,
};
use homelink_discovery::{
    BackendAdapter, ControlDispatcher, DiscoveryOrchestrator, HubAdapter, NetworkProbe, RadioProbe, RetryPolicy,
};
use homelink_hub::HubClient;
use homelink_telemetry::{HardwareSensors, TelemetryLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// Effective configuration
    pub config: Config,
    pub registry: Arc<DeviceRegistry>,
    pub events: EventHub,
    pub orchestrator: Arc<DiscoveryOrchestrator>,
    pub dispatcher: ControlDispatcher,
    pub telemetry: Arc<TelemetryLoop>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let registry = Arc::new(DeviceRegistry::new(config.registry.miss_threshold));
        let events = EventHub::new(config.daemon.event_capacity);

        let mut orchestrator = DiscoveryOrchestrator::new(registry.clone(), events.clone());
        let mut dispatcher = ControlDispatcher::new(
            registry.clone(),
            events.clone(),
            RetryPolicy {
                attempt_timeout: Duration::from_secs(config.control.timeout_secs),
                retries: config.control.retries,
                backoff: Duration::from_millis(config.control.retry_backoff_ms),
            },
        );

        for (adapter, timeout) in build_adapters(&config)? {
            orchestrator = orchestrator.with_adapter(adapter.clone(), timeout);
            dispatcher = dispatcher.with_adapter(adapter);
        }

        let mut telemetry = TelemetryLoop::new(config.telemetry.sensors.clone(), config.telemetry.seed, events.clone())
            .with_calibration(config.telemetry.calibration.clone())
            .with_history(config.telemetry.history);
        if config.telemetry.hardware_enabled {
            let hardware = HardwareSensors::new(&config.telemetry.iio_path, &config.telemetry.gpio_path)
                .with_gas(config.telemetry.gas_gpio)
                .with_light(config.telemetry.light_gpio);
            telemetry = telemetry.with_hardware(Arc::new(hardware));
        }

        info!(
            backends = ?orchestrator.backends(),
            miss_threshold = config.registry.miss_threshold,
            "Application state initialized"
        );

        Ok(Arc::new(Self {
            config,
            registry,
            events,
            orchestrator: Arc::new(orchestrator),
            dispatcher,
            telemetry: Arc::new(telemetry),
        }))
    }

    /// Start a discovery cycle unless one is already running.
    ///
    /// Returns whether a new cycle was started.
    pub fn trigger_discovery(&self) -> bool {
        self.orchestrator.trigger()
    }

    pub fn list_devices(&self) -> Arc<RegistrySnapshot> {
        self.registry.snapshot()
    }

    pub fn get_device(&self, id: &DeviceId) -> Option<Device> {
        self.registry.get(id)
    }

    /// Run one control request, bounded by `timeout` when given
    pub async fn control_device(
        &self,
        id: DeviceId,
        action: ControlAction,
        params: ControlParams,
        timeout: Option<Duration>,
    ) -> BackendResult<Device> {
        let request = ControlRequest {
            device_id: id,
            action,
            params,
        };
        let deadline = timeout.map(|t| Instant::now() + t);
        self.dispatcher.execute(request, deadline).await
    }

    pub async fn latest_telemetry(&self, kind: SensorKind) -> Option<TelemetrySample> {
        self.telemetry.latest(kind).await
    }

    pub fn subscribe_events(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Spawn the periodic discovery and telemetry tasks
    pub fn spawn_background(&self) {
        tokio::spawn(self.orchestrator.clone().run(self.config.discovery_interval()));
        if !self.telemetry.kinds().is_empty() {
            tokio::spawn(self.telemetry.clone().run(self.config.telemetry_interval()));
        }
    }
}

/// Adapters enabled by `config`, each with its scan timeout
fn build_adapters(config: &Config) -> Result<Vec<(Arc<dyn BackendAdapter>, Duration)>> {
    let mut adapters: Vec<(Arc<dyn BackendAdapter>, Duration)> = Vec::new();

    if config.network.enabled {
        adapters.push((
            Arc::new(NetworkProbe::new(config.network.interface.clone())),
            Duration::from_secs(config.network.timeout_secs),
        ));
    }

    if config.radio.enabled {
        adapters.push((
            Arc::new(RadioProbe::new(config.radio.scan_secs)),
            Duration::from_secs(config.radio.timeout_secs),
        ));
    }

    if config.hub.enabled {
        match &config.hub.token {
            Some(token) => {
                let timeout = Duration::from_secs(config.hub.timeout_secs);
                let client = HubClient::new(&config.hub.url, Some(token.clone()), timeout)
                    .with_context(|| format!("Failed to create hub client for {}", config.hub.url))?;
                adapters.push((Arc::new(HubAdapter::new(client)), timeout));
            }
            None => warn!(url = %config.hub.url, "Hub enabled but no token configured, skipping"),
        }
    }

    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use homelink_core::{Backend, SampleSource};

    fn offline_config() -> Config {
        let mut config = Config::default();
        config.network.enabled = false;
        config.radio.enabled = false;
        config.hub.enabled = false;
        config.telemetry.hardware_enabled = false;
        config
    }

    #[tokio::test]
    async fn test_disabled_backends_register_nothing() {
        let state = AppState::new(offline_config()).unwrap();
        assert!(state.orchestrator.backends().is_empty());
        assert!(state.list_devices().is_empty());
    }

    #[tokio::test]
    async fn test_hub_without_token_is_skipped() {
        let mut config = offline_config();
        config.hub.enabled = true;
        let state = AppState::new(config).unwrap();
        assert!(!state.orchestrator.backends().contains(&Backend::Hub));
    }

    #[tokio::test]
    async fn test_enabled_backends_registered() {
        let mut config = offline_config();
        config.network.enabled = true;
        config.hub.enabled = true;
        config.hub.token = Some("t".into());
        let state = AppState::new(config).unwrap();
        let backends = state.orchestrator.backends();
        assert!(backends.contains(&Backend::Network));
        assert!(backends.contains(&Backend::Hub));
        assert!(!backends.contains(&Backend::Radio));
    }

    #[tokio::test]
    async fn test_hardware_disabled_still_samples() {
        let state = AppState::new(offline_config()).unwrap();
        assert!(state.latest_telemetry(SensorKind::Temperature).await.is_none());
        state.telemetry.tick().await;
        let sample = state.latest_telemetry(SensorKind::Temperature).await.unwrap();
        assert_eq!(sample.sensor_kind, SensorKind::Temperature);
        // Hardware off still samples, from the simulation
        assert_eq!(sample.source, SampleSource::Simulated);
    }
}
