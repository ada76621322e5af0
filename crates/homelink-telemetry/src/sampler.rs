//! Periodic sensor sampling

use homelink_core::{Event, EventHub, SensorKind, TelemetrySample};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::calibration::Calibration;
use crate::simulated::SimulatedSensors;
use crate::source::SensorSource;

/// Samples retained per kind
pub const DEFAULT_HISTORY: usize = 20;

/// Longest a single hardware read may take before the simulation stands in
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Samples every configured sensor kind on each tick, preferring hardware
/// and falling back to the simulation
pub struct TelemetryLoop {
    kinds: Vec<SensorKind>,
    hardware: Option<Arc<dyn SensorSource>>,
    read_timeout: Duration,
    simulated: SimulatedSensors,
    calibration: Calibration,
    history: RwLock<HashMap<SensorKind, VecDeque<TelemetrySample>>>,
    history_len: usize,
    events: EventHub,
}

impl TelemetryLoop {
    pub fn new(kinds: Vec<SensorKind>, seed: u64, events: EventHub) -> Self {
        Self {
            kinds,
            hardware: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            simulated: SimulatedSensors::new(seed),
            calibration: Calibration::default(),
            history: RwLock::new(HashMap::new()),
            history_len: DEFAULT_HISTORY,
            events,
        }
    }

    pub fn with_hardware(mut self, hardware: Arc<dyn SensorSource>) -> Self {
        self.hardware = Some(hardware);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_history(mut self, len: usize) -> Self {
        self.history_len = len.max(1);
        self
    }

    pub fn kinds(&self) -> &[SensorKind] {
        &self.kinds
    }

    /// Take one sample of `kind`, or `None` if the reading was implausible
    pub async fn sample(&self, kind: SensorKind) -> Option<TelemetrySample> {
        let hardware = match &self.hardware {
            Some(source) => match tokio::time::timeout(self.read_timeout, source.read(kind)).await {
                Ok(Ok(value)) => Some((value, source.source())),
                Ok(Err(e)) => {
                    debug!(sensor = %kind, error = %e, "Hardware read failed, using simulation");
                    None
                }
                Err(_) => {
                    debug!(
                        sensor = %kind,
                        timeout_ms = self.read_timeout.as_millis() as u64,
                        "Hardware read timed out, using simulation"
                    );
                    None
                }
            },
            None => None,
        };
        let (raw, source) = match hardware {
            Some(reading) => reading,
            None => (self.simulated.next(kind), self.simulated.source()),
        };

        if !kind.within_bounds(raw) {
            warn!(sensor = %kind, value = raw, "Reading outside physical bounds, discarded");
            return None;
        }

        Some(TelemetrySample::new(kind, raw, self.calibration.offset(kind), source))
    }

    /// Sample every kind once, record and publish the results
    pub async fn tick(&self) -> Vec<TelemetrySample> {
        let mut samples = Vec::with_capacity(self.kinds.len());
        for &kind in &self.kinds {
            if let Some(sample) = self.sample(kind).await {
                samples.push(sample);
            }
        }

        {
            let mut history = self.history.write().await;
            for sample in &samples {
                let series = history.entry(sample.sensor_kind).or_default();
                series.push_back(sample.clone());
                while series.len() > self.history_len {
                    series.pop_front();
                }
            }
        }

        for sample in &samples {
            self.events.publish(Event::TelemetrySample(sample.clone()));
        }
        samples
    }

    /// Tick forever at `period`
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut ticker = interval(period);
        info!(
            period_secs = period.as_secs(),
            sensors = self.kinds.len(),
            "Telemetry loop started"
        );
        loop {
            ticker.tick().await;
            let samples = self.tick().await;
            debug!(count = samples.len(), "Telemetry tick");
        }
    }

    /// Most recent sample of `kind`
    pub async fn latest(&self, kind: SensorKind) -> Option<TelemetrySample> {
        self.history.read().await.get(&kind).and_then(|s| s.back().cloned())
    }

    /// Retained samples of `kind`, oldest first
    pub async fn history(&self, kind: SensorKind) -> Vec<TelemetrySample> {
        self.history
            .read()
            .await
            .get(&kind)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Retained samples of every kind
    pub async fn all_history(&self) -> BTreeMap<SensorKind, Vec<TelemetrySample>> {
        self.history
            .read()
            .await
            .iter()
            .map(|(kind, series)| (*kind, series.iter().cloned().collect()))
            .collect()
    }
}
