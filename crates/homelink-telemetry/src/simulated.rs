//! Deterministic simulated sensors

use async_trait::async_trait;
use homelink_core::{SampleSource, SensorKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::source::{SensorError, SensorSource};

/// Odds a digital sensor reads as triggered
fn trigger_probability(kind: SensorKind) -> f64 {
    match kind {
        SensorKind::Gas => 0.25,
        _ => 0.5,
    }
}

struct SimState {
    rng: StdRng,
    last: HashMap<SensorKind, f64>,
}

/// Seeded random walk within each kind's plausible range.
///
/// The same seed and read order always yield the same values.
pub struct SimulatedSensors {
    state: Mutex<SimState>,
}

impl SimulatedSensors {
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(SimState {
                rng: StdRng::seed_from_u64(seed),
                last: HashMap::new(),
            }),
        }
    }

    /// Next value for `kind`; never fails
    pub fn next(&self, kind: SensorKind) -> f64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let SimState { rng, last } = &mut *state;

        if kind.is_digital() {
            return if rng.gen_bool(trigger_probability(kind)) { 1.0 } else { 0.0 };
        }

        let (min, max) = kind.plausible_range();
        let step = (max - min) * 0.05;
        let previous = *last.get(&kind).unwrap_or(&((min + max) / 2.0));
        let value = (previous + rng.gen_range(-step..=step)).clamp(min, max);
        // One decimal place, like the DHT22 reports
        let value = (value * 10.0).round() / 10.0;
        last.insert(kind, value);
        value
    }
}

#[async_trait]
impl SensorSource for SimulatedSensors {
    fn source(&self) -> SampleSource {
        SampleSource::Simulated
    }

    async fn read(&self, kind: SensorKind) -> Result<f64, SensorError> {
        Ok(self.next(kind))
    }
}
