//! Per-kind calibration offsets

use homelink_core::SensorKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Offsets added to raw readings before publication
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Calibration {
    offsets: BTreeMap<SensorKind, f64>,
}

impl Calibration {
    pub fn with_offset(mut self, kind: SensorKind, offset: f64) -> Self {
        self.offsets.insert(kind, offset);
        self
    }

    pub fn offset(&self, kind: SensorKind) -> f64 {
        self.offsets.get(&kind).copied().unwrap_or(0.0)
    }
}
