//! Sensor source contract

use async_trait::async_trait;
use homelink_core::{SampleSource, SensorKind};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("No {0} sensor configured")]
    NotConfigured(SensorKind),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unparseable reading '{value}' from {path}")]
    Parse { path: PathBuf, value: String },
}

/// Something that can produce a raw reading for a sensor kind
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Provenance recorded on samples from this source
    fn source(&self) -> SampleSource;

    async fn read(&self, kind: SensorKind) -> Result<f64, SensorError>;
}
