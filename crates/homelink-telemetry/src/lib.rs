//! Homelink Telemetry - Local sensor sampling
//!
//! Reads the locally attached sensors (Linux IIO for the DHT22
//! temperature/humidity driver, sysfs GPIO for the digital gas and light
//! sensors), falls back to a seeded simulation when hardware is missing,
//! applies calibration and publishes samples on the event hub.

pub mod calibration;
pub mod hardware;
pub mod sampler;
pub mod simulated;
pub mod source;

pub use calibration::Calibration;
pub use hardware::{GpioInput, HardwareSensors};
pub use sampler::{TelemetryLoop, DEFAULT_HISTORY, DEFAULT_READ_TIMEOUT};
pub use simulated::SimulatedSensors;
pub use source::{SensorError, SensorSource};
