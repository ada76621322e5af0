//! Homelink Core - Device model, registry and event fan-out
//!
//! This crate provides the foundational types for the Homelink system:
//! - Normalized device model shared by every discovery backend
//! - Versioned, lock-free device registry snapshots
//! - Control requests and the backend error taxonomy
//! - Event broadcast hub and telemetry sample types

pub mod control;
pub mod device;
pub mod error;
pub mod event;
pub mod registry;
pub mod telemetry;

pub use control::{resulting_state, ControlAction, ControlParams, ControlRequest};
pub use device::{Backend, Device, DeviceAddress, DeviceId, DeviceKind, DeviceState};
pub use error::{BackendError, BackendResult, ErrorKind};
pub use event::{Event, EventHub, Subscription, DEFAULT_EVENT_CAPACITY};
pub use registry::{DeviceRegistry, MergeReport, RegistrySnapshot, ScanOutcome, DEFAULT_MISS_THRESHOLD};
pub use telemetry::{SampleSource, SensorKind, TelemetrySample};
