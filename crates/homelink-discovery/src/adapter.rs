//! Backend adapter contract

use async_trait::async_trait;
use homelink_core::{
    Backend, BackendError, BackendResult, ControlAction, ControlParams, Device, DeviceState,
};
use std::time::Duration;

/// Translates one external discovery/control protocol into the normalized
/// device model.
///
/// Adapters hold no device state; everything they learn is handed to the
/// registry by the orchestrator or the dispatcher.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn backend(&self) -> Backend;

    /// Whether `control` can carry out `action` on `device`
    fn supports(&self, device: &Device, action: ControlAction) -> bool;

    /// Enumerate the devices currently visible to this backend
    async fn scan(&self, timeout: Duration) -> BackendResult<Vec<Device>>;

    /// Perform one backend-native control call and return the state fields
    /// it changed
    async fn control(
        &self,
        device: &Device,
        action: ControlAction,
        params: &ControlParams,
        timeout: Duration,
    ) -> BackendResult<DeviceState>;
}

/// Error for backends without a control surface
pub(crate) fn unsupported(device: &Device, action: ControlAction) -> BackendError {
    BackendError::Unsupported {
        backend: device.backend,
        device: device.id.clone(),
        action: action.to_string(),
    }
}
