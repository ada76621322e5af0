//! Hub entity registry adapter

use async_trait::async_trait;
use homelink_core::{
    resulting_state, Backend, BackendError, BackendResult, ControlAction, ControlParams, Device,
    DeviceState,
};
use homelink_hub::{entity_to_device, service_for, HubClient};
use std::time::Duration;
use tracing::{debug, info};

use crate::adapter::{unsupported, BackendAdapter};

/// Exposes the hub's entities as devices and forwards control to hub services
#[derive(Debug, Clone)]
pub struct HubAdapter {
    client: HubClient,
}

impl HubAdapter {
    pub fn new(client: HubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BackendAdapter for HubAdapter {
    fn backend(&self) -> Backend {
        Backend::Hub
    }

    fn supports(&self, device: &Device, action: ControlAction) -> bool {
        device
            .entity_id()
            .is_some_and(|entity_id| service_for(entity_id, action, &ControlParams::new()).is_some())
    }

    async fn scan(&self, timeout: Duration) -> BackendResult<Vec<Device>> {
        let states = tokio::time::timeout(timeout, self.client.list_states())
            .await
            .map_err(|_| BackendError::timeout(timeout))??;

        let devices: Vec<Device> = states.iter().filter_map(entity_to_device).collect();
        info!(entities = states.len(), devices = devices.len(), "Hub scan complete");
        Ok(devices)
    }

    async fn control(
        &self,
        device: &Device,
        action: ControlAction,
        params: &ControlParams,
        timeout: Duration,
    ) -> BackendResult<DeviceState> {
        let entity_id = device
            .entity_id()
            .ok_or_else(|| BackendError::Permanent(format!("{} is not a hub entity", device.id)))?;
        let call = service_for(entity_id, action, params).ok_or_else(|| unsupported(device, action))?;

        debug!(device = %device.id, service = %call.service, "Forwarding control to hub");
        let changed = tokio::time::timeout(timeout, self.client.call_service(&call))
            .await
            .map_err(|_| BackendError::timeout(timeout))??;

        let mut fields = resulting_state(action, params, &device.state);
        // Prefer what the hub reports back when it echoes the entity
        if let Some(reported) = changed
            .iter()
            .find(|s| s.entity_id == entity_id)
            .and_then(entity_to_device)
        {
            fields.extend(reported.state);
        }
        Ok(fields)
    }
}
