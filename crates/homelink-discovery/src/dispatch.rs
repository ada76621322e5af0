//! Control dispatch with retry and deadline handling

use homelink_core::{
    Backend, BackendError, BackendResult, ControlRequest, Device, DeviceRegistry, DeviceState,
    Event, EventHub,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapter::BackendAdapter;

/// Per-call retry behaviour
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Upper bound for a single adapter call
    pub attempt_timeout: Duration,
    /// Extra attempts after a transient failure
    pub retries: u32,
    /// Pause before each retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(10),
            retries: 1,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Resolves control requests to one adapter call and records the result
pub struct ControlDispatcher {
    adapters: HashMap<Backend, Arc<dyn BackendAdapter>>,
    registry: Arc<DeviceRegistry>,
    events: EventHub,
    policy: RetryPolicy,
}

impl ControlDispatcher {
    pub fn new(registry: Arc<DeviceRegistry>, events: EventHub, policy: RetryPolicy) -> Self {
        Self {
            adapters: HashMap::new(),
            registry,
            events,
            policy,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.adapters.insert(adapter.backend(), adapter);
        self
    }

    /// Execute `request`, bounded by `deadline` when one is given.
    ///
    /// On success the registry records the resulting state and the updated
    /// device is returned. On failure the registry is left untouched.
    pub async fn execute(&self, request: ControlRequest, deadline: Option<Instant>) -> BackendResult<Device> {
        let started = Instant::now();
        let device = self
            .registry
            .get(&request.device_id)
            .ok_or_else(|| BackendError::NotFound(request.device_id.clone()))?;

        let adapter = self
            .adapters
            .get(&device.backend)
            .ok_or_else(|| BackendError::Unavailable(format!("{} backend is disabled", device.backend)))?;

        if !adapter.supports(&device, request.action) {
            return Err(BackendError::Unsupported {
                backend: device.backend,
                device: device.id.clone(),
                action: request.action.to_string(),
            });
        }

        let attempts = self.call_with_retry(adapter.as_ref(), &device, &request);
        let fields = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, attempts)
                .await
                .map_err(|_| BackendError::DeadlineExceeded(started.elapsed()))??,
            None => attempts.await?,
        };

        let (version, updated) = self.registry.apply_control_result(&device.id, fields)?;
        self.events.publish(Event::DeviceChanged { id: updated.id.clone() });
        self.events.publish(Event::RegistrySnapshotChanged { version });

        info!(device = %updated.id, action = %request.action, version, "Control applied");
        Ok(updated)
    }

    async fn call_with_retry(
        &self,
        adapter: &dyn BackendAdapter,
        device: &Device,
        request: &ControlRequest,
    ) -> BackendResult<DeviceState> {
        let timeout = self.policy.attempt_timeout;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(
                timeout,
                adapter.control(device, request.action, &request.params, timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(BackendError::timeout(timeout)),
            };

            match result {
                Ok(fields) => return Ok(fields),
                Err(e) if e.is_transient() && attempt <= self.policy.retries => {
                    warn!(
                        device = %device.id,
                        attempt,
                        error = %e,
                        "Control attempt failed, retrying"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                }
                Err(e) => {
                    debug!(device = %device.id, attempt, error = %e, "Control failed");
                    return Err(e);
                }
            }
        }
    }
}
