//! Versioned device registry
//!
//! Readers load an immutable [`RegistrySnapshot`] without locking. Writers
//! build the next snapshot from the current one and install it atomically,
//! bumping the version by exactly one per install.

use crate::device::{Backend, Device, DeviceId, DeviceState};
use crate::error::{BackendError, BackendResult};
use arc_swap::ArcSwap;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Consecutive missed scans after which a device is dropped
pub const DEFAULT_MISS_THRESHOLD: u32 = 3;

/// Immutable view of every known device
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistrySnapshot {
    pub version: u64,
    pub devices: BTreeMap<DeviceId, Device>,
}

impl RegistrySnapshot {
    pub fn get(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices in id order
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn by_backend(&self, backend: Backend) -> impl Iterator<Item = &Device> {
        self.devices.values().filter(move |d| d.backend == backend)
    }
}

/// Result of one backend scan, as handed to the registry
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Devices(Vec<Device>),
    Failed(BackendError),
}

impl ScanOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Devices(_))
    }
}

/// What an install changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    /// Version of the installed snapshot
    pub version: u64,
    /// Added devices and devices whose record changed
    pub changed: Vec<DeviceId>,
    /// Devices dropped after too many missed scans
    pub removed: Vec<DeviceId>,
}

/// Registry of discovered devices
pub struct DeviceRegistry {
    current: ArcSwap<RegistrySnapshot>,
    /// Serializes writers; readers never take it
    writer: Mutex<()>,
    miss_threshold: u32,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MISS_THRESHOLD)
    }
}

impl DeviceRegistry {
    pub fn new(miss_threshold: u32) -> Self {
        Self {
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
            writer: Mutex::new(()),
            miss_threshold: miss_threshold.max(1),
        }
    }

    pub fn miss_threshold(&self) -> u32 {
        self.miss_threshold
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    pub fn get(&self, id: &DeviceId) -> Option<Device> {
        self.current.load().get(id).cloned()
    }

    /// Merge a single backend's scan outcome
    pub fn merge(&self, backend: Backend, outcome: ScanOutcome) -> MergeReport {
        self.merge_all(vec![(backend, outcome)])
    }

    /// Merge several backend outcomes and install them as one snapshot
    pub fn merge_all(&self, batch: Vec<(Backend, ScanOutcome)>) -> MergeReport {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current.load_full();
        let mut devices = current.devices.clone();
        let mut removed = Vec::new();

        for (backend, outcome) in batch {
            match outcome {
                ScanOutcome::Devices(found) => {
                    self.apply_scan(&mut devices, &mut removed, backend, found);
                }
                ScanOutcome::Failed(e) => {
                    warn!(backend = %backend, error = %e, "Scan failed, marking devices unreachable");
                    for device in devices.values_mut().filter(|d| d.backend == backend) {
                        device.reachable = false;
                    }
                }
            }
        }

        let changed = devices
            .iter()
            .filter(|(id, device)| match current.devices.get(*id) {
                Some(before) => record_changed(before, device),
                None => true,
            })
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();

        let version = current.version + 1;
        self.current.store(Arc::new(RegistrySnapshot { version, devices }));

        info!(
            version,
            changed = changed.len(),
            removed = removed.len(),
            "Registry snapshot installed"
        );

        MergeReport {
            version,
            changed,
            removed,
        }
    }

    fn apply_scan(
        &self,
        devices: &mut BTreeMap<DeviceId, Device>,
        removed: &mut Vec<DeviceId>,
        backend: Backend,
        found: Vec<Device>,
    ) {
        let now = Utc::now();
        let mut seen = Vec::with_capacity(found.len());

        for mut device in found {
            if device.backend != backend {
                warn!(
                    device = %device.id,
                    expected = %backend,
                    actual = %device.backend,
                    "Ignoring device reported by the wrong backend"
                );
                continue;
            }

            if let Some(existing) = devices.get(&device.id) {
                let mut state = existing.state.clone();
                state.extend(std::mem::take(&mut device.state));
                device.state = state;
                if device.vendor.is_none() {
                    device.vendor = existing.vendor.clone();
                }
            }
            // Reachability is the adapter's call; a hub may list an entity it cannot reach
            device.missed_scans = 0;
            device.last_seen = now;
            seen.push(device.id.clone());
            devices.insert(device.id.clone(), device);
        }

        let missing: Vec<DeviceId> = devices
            .values()
            .filter(|d| d.backend == backend && !seen.contains(&d.id))
            .map(|d| d.id.clone())
            .collect();

        for id in missing {
            let Some(device) = devices.get_mut(&id) else {
                continue;
            };
            device.reachable = false;
            device.missed_scans += 1;
            if device.missed_scans >= self.miss_threshold {
                debug!(device = %id, misses = device.missed_scans, "Removing device");
                devices.remove(&id);
                removed.push(id);
            }
        }
    }

    /// Record the outcome of a successful control call
    ///
    /// Merges `fields` into the device state and installs a new snapshot.
    /// Reachability is left untouched.
    pub fn apply_control_result(&self, id: &DeviceId, fields: DeviceState) -> BackendResult<(u64, Device)> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current.load_full();
        let mut devices = current.devices.clone();
        let Some(device) = devices.get_mut(id) else {
            return Err(BackendError::NotFound(id.clone()));
        };
        device.state.extend(fields);
        let updated = device.clone();

        let version = current.version + 1;
        self.current.store(Arc::new(RegistrySnapshot { version, devices }));
        debug!(device = %id, version, "Applied control result");

        Ok((version, updated))
    }
}

/// Whether a record changed in a way subscribers care about
fn record_changed(before: &Device, after: &Device) -> bool {
    before.reachable != after.reachable
        || before.state != after.state
        || before.display_name != after.display_name
        || before.kind != after.kind
        || before.address != after.address
        || before.vendor != after.vendor
}
