//! Discovery orchestrator that runs every backend scan and merges the results

use homelink_core::{
    Backend, BackendError, DeviceId, DeviceRegistry, Event, EventHub, ScanOutcome,
};
use serde::Serialize;
use std::borrow::Borrow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::adapter::BackendAdapter;

/// Where the current cycle is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Idle,
    Scanning,
    Merging,
}

/// How one backend fared during a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendReport {
    pub backend: Backend,
    /// Devices reported, when the scan succeeded
    pub devices: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Summary of one discovery cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    /// Registry version the cycle installed
    pub version: u64,
    pub backends: Vec<BackendReport>,
    pub changed: Vec<DeviceId>,
    pub removed: Vec<DeviceId>,
}

/// Claim on the single cycle slot. Dropping it releases the slot and resets
/// the phase, whether the cycle finished, panicked or was cancelled.
struct CycleGuard<O: Borrow<DiscoveryOrchestrator>>(O);

impl<O: Borrow<DiscoveryOrchestrator>> CycleGuard<O> {
    fn acquire(orchestrator: O) -> Option<Self> {
        let claimed = orchestrator
            .borrow()
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        claimed.then(|| Self(orchestrator))
    }
}

impl<O: Borrow<DiscoveryOrchestrator>> Drop for CycleGuard<O> {
    fn drop(&mut self) {
        let orchestrator = self.0.borrow();
        orchestrator.phase.send_replace(CyclePhase::Idle);
        orchestrator.running.store(false, Ordering::Release);
    }
}

struct AdapterSlot {
    adapter: Arc<dyn BackendAdapter>,
    timeout: Duration,
}

/// Runs discovery cycles; at most one is in flight at any time
pub struct DiscoveryOrchestrator {
    adapters: Vec<AdapterSlot>,
    registry: Arc<DeviceRegistry>,
    events: EventHub,
    running: AtomicBool,
    phase: watch::Sender<CyclePhase>,
}

impl DiscoveryOrchestrator {
    pub fn new(registry: Arc<DeviceRegistry>, events: EventHub) -> Self {
        let (phase, _) = watch::channel(CyclePhase::Idle);
        Self {
            adapters: Vec::new(),
            registry,
            events,
            running: AtomicBool::new(false),
            phase,
        }
    }

    /// Register an adapter with its scan timeout
    pub fn with_adapter(mut self, adapter: Arc<dyn BackendAdapter>, timeout: Duration) -> Self {
        self.adapters.push(AdapterSlot { adapter, timeout });
        self
    }

    pub fn backends(&self) -> Vec<Backend> {
        self.adapters.iter().map(|slot| slot.adapter.backend()).collect()
    }

    /// Watch the cycle phase
    pub fn phase(&self) -> watch::Receiver<CyclePhase> {
        self.phase.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one cycle now, or return `None` if a cycle is already in flight
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        let Some(_guard) = CycleGuard::acquire(self) else {
            debug!("Discovery cycle already running, trigger coalesced");
            return None;
        };
        Some(self.cycle().await)
    }

    /// Start a cycle in the background unless one is running.
    ///
    /// Returns whether a new cycle was started.
    pub fn trigger(self: &Arc<Self>) -> bool {
        let Some(guard) = CycleGuard::acquire(Arc::clone(self)) else {
            debug!("Discovery trigger coalesced into running cycle");
            return false;
        };
        tokio::spawn(async move {
            guard.0.cycle().await;
        });
        true
    }

    /// Run cycles forever at `period`, starting immediately
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut ticker = interval(period);
        info!(period_secs = period.as_secs(), "Discovery scheduler started");
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    async fn cycle(&self) -> CycleReport {
        self.phase.send_replace(CyclePhase::Scanning);
        info!(backends = self.adapters.len(), "Starting discovery cycle");

        let cycle_started = Instant::now();
        let mut tasks = JoinSet::new();
        for slot in &self.adapters {
            let adapter = Arc::clone(&slot.adapter);
            let timeout = slot.timeout;
            tasks.spawn(async move {
                let backend = adapter.backend();
                let started = Instant::now();
                let outcome = match tokio::time::timeout(timeout, adapter.scan(timeout)).await {
                    Ok(Ok(devices)) => ScanOutcome::Devices(devices),
                    Ok(Err(e)) => ScanOutcome::Failed(e),
                    Err(_) => ScanOutcome::Failed(BackendError::timeout(timeout)),
                };
                (backend, outcome, started.elapsed())
            });
        }

        let mut pending = self.backends();
        let mut finished = Vec::with_capacity(self.adapters.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    if let Some(pos) = pending.iter().position(|b| *b == result.0) {
                        pending.remove(pos);
                    }
                    finished.push(result);
                }
                Err(e) => error!(error = %e, "Scan task panicked"),
            }
        }
        // Whatever never reported back died with its task
        for backend in pending {
            finished.push((
                backend,
                ScanOutcome::Failed(BackendError::Permanent("scan task panicked".into())),
                cycle_started.elapsed(),
            ));
        }

        let mut batch = Vec::with_capacity(finished.len());
        let mut backends = Vec::with_capacity(finished.len());
        for (backend, outcome, elapsed) in finished {
            let report = match &outcome {
                ScanOutcome::Devices(devices) => {
                    debug!(backend = %backend, count = devices.len(), "Backend scan finished");
                    BackendReport {
                        backend,
                        devices: Some(devices.len()),
                        error: None,
                        elapsed_ms: elapsed.as_millis() as u64,
                    }
                }
                ScanOutcome::Failed(e) => {
                    warn!(backend = %backend, error = %e, "Backend scan failed");
                    BackendReport {
                        backend,
                        devices: None,
                        error: Some(e.to_string()),
                        elapsed_ms: elapsed.as_millis() as u64,
                    }
                }
            };
            backends.push(report);
            batch.push((backend, outcome));
        }

        self.phase.send_replace(CyclePhase::Merging);
        let merged = self.registry.merge_all(batch);

        for id in &merged.changed {
            self.events.publish(Event::DeviceChanged { id: id.clone() });
        }
        for id in &merged.removed {
            self.events.publish(Event::DeviceRemoved { id: id.clone() });
        }
        self.events.publish(Event::RegistrySnapshotChanged {
            version: merged.version,
        });

        info!(
            version = merged.version,
            changed = merged.changed.len(),
            removed = merged.removed.len(),
            "Discovery cycle complete"
        );

        backends.sort_by_key(|r| r.backend);
        CycleReport {
            version: merged.version,
            backends,
            changed: merged.changed,
            removed: merged.removed,
        }
    }
}
