//! Event fan-out to real-time subscribers
//!
//! Every subscriber has its own bounded backlog. A slow subscriber loses its
//! oldest events; publishers never wait on it.

use crate::device::DeviceId;
use crate::telemetry::TelemetrySample;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Per-subscriber backlog
pub const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Change notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    DeviceChanged { id: DeviceId },
    DeviceRemoved { id: DeviceId },
    RegistrySnapshotChanged { version: u64 },
    TelemetrySample(TelemetrySample),
}

/// Broadcast hub
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<Event>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every current subscriber, returning how many there were
    pub fn publish(&self, event: Event) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("Event published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            dropped: 0,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One subscriber's view of the event stream
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
    dropped: u64,
}

impl Subscription {
    /// Next event, or `None` once the hub is gone.
    ///
    /// Events lost to overflow are skipped and counted.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Subscriber lagged, oldest events dropped");
                    self.dropped += n;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Events this subscriber lost to overflow
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(event: Option<Event>) -> u64 {
        match event {
            Some(Event::RegistrySnapshotChanged { version }) => version,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let hub = EventHub::default();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert_eq!(hub.publish(Event::RegistrySnapshotChanged { version: 1 }), 2);
        assert_eq!(version(a.recv().await), 1);
        assert_eq!(version(b.recv().await), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_fail() {
        let hub = EventHub::default();
        assert_eq!(hub.publish(Event::RegistrySnapshotChanged { version: 1 }), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_loses_oldest_only() {
        let hub = EventHub::default();
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        for v in 1..=40u64 {
            hub.publish(Event::RegistrySnapshotChanged { version: v });
            assert_eq!(version(fast.recv().await), v);
        }

        // 40 published into a backlog of 32: the first 8 are gone
        assert_eq!(version(slow.recv().await), 9);
        assert_eq!(slow.dropped(), 8);
        for v in 10..=40u64 {
            assert_eq!(version(slow.recv().await), v);
        }
        assert_eq!(fast.dropped(), 0);
    }

    #[tokio::test]
    async fn test_recv_ends_when_hub_dropped() {
        let hub = EventHub::default();
        let mut sub = hub.subscribe();
        drop(hub);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(Event::DeviceChanged { id: DeviceId::from("hub:light.kitchen") }).unwrap();
        assert_eq!(json["type"], "device_changed");
        assert_eq!(json["data"]["id"], "hub:light.kitchen");
    }
}
