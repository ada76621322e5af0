//! WebSocket handler for real-time updates

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use homelink_core::{Device, DeviceId, DeviceRegistry, Event, TelemetrySample};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// WebSocket message types
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum WsMessage {
    /// Full registry state, sent once on connect
    Snapshot { version: u64, devices: Vec<Device> },
    DeviceChanged(Device),
    DeviceRemoved { id: DeviceId },
    RegistrySnapshotChanged { version: u64 },
    TelemetrySample(TelemetrySample),
    Pong,
}

impl WsMessage {
    /// Client frame for `event`; changed devices are sent in full
    fn from_event(registry: &DeviceRegistry, event: Event) -> Option<Self> {
        match event {
            Event::DeviceChanged { id } => registry.get(&id).map(Self::DeviceChanged),
            Event::DeviceRemoved { id } => Some(Self::DeviceRemoved { id }),
            Event::RegistrySnapshotChanged { version } => Some(Self::RegistrySnapshotChanged { version }),
            Event::TelemetrySample(sample) => Some(Self::TelemetrySample(sample)),
        }
    }

    fn to_frame(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                warn!(error = %e, "Failed to encode WebSocket message");
                None
            }
        }
    }
}

/// WebSocket upgrade handler
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    // Subscribe before reading the snapshot so nothing falls in between
    let mut events = state.subscribe_events();

    info!(subscribers = state.events.subscriber_count(), "WebSocket client connected");

    let snapshot = state.list_devices();
    let hello = WsMessage::Snapshot {
        version: snapshot.version,
        devices: snapshot.devices().cloned().collect(),
    };
    if let Some(frame) = hello.to_frame() {
        if sender.send(frame).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Event hub closed");
                    break;
                };
                let Some(frame) = WsMessage::from_event(&state.registry, event).and_then(|m| m.to_frame()) else {
                    continue;
                };
                if sender.send(frame).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        if text.as_str() == "ping" {
                            if let Some(frame) = WsMessage::Pong.to_frame() {
                                if sender.send(frame).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    if events.dropped() > 0 {
        info!(dropped = events.dropped(), "Slow WebSocket client missed events");
    }
    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use homelink_core::{Backend, DeviceAddress, DeviceKind, SampleSource, ScanOutcome, SensorKind};
    use serde_json::json;

    fn registry_with_light() -> DeviceRegistry {
        let registry = DeviceRegistry::default();
        let light = Device::new(
            Backend::Hub,
            DeviceKind::Light,
            "Kitchen Light",
            DeviceAddress::Hub {
                entity_id: "light.kitchen".into(),
            },
        );
        registry.merge(Backend::Hub, ScanOutcome::Devices(vec![light]));
        registry
    }

    #[test]
    fn test_changed_device_sent_in_full() {
        let registry = registry_with_light();
        let id = DeviceId::from("hub:light.kitchen");
        let msg = WsMessage::from_event(&registry, Event::DeviceChanged { id }).unwrap();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "device_changed");
        assert_eq!(value["data"]["display_name"], "Kitchen Light");
    }

    #[test]
    fn test_changed_device_already_gone_is_skipped() {
        let registry = DeviceRegistry::default();
        let id = DeviceId::from("hub:light.kitchen");
        assert!(WsMessage::from_event(&registry, Event::DeviceChanged { id }).is_none());
    }

    #[test]
    fn test_frames_are_tagged() {
        let registry = DeviceRegistry::default();
        let msg = WsMessage::from_event(&registry, Event::RegistrySnapshotChanged { version: 7 }).unwrap();
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "registry_snapshot_changed", "data": {"version": 7}})
        );

        let sample = TelemetrySample::new(SensorKind::Gas, 1.0, 0.0, SampleSource::Simulated);
        let msg = WsMessage::from_event(&registry, Event::TelemetrySample(sample)).unwrap();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "telemetry_sample");
        assert_eq!(value["data"]["sensor_kind"], "gas");

        assert_eq!(serde_json::to_value(&WsMessage::Pong).unwrap(), json!({"type": "pong"}));
    }
}
