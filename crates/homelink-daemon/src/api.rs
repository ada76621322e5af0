//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use homelink_core::{BackendError, ControlAction, ControlParams, DeviceId, ErrorKind, SensorKind};
use homelink_discovery::arp::probe_interfaces;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            kind: None,
        }
    }

    fn response(status: StatusCode, msg: impl Into<String>) -> Response {
        (status, Json(Self::new(msg))).into_response()
    }
}

/// HTTP status for a failed control request
fn status_for(error: &BackendError) -> StatusCode {
    match error.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unsupported => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Transient | ErrorKind::Permanent => StatusCode::BAD_GATEWAY,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
    }
}

/// Control failure carried to the client with its kind
struct BackendErrorResponse(BackendError);

impl IntoResponse for BackendErrorResponse {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = ApiError {
            error: self.0.to_string(),
            kind: Some(self.0.kind()),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct DeviceList<'a> {
    version: u64,
    devices: Vec<&'a homelink_core::Device>,
}

/// List all known devices from the current snapshot
pub async fn list_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.list_devices();
    Json(DeviceList {
        version: snapshot.version,
        devices: snapshot.devices().collect(),
    })
    .into_response()
}

/// Get a specific device by ID
pub async fn get_device(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    match state.get_device(&DeviceId::from(id)) {
        Some(device) => Json(device).into_response(),
        None => ApiError::response(StatusCode::NOT_FOUND, "Device not found"),
    }
}

/// Control request body
#[derive(Debug, Deserialize)]
pub struct ControlBody {
    action: String,
    #[serde(default)]
    params: ControlParams,
    /// Overall deadline for the request, retries included
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// Run a control action against a device and return its updated record
pub async fn control_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ControlBody>,
) -> Response {
    let action: ControlAction = match body.action.parse() {
        Ok(action) => action,
        Err(e) => return ApiError::response(StatusCode::BAD_REQUEST, format!("{e}")),
    };

    info!(device = %id, action = %action, "Control requested");

    let timeout = body.timeout_ms.map(Duration::from_millis);
    match state.control_device(DeviceId::from(id.clone()), action, body.params, timeout).await {
        Ok(device) => Json(device).into_response(),
        Err(e) => {
            warn!(device = %id, action = %action, error = %e, "Control failed");
            BackendErrorResponse(e).into_response()
        }
    }
}

/// Trigger a discovery cycle
pub async fn trigger_scan(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let started = state.trigger_discovery();
    if started {
        info!("Manual discovery triggered");
    } else {
        debug!("Manual discovery coalesced into running cycle");
    }
    let status = if started { "started" } else { "already_running" };
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "status": status })))
}

/// Discovery and registry status
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let phase = *state.orchestrator.phase().borrow();
    let snapshot = state.list_devices();
    Json(serde_json::json!({
        "version": snapshot.version,
        "devices": snapshot.len(),
        "phase": phase,
        "backends": state.orchestrator.backends(),
        "subscribers": state.events.subscriber_count(),
    }))
}

/// Latest sample and retained history of every sensor kind
pub async fn list_telemetry(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let history = state.telemetry.all_history().await;
    let body: serde_json::Map<String, serde_json::Value> = history
        .into_iter()
        .map(|(kind, samples)| {
            let value = serde_json::json!({
                "latest": samples.last(),
                "history": samples,
            });
            (kind.as_str().to_string(), value)
        })
        .collect();
    Json(body)
}

/// Latest sample of one sensor kind
pub async fn get_telemetry(State(state): State<Arc<AppState>>, Path(kind): Path<String>) -> Response {
    let kind: SensorKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return ApiError::response(StatusCode::BAD_REQUEST, format!("{e}")),
    };
    match state.latest_telemetry(kind).await {
        Some(sample) => Json(sample).into_response(),
        None => ApiError::response(StatusCode::NOT_FOUND, format!("No {kind} sample yet")),
    }
}

/// Effective configuration, hub token redacted
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.redacted())
}

#[derive(Serialize)]
struct InterfaceInfo {
    name: String,
    ip: String,
}

/// Interfaces the network probe can scan
pub async fn list_interfaces() -> impl IntoResponse {
    let interfaces: Vec<InterfaceInfo> = probe_interfaces()
        .into_iter()
        .map(|(name, ip)| InterfaceInfo {
            name,
            ip: ip.to_string(),
        })
        .collect();
    Json(interfaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::router;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn offline_config() -> Config {
        let mut config = Config::default();
        config.network.enabled = false;
        config.radio.enabled = false;
        config.hub.enabled = false;
        config.telemetry.hardware_enabled = false;
        config
    }

    async fn hub_config() -> (MockServer, Config) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "entity_id": "light.kitchen",
                "state": "off",
                "attributes": {"friendly_name": "Kitchen Light"}
            }])))
            .mount(&server)
            .await;

        let mut config = offline_config();
        config.hub.enabled = true;
        config.hub.url = server.uri();
        config.hub.token = Some("test-token".into());
        config.hub.timeout_secs = 2;
        config.control.retry_backoff_ms = 10;
        (server, config)
    }

    async fn send(state: Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_error_status_mapping() {
        let id = DeviceId::from("hub:light.kitchen");
        assert_eq!(status_for(&BackendError::NotFound(id.clone())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&BackendError::Unsupported {
                backend: homelink_core::Backend::Network,
                device: id,
                action: "on".into(),
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(&BackendError::Transient("503".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&BackendError::Unavailable("hub".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_for(&BackendError::DeadlineExceeded(Duration::from_secs(1))),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[tokio::test]
    async fn test_empty_device_list() {
        let state = AppState::new(offline_config()).unwrap();
        let (status, body) = send(state, get("/api/devices")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], 0);
        assert_eq!(body["devices"], json!([]));
    }

    #[tokio::test]
    async fn test_unknown_device_is_404() {
        let state = AppState::new(offline_config()).unwrap();
        let (status, _) = send(state.clone(), get("/api/devices/hub:light.nowhere")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            state,
            post_json("/api/devices/hub:light.nowhere/control", json!({"action": "on"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_unknown_action_is_400() {
        let state = AppState::new(offline_config()).unwrap();
        let (status, _) = send(
            state,
            post_json("/api/devices/hub:light.kitchen/control", json!({"action": "explode"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_set_brightness_through_api() {
        let (server, config) = hub_config().await;
        Mock::given(method("POST"))
            .and(path("/api/services/light/turn_on"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let state = AppState::new(config).unwrap();
        state.orchestrator.run_cycle().await.unwrap();

        let (status, body) = send(state.clone(), get("/api/devices/hub:light.kitchen")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reachable"], true);

        let (status, body) = send(
            state.clone(),
            post_json(
                "/api/devices/hub:light.kitchen/control",
                json!({"action": "set", "params": {"brightness": 80}, "timeout_ms": 5000}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"]["brightness"], 80);

        let device = state.get_device(&DeviceId::from("hub:light.kitchen")).unwrap();
        assert_eq!(device.state["brightness"], json!(80));
    }

    #[tokio::test]
    async fn test_hub_failure_maps_to_bad_gateway() {
        let (server, config) = hub_config().await;
        Mock::given(method("POST"))
            .and(path("/api/services/light/turn_on"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let state = AppState::new(config).unwrap();
        state.orchestrator.run_cycle().await.unwrap();
        let version = state.list_devices().version;

        let (status, body) = send(
            state.clone(),
            post_json("/api/devices/hub:light.kitchen/control", json!({"action": "on"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "transient");
        assert_eq!(state.list_devices().version, version);
    }

    #[tokio::test]
    async fn test_trigger_scan_accepted() {
        let state = AppState::new(offline_config()).unwrap();
        let (status, body) = send(state, post_json("/api/scan", json!({}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body["status"] == "started" || body["status"] == "already_running");
    }

    #[tokio::test]
    async fn test_telemetry_endpoints() {
        let state = AppState::new(offline_config()).unwrap();
        let (status, _) = send(state.clone(), get("/api/telemetry/temperature")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(state.clone(), get("/api/telemetry/pressure")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        state.telemetry.tick().await;

        let (status, body) = send(state.clone(), get("/api/telemetry/temperature")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sensor_kind"], "temperature");
        assert_eq!(body["source"], "simulated");

        let (status, body) = send(state, get("/api/telemetry")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["humidity"]["history"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_config_redacts_token() {
        let mut config = offline_config();
        config.hub.token = Some("very-secret".into());
        let state = AppState::new(config).unwrap();
        let (status, body) = send(state, get("/api/config")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hub"]["token"], "********");
        assert!(!body.to_string().contains("very-secret"));
    }

    #[tokio::test]
    async fn test_status_reports_phase() {
        let state = AppState::new(offline_config()).unwrap();
        let (status, body) = send(state, get("/api/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "idle");
        assert_eq!(body["version"], 0);
    }
}
