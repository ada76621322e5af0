//! Hub entity model and its mapping onto Homelink devices

use chrono::{DateTime, Utc};
use homelink_core::{
    Backend, ControlAction, ControlParams, Device, DeviceAddress, DeviceKind,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity state as returned by `GET /api/states`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,
}

impl EntityState {
    pub fn domain(&self) -> &str {
        domain_of(&self.entity_id)
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(Value::as_str)
    }
}

/// `light.kitchen` -> `light`
pub fn domain_of(entity_id: &str) -> &str {
    entity_id.split_once('.').map(|(domain, _)| domain).unwrap_or(entity_id)
}

/// Device kind for an entity domain; `None` for domains that are not devices
/// (zones, automations, people, ...)
pub fn kind_for_domain(domain: &str) -> Option<DeviceKind> {
    let kind = match domain {
        "light" => DeviceKind::Light,
        "switch" | "fan" | "input_boolean" => DeviceKind::Switch,
        "sensor" | "binary_sensor" => DeviceKind::Sensor,
        "climate" => DeviceKind::Climate,
        "lock" => DeviceKind::Lock,
        "media_player" => DeviceKind::Media,
        "camera" => DeviceKind::Camera,
        "cover" | "vacuum" => DeviceKind::Unknown,
        _ => return None,
    };
    Some(kind)
}

/// Attributes carried over into the device state
const STATE_ATTRIBUTES: &[&str] = &[
    "brightness",
    "color_temp",
    "temperature",
    "current_temperature",
    "hvac_action",
    "volume_level",
    "percentage",
    "current_position",
    "unit_of_measurement",
    "device_class",
];

/// Normalize a hub entity, or `None` if its domain is not a device
pub fn entity_to_device(entity: &EntityState) -> Option<Device> {
    let domain = entity.domain();
    let kind = kind_for_domain(domain)?;
    let name = entity.friendly_name().unwrap_or(&entity.entity_id).to_string();

    let mut device = Device::new(
        Backend::Hub,
        kind,
        name,
        DeviceAddress::Hub {
            entity_id: entity.entity_id.clone(),
        },
    )
    .with_state("state", entity.state.as_str());
    device.reachable = entity.state != "unavailable";

    match (domain, entity.state.as_str()) {
        ("lock", s) => device = device.with_state("locked", s == "locked"),
        ("cover", s) => device = device.with_state("open", s == "open"),
        ("sensor", s) => {
            if let Ok(value) = s.parse::<f64>() {
                device = device.with_state("value", value);
            }
        }
        (_, "on") => device = device.with_state("on", true),
        (_, "off") => device = device.with_state("on", false),
        _ => {}
    }

    for key in STATE_ATTRIBUTES {
        if let Some(value) = entity.attributes.get(*key) {
            if !value.is_null() {
                device.state.insert((*key).to_string(), value.clone());
            }
        }
    }

    Some(device)
}

/// A hub service invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    /// Request body; always carries `entity_id`
    pub data: Map<String, Value>,
}

impl ServiceCall {
    fn new(domain: &str, service: &str, entity_id: &str) -> Self {
        let mut data = Map::new();
        data.insert("entity_id".into(), Value::String(entity_id.to_string()));
        Self {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        }
    }

    fn with_params(mut self, params: &ControlParams) -> Self {
        for (key, value) in params {
            if key != "entity_id" {
                self.data.insert(key.clone(), value.clone());
            }
        }
        self
    }
}

/// Translate a normalized action into a hub service call.
///
/// Returns `None` when the entity's domain has no service for the action.
pub fn service_for(entity_id: &str, action: ControlAction, params: &ControlParams) -> Option<ServiceCall> {
    let domain = domain_of(entity_id);
    let switchable = matches!(
        domain,
        "light" | "switch" | "fan" | "input_boolean" | "media_player" | "climate"
    );

    let service = match (action, domain) {
        (ControlAction::On, _) if switchable => "turn_on",
        (ControlAction::Off, _) if switchable => "turn_off",
        (ControlAction::Toggle, "climate") => return None,
        (ControlAction::Toggle, "cover") => "toggle",
        (ControlAction::Toggle, _) if switchable => "toggle",
        (ControlAction::Lock, "lock") => "lock",
        (ControlAction::Unlock, "lock") => "unlock",
        (ControlAction::Open, "cover") => "open_cover",
        (ControlAction::Close, "cover") => "close_cover",
        (ControlAction::Set, "light") => "turn_on",
        (ControlAction::Set, "climate") => "set_temperature",
        (ControlAction::Set, "media_player") => "volume_set",
        (ControlAction::Set, "fan") => "set_percentage",
        (ControlAction::Set, "cover") => "set_cover_position",
        _ => return None,
    };

    Some(ServiceCall::new(domain, service, entity_id).with_params(params))
}
