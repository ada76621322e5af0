//! Normalized control requests

use crate::device::{DeviceId, DeviceState};
use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Action parameters, passed verbatim to the adapter
pub type ControlParams = Map<String, Value>;

/// Normalized control action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    On,
    Off,
    Toggle,
    /// Set one or more state fields named by the params
    Set,
    Lock,
    Unlock,
    Open,
    Close,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Toggle => "toggle",
            Self::Set => "set",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::Open => "open",
            Self::Close => "close",
        }
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlAction {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "turn_on" => Ok(Self::On),
            "off" | "turn_off" => Ok(Self::Off),
            "toggle" => Ok(Self::Toggle),
            "set" => Ok(Self::Set),
            "lock" => Ok(Self::Lock),
            "unlock" => Ok(Self::Unlock),
            "open" => Ok(Self::Open),
            "close" => Ok(Self::Close),
            other => Err(BackendError::Permanent(format!("unknown action '{other}'"))),
        }
    }
}

/// A request to change one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub device_id: DeviceId,
    pub action: ControlAction,
    #[serde(default)]
    pub params: ControlParams,
}

impl ControlRequest {
    pub fn new(device_id: impl Into<DeviceId>, action: ControlAction) -> Self {
        Self {
            device_id: device_id.into(),
            action,
            params: ControlParams::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// State fields implied by a successful action.
///
/// `set` reflects its params verbatim; the switching actions map onto the
/// `on`, `locked` and `open` fields. `toggle` flips `open` on devices that
/// carry it and `on` everywhere else.
pub fn resulting_state(action: ControlAction, params: &ControlParams, current: &DeviceState) -> DeviceState {
    let mut fields = DeviceState::new();
    match action {
        ControlAction::On => {
            fields.insert("on".into(), Value::Bool(true));
        }
        ControlAction::Off => {
            fields.insert("on".into(), Value::Bool(false));
        }
        ControlAction::Toggle => {
            // Covers toggle between open and closed
            let field = if current.contains_key("open") { "open" } else { "on" };
            let was_set = current.get(field).and_then(Value::as_bool).unwrap_or(false);
            fields.insert(field.into(), Value::Bool(!was_set));
        }
        ControlAction::Lock => {
            fields.insert("locked".into(), Value::Bool(true));
        }
        ControlAction::Unlock => {
            fields.insert("locked".into(), Value::Bool(false));
        }
        ControlAction::Open => {
            fields.insert("open".into(), Value::Bool(true));
        }
        ControlAction::Close => {
            fields.insert("open".into(), Value::Bool(false));
        }
        ControlAction::Set => {}
    }
    // Params always land verbatim, so `on` + `brightness=80` records both
    for (key, value) in params {
        fields.insert(key.clone(), value.clone());
    }
    fields
}
