//! Normalized device model shared by every backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Free-form device state (`on`, `brightness`, `temperature`, ...)
pub type DeviceState = BTreeMap<String, Value>;

/// Unique identifier for a device, derived from the backend tag and the
/// backend-native identifier (e.g. `hub:light.kitchen`, `net:aabbccddeeff`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Derive the id for a device seen by `backend` at `address`
    pub fn derive(backend: Backend, address: &DeviceAddress) -> Self {
        Self(format!("{}:{}", backend.tag(), address.native_id()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Device source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local-network probe (ARP scan)
    Network,
    /// Short-range radio probe (Bluetooth)
    Radio,
    /// Home-automation hub entity registry
    Hub,
}

impl Backend {
    /// Short tag used as the id prefix
    pub fn tag(self) -> &'static str {
        match self {
            Self::Network => "net",
            Self::Radio => "radio",
            Self::Hub => "hub",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Radio => "radio",
            Self::Hub => "hub",
        };
        f.write_str(name)
    }
}

/// What a device is, as far as control and presentation are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Light,
    Switch,
    Sensor,
    Climate,
    Lock,
    Media,
    Camera,
    #[default]
    Unknown,
}

/// Protocol-specific locator for a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeviceAddress {
    /// IP host, with its MAC when the neighbour table knows it
    Network { ip: IpAddr, mac: Option<String> },
    /// Radio hardware address
    Radio { mac: String },
    /// Hub entity id (`<domain>.<object_id>`)
    Hub { entity_id: String },
}

impl DeviceAddress {
    /// Backend-native identifier used for identity resolution.
    ///
    /// Network hosts are keyed by MAC so a DHCP lease change does not mint a
    /// new device; hosts without a known MAC fall back to their IP.
    pub fn native_id(&self) -> String {
        match self {
            Self::Network { ip, mac } => match mac {
                Some(mac) if !mac.is_empty() => normalize_mac(mac),
                _ => ip.to_string(),
            },
            Self::Radio { mac } => normalize_mac(mac),
            Self::Hub { entity_id } => entity_id.clone(),
        }
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network { ip, mac: Some(mac) } => write!(f, "{} ({})", ip, mac),
            Self::Network { ip, mac: None } => write!(f, "{}", ip),
            Self::Radio { mac } => f.write_str(mac),
            Self::Hub { entity_id } => f.write_str(entity_id),
        }
    }
}

/// Lowercase a MAC and strip `:`/`-` separators
pub fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(|c| *c != ':' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// A device known to Homelink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable identifier (backend tag + native id)
    pub id: DeviceId,
    /// Backend that reported the device
    pub backend: Backend,
    pub kind: DeviceKind,
    /// Human-readable name
    pub display_name: String,
    pub address: DeviceAddress,
    /// Last known state
    #[serde(default)]
    pub state: DeviceState,
    /// Manufacturer, when the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// When the owning backend last reported the device
    pub last_seen: DateTime<Utc>,
    /// Whether the last scan of the owning backend saw the device
    pub reachable: bool,
    /// Consecutive successful scans that did not report the device
    #[serde(default)]
    pub missed_scans: u32,
}

impl Device {
    /// Create a freshly discovered, reachable device
    pub fn new(
        backend: Backend,
        kind: DeviceKind,
        display_name: impl Into<String>,
        address: DeviceAddress,
    ) -> Self {
        Self {
            id: DeviceId::derive(backend, &address),
            backend,
            kind,
            display_name: display_name.into(),
            address,
            state: DeviceState::new(),
            vendor: None,
            last_seen: Utc::now(),
            reachable: true,
            missed_scans: 0,
        }
    }

    /// Set a state field
    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    /// Hub entity id, if this device lives on the hub
    pub fn entity_id(&self) -> Option<&str> {
        match &self.address {
            DeviceAddress::Hub { entity_id } => Some(entity_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_device_id_prefers_mac_for_network_hosts() {
        let addr = DeviceAddress::Network {
            ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            mac: Some("AA:BB:CC:DD:EE:FF".to_string()),
        };
        assert_eq!(DeviceId::derive(Backend::Network, &addr).as_str(), "net:aabbccddeeff");
    }

    #[test]
    fn test_device_id_falls_back_to_ip() {
        let addr = DeviceAddress::Network {
            ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            mac: None,
        };
        assert_eq!(DeviceId::derive(Backend::Network, &addr).as_str(), "net:192.168.1.20");
    }

    #[test]
    fn test_hub_device_creation() {
        let device = Device::new(
            Backend::Hub,
            DeviceKind::Light,
            "Kitchen",
            DeviceAddress::Hub { entity_id: "light.kitchen".to_string() },
        )
        .with_state("on", true);

        assert_eq!(device.id.as_str(), "hub:light.kitchen");
        assert_eq!(device.entity_id(), Some("light.kitchen"));
        assert!(device.reachable);
        assert_eq!(device.state.get("on"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_same_radio_mac_any_case_same_id() {
        let a = DeviceId::derive(Backend::Radio, &DeviceAddress::Radio { mac: "AA:BB:CC:00:11:22".into() });
        let b = DeviceId::derive(Backend::Radio, &DeviceAddress::Radio { mac: "aa-bb-cc-00-11-22".into() });
        assert_eq!(a, b);
    }
}
