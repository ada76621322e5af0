//! Short-range radio probe
//!
//! Runs a bounded `bluetoothctl` discovery, lists the devices the controller
//! knows about and enriches each one from `bluetoothctl info`.

use async_trait::async_trait;
use homelink_core::{
    Backend, BackendResult, ControlAction, ControlParams, Device, DeviceAddress, DeviceKind,
    DeviceState,
};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::adapter::{unsupported, BackendAdapter};
use crate::tool;

/// Upper bound for a single `bluetoothctl info` call
const INFO_TIMEOUT: Duration = Duration::from_secs(2);

/// Details from `bluetoothctl info <mac>`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadioInfo {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub rssi: Option<i16>,
    pub paired: Option<bool>,
    pub connected: Option<bool>,
}

/// Parse a `Device AA:BB:CC:DD:EE:FF Name` line
pub fn parse_device_line(line: &str) -> Option<(String, String)> {
    let rest = line.trim().strip_prefix("Device ")?;
    let (mac, name) = match rest.split_once(' ') {
        Some((mac, name)) => (mac, name.trim()),
        None => (rest, ""),
    };
    if mac.len() != 17 || mac.matches(':').count() != 5 {
        return None;
    }
    Some((mac.to_string(), name.to_string()))
}

/// Parse `bluetoothctl info` output
pub fn parse_info(output: &str) -> RadioInfo {
    let mut info = RadioInfo::default();
    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key {
            "Name" => info.name = Some(value.to_string()),
            "Icon" => info.icon = Some(value.to_string()),
            "Paired" => info.paired = Some(value == "yes"),
            "Connected" => info.connected = Some(value == "yes"),
            "RSSI" => info.rssi = parse_rssi(value),
            _ => {}
        }
    }
    info
}

/// `-60`, or `0xffffffc4 (-60)` on newer BlueZ
fn parse_rssi(value: &str) -> Option<i16> {
    let value = match (value.find('('), value.find(')')) {
        (Some(open), Some(close)) if open < close => &value[open + 1..close],
        _ => value,
    };
    value.trim().parse().ok()
}

/// Kind from the device's advertised icon
pub fn kind_for_icon(icon: &str) -> DeviceKind {
    if icon.starts_with("audio-") || icon.starts_with("multimedia-") {
        DeviceKind::Media
    } else if icon.starts_with("camera-") {
        DeviceKind::Camera
    } else {
        DeviceKind::Unknown
    }
}

/// Short-range radio probe adapter
#[derive(Debug, Clone)]
pub struct RadioProbe {
    scan_secs: u64,
}

impl Default for RadioProbe {
    fn default() -> Self {
        Self { scan_secs: 8 }
    }
}

impl RadioProbe {
    pub fn new(scan_secs: u64) -> Self {
        Self {
            scan_secs: scan_secs.max(1),
        }
    }
}

#[async_trait]
impl BackendAdapter for RadioProbe {
    fn backend(&self) -> Backend {
        Backend::Radio
    }

    fn supports(&self, _device: &Device, _action: ControlAction) -> bool {
        false
    }

    async fn scan(&self, timeout: Duration) -> BackendResult<Vec<Device>> {
        // Leave room for the listing and info calls after discovery
        let scan_secs = self.scan_secs.min(timeout.as_secs().saturating_sub(3).max(1));
        let secs = scan_secs.to_string();
        if tool::run("bluetoothctl", &["--timeout", &secs, "scan", "on"], timeout)
            .await?
            .is_none()
        {
            debug!("bluetoothctl not installed, radio scan empty");
            return Ok(Vec::new());
        }

        let listing = tool::run("bluetoothctl", &["devices"], INFO_TIMEOUT)
            .await?
            .unwrap_or_default();
        let found: Vec<(String, String)> = listing.lines().filter_map(parse_device_line).collect();

        let mut tasks = JoinSet::new();
        for (mac, name) in found {
            tasks.spawn(async move {
                // A device whose info call fails is still reported, just less enriched
                let info = match tool::run("bluetoothctl", &["info", &mac], INFO_TIMEOUT).await {
                    Ok(Some(out)) => parse_info(&out),
                    _ => RadioInfo::default(),
                };
                radio_device(&mac, &name, info)
            });
        }

        let mut devices = Vec::new();
        while let Some(result) = tasks.join_next().await {
            if let Ok(device) = result {
                devices.push(device);
            }
        }

        info!(count = devices.len(), "Radio probe complete");
        Ok(devices)
    }

    async fn control(
        &self,
        device: &Device,
        action: ControlAction,
        _params: &ControlParams,
        _timeout: Duration,
    ) -> BackendResult<DeviceState> {
        Err(unsupported(device, action))
    }
}

fn radio_device(mac: &str, listed_name: &str, info: RadioInfo) -> Device {
    let name = info
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .or_else(|| Some(listed_name.to_string()).filter(|n| !n.is_empty()))
        .unwrap_or_else(|| mac.to_string());
    let kind = info.icon.as_deref().map(kind_for_icon).unwrap_or_default();

    let mut device = Device::new(Backend::Radio, kind, name, DeviceAddress::Radio { mac: mac.to_string() });
    if let Some(icon) = info.icon {
        device = device.with_state("icon", icon);
    }
    if let Some(rssi) = info.rssi {
        device = device.with_state("rssi", rssi);
    }
    if let Some(paired) = info.paired {
        device = device.with_state("paired", paired);
    }
    if let Some(connected) = info.connected {
        device = device.with_state("connected", connected);
    }
    device
}
