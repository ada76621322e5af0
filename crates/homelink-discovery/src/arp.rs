//! Local-network probe
//!
//! Enumerates hosts with `arp-scan --localnet --plain`, falling back to the
//! kernel neighbour table (`ip neigh show`) when arp-scan is missing or
//! fails. Neither tool being present yields an empty scan.

use async_trait::async_trait;
use homelink_core::{
    Backend, BackendResult, ControlAction, ControlParams, Device, DeviceAddress, DeviceKind,
    DeviceState,
};
use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::adapter::{unsupported, BackendAdapter};
use crate::tool;

/// Neighbour table entry
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborEntry {
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
    pub interface: Option<String>,
    /// Manufacturer as resolved by arp-scan's OUI table
    pub vendor: Option<String>,
    pub state: NeighborState,
}

/// Kernel neighbour state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    Reachable,
    Stale,
    Delay,
    Probe,
    Failed,
    Incomplete,
    Permanent,
    Unknown,
}

impl NeighborState {
    /// States that say nothing answered at this address
    fn is_dead(self) -> bool {
        matches!(self, Self::Failed | Self::Incomplete)
    }
}

/// Parse a line of `arp-scan --plain` output
/// (`192.168.1.20\taa:bb:cc:dd:ee:ff\tPhilips Lighting BV`)
pub fn parse_arp_scan_line(line: &str) -> Option<NeighborEntry> {
    let mut parts = line.split('\t');
    let ip = Ipv4Addr::from_str(parts.next()?.trim()).ok()?;
    let mac = parts.next()?.trim();
    if !mac.contains(':') {
        return None;
    }
    let vendor = parts
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.starts_with("(Unknown"))
        .map(str::to_string);

    Some(NeighborEntry {
        ip,
        mac: Some(mac.to_string()),
        interface: None,
        vendor,
        state: NeighborState::Reachable,
    })
}

/// Parse a line from `ip neigh show` output
/// (`192.168.1.1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE`)
pub fn parse_ip_neigh_line(line: &str) -> Option<NeighborEntry> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }

    let ip = Ipv4Addr::from_str(parts[0]).ok()?;
    let dev_idx = parts.iter().position(|&p| p == "dev")?;
    let interface = parts.get(dev_idx + 1)?.to_string();

    // No lladdr on INCOMPLETE/FAILED entries
    let mac = parts
        .iter()
        .position(|&p| p == "lladdr")
        .and_then(|idx| parts.get(idx + 1))
        .map(|s| s.to_string());

    let state = parts.last().map(|s| parse_neighbor_state(s)).unwrap_or(NeighborState::Unknown);

    Some(NeighborEntry {
        ip,
        mac,
        interface: Some(interface),
        vendor: None,
        state,
    })
}

fn parse_neighbor_state(s: &str) -> NeighborState {
    match s.to_uppercase().as_str() {
        "REACHABLE" => NeighborState::Reachable,
        "STALE" => NeighborState::Stale,
        "DELAY" => NeighborState::Delay,
        "PROBE" => NeighborState::Probe,
        "FAILED" => NeighborState::Failed,
        "INCOMPLETE" => NeighborState::Incomplete,
        "PERMANENT" => NeighborState::Permanent,
        _ => NeighborState::Unknown,
    }
}

/// Guess a device kind from its manufacturer or name
pub fn classify(vendor: Option<&str>, name: &str) -> DeviceKind {
    const RULES: &[(&[&str], DeviceKind)] = &[
        (&["philips", "hue", "lifx", "yeelight"], DeviceKind::Light),
        (&["tp-link", "kasa", "wemo", "tuya"], DeviceKind::Switch),
        (&["sonos", "amazon", "echo", "google", "nest"], DeviceKind::Media),
        (&["ring", "arlo"], DeviceKind::Camera),
    ];

    let haystack = format!("{} {}", vendor.unwrap_or_default(), name).to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| haystack.contains(k)))
        .map(|(_, kind)| *kind)
        .unwrap_or_default()
}

/// Interfaces worth probing: up, IPv4-addressed, not loopback or container
/// bridges. Returns `(name, own address)` pairs.
pub fn probe_interfaces() -> Vec<(String, Ipv4Addr)> {
    NetworkInterface::show()
        .unwrap_or_default()
        .into_iter()
        .filter(|iface| {
            !iface.name.starts_with("lo")
                && !iface.name.starts_with("docker")
                && !iface.name.starts_with("br-")
                && !iface.name.starts_with("veth")
        })
        .filter_map(|iface| {
            iface.addr.iter().find_map(|addr| match addr {
                network_interface::Addr::V4(v4) if !v4.ip.is_loopback() => Some((iface.name.clone(), v4.ip)),
                _ => None,
            })
        })
        .collect()
}

/// Local-network probe adapter
#[derive(Debug, Clone, Default)]
pub struct NetworkProbe {
    /// Interface to scan; the first probe-worthy interface when unset
    interface: Option<String>,
}

impl NetworkProbe {
    pub fn new(interface: Option<String>) -> Self {
        Self {
            interface: interface.filter(|i| !i.is_empty()),
        }
    }

    async fn arp_scan(&self, interface: Option<&str>, timeout: Duration) -> BackendResult<Option<Vec<NeighborEntry>>> {
        let iface_arg = interface.map(|i| format!("--interface={i}"));
        let mut args = vec!["--localnet", "--plain", "--quiet"];
        if let Some(arg) = iface_arg.as_deref() {
            args.push(arg);
        }

        let Some(stdout) = tool::run("arp-scan", &args, timeout).await? else {
            return Ok(None);
        };
        Ok(Some(stdout.lines().filter_map(parse_arp_scan_line).collect()))
    }

    async fn neighbor_table(&self, timeout: Duration) -> BackendResult<Vec<NeighborEntry>> {
        let Some(stdout) = tool::run("ip", &["-4", "neigh", "show"], timeout).await? else {
            return Ok(Vec::new());
        };
        Ok(stdout.lines().filter_map(parse_ip_neigh_line).collect())
    }
}

#[async_trait]
impl BackendAdapter for NetworkProbe {
    fn backend(&self) -> Backend {
        Backend::Network
    }

    fn supports(&self, _device: &Device, _action: ControlAction) -> bool {
        false
    }

    async fn scan(&self, timeout: Duration) -> BackendResult<Vec<Device>> {
        let interfaces = probe_interfaces();
        let interface = self
            .interface
            .clone()
            .or_else(|| interfaces.first().map(|(name, _)| name.clone()));
        let own_addrs: Vec<Ipv4Addr> = interfaces.iter().map(|(_, ip)| *ip).collect();

        let entries = match self.arp_scan(interface.as_deref(), timeout).await {
            Ok(Some(entries)) => entries,
            Ok(None) => {
                debug!("arp-scan not installed, reading neighbour table");
                self.neighbor_table(timeout).await?
            }
            Err(e) => {
                warn!(error = %e, "arp-scan failed, reading neighbour table");
                self.neighbor_table(timeout).await?
            }
        };

        // Keyed by id so a host listed twice (arp-scan reports duplicates
        // on some switches) yields one device
        let mut devices = BTreeMap::new();
        for entry in entries {
            if entry.state.is_dead() || own_addrs.contains(&entry.ip) {
                continue;
            }
            if let (Some(wanted), Some(actual)) = (interface.as_deref(), entry.interface.as_deref()) {
                if wanted != actual {
                    continue;
                }
            }
            let device = entry_to_device(entry);
            devices.insert(device.id.clone(), device);
        }

        info!(count = devices.len(), "Network probe complete");
        Ok(devices.into_values().collect())
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

fn entry_to_device(entry: NeighborEntry) -> Device {
    let name = entry.vendor.clone().unwrap_or_else(|| entry.ip.to_string());
    let kind = classify(entry.vendor.as_deref(), &name);
    let mut device = Device::new(
        Backend::Network,
        kind,
        name,
        DeviceAddress::Network {
            ip: IpAddr::V4(entry.ip),
            mac: entry.mac,
        },
    );
    device.vendor = entry.vendor;
    device
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_neigh_line_reachable() {
        let entry = parse_ip_neigh_line("192.168.1.100 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE").unwrap();
        assert_eq!(entry.ip, Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(entry.mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(entry.interface.as_deref(), Some("eth0"));
        assert_eq!(entry.state, NeighborState::Reachable);
    }

    #[test]
    fn test_parse_incomplete_line() {
        let entry = parse_ip_neigh_line("192.168.1.100 dev eth0 INCOMPLETE").unwrap();
        assert_eq!(entry.mac, None);
        assert!(entry.state.is_dead());
    }

    #[test]
    fn test_parse_too_short() {
        assert!(parse_ip_neigh_line("192.168.1.100 dev").is_none());
    }

    #[test]
    fn test_parse_arp_scan_line() {
        let entry = parse_arp_scan_line("192.168.1.20\t00:17:88:aa:bb:cc\tPhilips Lighting BV").unwrap();
        assert_eq!(entry.ip, Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(entry.vendor.as_deref(), Some("Philips Lighting BV"));

        let entry = parse_arp_scan_line("192.168.1.21\t02:00:00:00:00:01\t(Unknown: locally administered)").unwrap();
        assert_eq!(entry.vendor, None);

        assert!(parse_arp_scan_line("Interface: eth0, type: EN10MB").is_none());
    }

    #[test]
    fn test_vendor_classification() {
        assert_eq!(classify(Some("Philips Lighting BV"), ""), DeviceKind::Light);
        assert_eq!(classify(Some("TP-LINK TECHNOLOGIES CO.,LTD."), ""), DeviceKind::Switch);
        assert_eq!(classify(Some("Sonos, Inc."), ""), DeviceKind::Media);
        assert_eq!(classify(None, "ring-doorbell"), DeviceKind::Camera);
        assert_eq!(classify(Some("Intel Corporate"), "192.168.1.4"), DeviceKind::Unknown);
    }

    #[test]
    fn test_entry_to_device_keys_on_mac() {
        let device = entry_to_device(parse_arp_scan_line("192.168.1.20\t00:17:88:AA:BB:CC\tPhilips Lighting BV").unwrap());
        assert_eq!(device.id.as_str(), "net:001788aabbcc");
        assert_eq!(device.kind, DeviceKind::Light);
        assert_eq!(device.vendor.as_deref(), Some("Philips Lighting BV"));
    }

    #[tokio::test]
    async fn test_network_probe_never_controls() {
        let probe = NetworkProbe::default();
        let device = entry_to_device(parse_arp_scan_line("192.168.1.20\t00:17:88:aa:bb:cc\tLIFX").unwrap());
        assert!(!probe.supports(&device, ControlAction::On));
        let err = probe
            .control(&device, ControlAction::On, &ControlParams::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), homelink_core::ErrorKind::Unsupported);
    }
}
