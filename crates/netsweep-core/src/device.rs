//! Records produced by a discovery run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// How a device was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    /// Answered an ARP broadcast on a local segment
    Arp,
    /// Answered a TCP connect probe or has a reverse-DNS name
    Tcp,
}

/// A local network interface with an IPv4 address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    pub ipv4: Ipv4Addr,
    /// Whether the default IPv4 route goes out through this interface
    pub is_default_gateway: bool,
}

/// Address and netmask of the interface carrying the default route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub ip: Ipv4Addr,
    pub prefix_len: u8,
    pub interface: String,
}

/// A discovered device
///
/// ARP discovery fills `mac_address` and `interface` and leaves `open_ports`
/// unset. TCP probing always fills `open_ports` (possibly empty) and never
/// knows the MAC address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub ip_address: Ipv4Addr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_ports: Option<Vec<u16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    pub discovery_method: DiscoveryMethod,
    pub last_seen: DateTime<Utc>,
}

impl Device {
    /// Device seen in an ARP reply on `interface`
    pub fn from_arp_reply(ip: Ipv4Addr, mac: String, interface: &str) -> Self {
        Self {
            ip_address: ip,
            mac_address: Some(mac),
            hostname: None,
            open_ports: None,
            interface: Some(interface.to_string()),
            discovery_method: DiscoveryMethod::Arp,
            last_seen: Utc::now(),
        }
    }

    /// Device from a TCP probe, or `None` if the address showed no sign of
    /// life (no hostname and no open port)
    pub fn from_probe(ip: Ipv4Addr, hostname: Option<String>, open_ports: Vec<u16>) -> Option<Self> {
        if hostname.is_none() && open_ports.is_empty() {
            return None;
        }
        Some(Self {
            ip_address: ip,
            mac_address: None,
            hostname,
            open_ports: Some(open_ports),
            interface: None,
            discovery_method: DiscoveryMethod::Tcp,
            last_seen: Utc::now(),
        })
    }

    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname;
        self
    }
}
