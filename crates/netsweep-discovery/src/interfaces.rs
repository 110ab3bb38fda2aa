//! Local interface enumeration and default range detection

use anyhow::Result;
use netsweep_core::{Interface, NetworkInfo, DEFAULT_RANGE};
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use std::net::{Ipv4Addr, UdpSocket};
use std::process::Command;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Address the UDP fallback "connects" to; no packet is sent
const EXTERNAL_PROBE_ADDR: &str = "8.8.8.8:80";

/// List local interfaces with a non-loopback IPv4 address
///
/// An interface with several IPv4 addresses appears once per address.
pub fn list_interfaces() -> Vec<Interface> {
    let gateway = match default_gateway_interface() {
        Ok(gateway) => gateway,
        Err(e) => {
            debug!(error = %e, "Could not determine default route");
            None
        }
    };

    let raw = match NetworkInterface::show() {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Failed to enumerate network interfaces");
            return Vec::new();
        }
    };

    let entries = raw.into_iter().flat_map(|iface| {
        let name = iface.name;
        iface.addr.into_iter().filter_map(move |addr| match addr {
            Addr::V4(v4) => Some((name.clone(), v4.ip)),
            Addr::V6(_) => None,
        })
    });

    let interfaces = select_ipv4(entries, gateway.as_deref());
    for iface in &interfaces {
        info!(
            interface = %iface.name,
            ip = %iface.ipv4,
            default_gateway = iface.is_default_gateway,
            "Found interface"
        );
    }
    interfaces
}

/// Best guess at this machine's LAN address. Never fails: falls back to the
/// UDP socket trick and finally to `127.0.0.1`.
pub fn get_local_ip() -> Ipv4Addr {
    if let Some(ip) = select_local_ip(&list_interfaces()) {
        return ip;
    }

    match udp_local_ip() {
        Ok(ip) => {
            info!(ip = %ip, "Local IP found via UDP socket");
            ip
        }
        Err(e) => {
            warn!(error = %e, "Could not determine local IP, using loopback");
            Ipv4Addr::LOCALHOST
        }
    }
}

/// The /24 containing `ip`, e.g. `192.168.1.37` -> `192.168.1.0/24`
pub fn get_network_range(ip: &str) -> Option<String> {
    let ip = Ipv4Addr::from_str(ip.trim()).ok()?;
    let [a, b, c, _] = ip.octets();
    Some(format!("{a}.{b}.{c}.0/24"))
}

/// Address, prefix length and name of the interface carrying the default route
pub fn network_info() -> Option<NetworkInfo> {
    let gateway = default_gateway_interface().ok().flatten()?;
    let interfaces = NetworkInterface::show().ok()?;

    interfaces
        .into_iter()
        .filter(|iface| iface.name == gateway)
        .find_map(|iface| {
            iface.addr.iter().find_map(|addr| match addr {
                Addr::V4(v4) if !v4.ip.is_loopback() => Some(NetworkInfo {
                    ip: v4.ip,
                    prefix_len: v4
                        .netmask
                        .map(|mask| u32::from(mask).count_ones() as u8)
                        .unwrap_or(24),
                    interface: iface.name.clone(),
                }),
                _ => None,
            })
        })
}

/// Range to probe when the caller did not give one
pub fn detect_default_range() -> String {
    range_for_local_ip(get_local_ip())
}

fn range_for_local_ip(ip: Ipv4Addr) -> String {
    if ip.is_loopback() {
        warn!("No usable interface found, falling back to {}", DEFAULT_RANGE);
        return DEFAULT_RANGE.to_string();
    }
    match get_network_range(&ip.to_string()) {
        Some(range) => {
            info!(range = %range, "Detected network range");
            range
        }
        None => DEFAULT_RANGE.to_string(),
    }
}

/// Name of the interface the default IPv4 route uses, if any
pub fn default_gateway_interface() -> Result<Option<String>> {
    #[cfg(target_os = "linux")]
    {
        let output = Command::new("ip")
            .args(["-4", "route", "show", "default"])
            .output()?;
        if !output.status.success() {
            anyhow::bail!(
                "Failed to read default route: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(parse_ip_route_default(&String::from_utf8_lossy(&output.stdout)))
    }

    #[cfg(target_os = "macos")]
    {
        let output = Command::new("route")
            .args(["-n", "get", "default"])
            .output()?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(parse_route_get_default(&String::from_utf8_lossy(&output.stdout)))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Ok(None)
    }
}

/// Parse `ip route show default` output
/// Format: "default via 192.168.1.1 dev eth0 proto dhcp metric 100"
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_ip_route_default(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.first() != Some(&"default") {
            return None;
        }
        let dev_idx = parts.iter().position(|&p| p == "dev")?;
        parts.get(dev_idx + 1).map(|s| s.to_string())
    })
}

/// Parse `route -n get default` output
/// Format: "  interface: en0"
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_route_get_default(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let value = line.trim().strip_prefix("interface:")?.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn select_ipv4(
    entries: impl IntoIterator<Item = (String, Ipv4Addr)>,
    gateway: Option<&str>,
) -> Vec<Interface> {
    let mut interfaces: Vec<Interface> = Vec::new();
    for (name, ipv4) in entries {
        // 127.0.0.0/8
        if ipv4.is_loopback() {
            continue;
        }
        if interfaces.iter().any(|i| i.name == name && i.ipv4 == ipv4) {
            continue;
        }
        let is_default_gateway = gateway == Some(name.as_str());
        interfaces.push(Interface {
            name,
            ipv4,
            is_default_gateway,
        });
    }
    interfaces
}

fn select_local_ip(interfaces: &[Interface]) -> Option<Ipv4Addr> {
    interfaces
        .iter()
        .find(|i| i.is_default_gateway)
        .or_else(|| interfaces.first())
        .map(|i| i.ipv4)
}

fn udp_local_ip() -> std::io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(EXTERNAL_PROBE_ADDR)?;
    match socket.local_addr()?.ip() {
        std::net::IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
        other => Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("unexpected local address {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, ip: [u8; 4]) -> (String, Ipv4Addr) {
        (name.to_string(), Ipv4Addr::from(ip))
    }

    #[test]
    fn test_network_range() {
        assert_eq!(
            get_network_range("192.168.1.37"),
            Some("192.168.1.0/24".to_string())
        );
        assert_eq!(get_network_range("10.0.5"), None);
        assert_eq!(get_network_range("a.b.c.d"), None);
    }

    #[test]
    fn test_loopback_falls_back_to_default_range() {
        assert_eq!(range_for_local_ip(Ipv4Addr::LOCALHOST), "192.168.1.0/24");
        assert_eq!(range_for_local_ip(Ipv4Addr::new(127, 3, 0, 1)), "192.168.1.0/24");
        assert_eq!(range_for_local_ip(Ipv4Addr::new(10, 20, 30, 40)), "10.20.30.0/24");
    }

    #[test]
    fn test_select_ipv4_skips_loopback() {
        let interfaces = select_ipv4(
            vec![
                entry("lo", [127, 0, 0, 1]),
                entry("eth0", [192, 168, 1, 10]),
                entry("eth0", [192, 168, 1, 10]),
                entry("wlan0", [10, 0, 0, 5]),
            ],
            Some("wlan0"),
        );
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[0].name, "eth0");
        assert!(!interfaces[0].is_default_gateway);
        assert!(interfaces[1].is_default_gateway);
    }

    #[test]
    fn test_local_ip_prefers_default_gateway() {
        let interfaces = select_ipv4(
            vec![entry("docker0", [172, 17, 0, 1]), entry("eth0", [192, 168, 1, 10])],
            Some("eth0"),
        );
        assert_eq!(select_local_ip(&interfaces), Some(Ipv4Addr::new(192, 168, 1, 10)));

        let interfaces = select_ipv4(vec![entry("docker0", [172, 17, 0, 1])], None);
        assert_eq!(select_local_ip(&interfaces), Some(Ipv4Addr::new(172, 17, 0, 1)));
        assert_eq!(select_local_ip(&[]), None);
    }

    #[test]
    fn test_parse_ip_route_default() {
        let output = "default via 192.168.1.1 dev wlp2s0 proto dhcp src 192.168.1.37 metric 600\n";
        assert_eq!(parse_ip_route_default(output), Some("wlp2s0".to_string()));
        assert_eq!(parse_ip_route_default(""), None);
        assert_eq!(
            parse_ip_route_default("10.0.0.0/8 dev tun0 scope link\n"),
            None
        );
    }

    #[test]
    fn test_parse_route_get_default() {
        let output = "   route to: default\ndestination: default\n    gateway: 192.168.1.1\n  interface: en0\n";
        assert_eq!(parse_route_get_default(output), Some("en0".to_string()));
        assert_eq!(parse_route_get_default("route: writing to routing socket: not in table"), None);
    }

    #[test]
    fn test_get_local_ip_is_usable_or_loopback() {
        let ip = get_local_ip();
        assert!(!ip.is_unspecified());
        // Any 127/8 answer is the final fallback, never another loopback address
        assert!(!ip.is_loopback() || ip == Ipv4Addr::LOCALHOST);
    }
}
