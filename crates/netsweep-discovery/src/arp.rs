//! ARP sweeps for link-layer host discovery
//!
//! Broadcasts one ARP request per host address of an interface's /24 and
//! collects replies for a fixed window. Opening the datalink channel needs
//! raw socket access (root or CAP_NET_RAW on Linux).

use netsweep_core::{AddressInterval, Device, Interface, ProbeError, RangePolicy};
use pnet::datalink::{self, Channel, Config, MacAddr};
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::{MutablePacket, Packet};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::dns::Resolver;
use crate::interfaces::get_network_range;

/// How long to wait for ARP replies on each interface
pub const REPLY_WINDOW: Duration = Duration::from_secs(3);

const ETHERNET_HEADER_LEN: usize = 14;
const ARP_PACKET_LEN: usize = 28;

/// Granularity of the receive loop's deadline check
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// ARP-sweep the /24 around `iface` and resolve hostnames for every reply
pub async fn discover_on_interface(
    iface: &Interface,
    window: Duration,
    resolver: &Resolver,
) -> Result<Vec<Device>, ProbeError> {
    let subnet = interface_subnet(iface)?;
    let sweep_iface = iface.clone();
    let replies = tokio::task::spawn_blocking(move || sweep(&sweep_iface, subnet, window))
        .await
        .map_err(io::Error::other)??;

    info!(
        interface = %iface.name,
        subnet = %subnet,
        replies = replies.len(),
        "ARP sweep complete"
    );

    let lookups: Vec<_> = replies
        .iter()
        .map(|(ip, _)| {
            let resolver = resolver.clone();
            let ip = *ip;
            tokio::spawn(async move { resolver.lookup(ip).await })
        })
        .collect();

    let mut devices = Vec::with_capacity(replies.len());
    for ((ip, mac), lookup) in replies.into_iter().zip(lookups) {
        let hostname = lookup.await.unwrap_or(None);
        devices.push(Device::from_arp_reply(ip, mac.to_string(), &iface.name).with_hostname(hostname));
    }
    Ok(devices)
}

/// The /24 containing the interface's address
fn interface_subnet(iface: &Interface) -> Result<AddressInterval, ProbeError> {
    let range = get_network_range(&iface.ipv4.to_string())
        .ok_or(ProbeError::NoNetworkRange(IpAddr::V4(iface.ipv4)))?;
    Ok(range.parse::<AddressInterval>()?)
}

/// Send the requests and block until the reply window closes
fn sweep(
    iface: &Interface,
    subnet: AddressInterval,
    window: Duration,
) -> Result<Vec<(Ipv4Addr, MacAddr)>, ProbeError> {
    let link = datalink::interfaces()
        .into_iter()
        .find(|i| i.name == iface.name)
        .ok_or_else(|| ProbeError::InterfaceNotFound(iface.name.clone()))?;
    let source_mac = link
        .mac
        .filter(|mac| *mac != MacAddr::zero())
        .ok_or_else(|| ProbeError::NoMacAddress(iface.name.clone()))?;

    let config = Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Default::default()
    };
    let (mut tx, mut rx) = match datalink::channel(&link, config)? {
        Channel::Ethernet(tx, rx) => (tx, rx),
        _ => return Err(ProbeError::UnsupportedChannel(iface.name.clone())),
    };

    let mut sent = 0usize;
    for target in subnet.targets(RangePolicy::Exclusive) {
        if target == iface.ipv4 {
            continue;
        }
        let Some(frame) = build_arp_request(source_mac, iface.ipv4, target) else {
            continue;
        };
        if let Some(Err(e)) = tx.send_to(&frame, None) {
            trace!(interface = %iface.name, target = %target, error = %e, "ARP send failed");
            continue;
        }
        sent += 1;
    }
    debug!(interface = %iface.name, sent = sent, "Sent ARP requests");

    let deadline = Instant::now() + window;
    let mut replies: Vec<(Ipv4Addr, MacAddr)> = Vec::new();
    while Instant::now() < deadline {
        match rx.next() {
            Ok(frame) => {
                let Some((ip, mac)) = parse_arp_reply(frame) else {
                    continue;
                };
                if !in_interval(subnet, ip) || replies.iter().any(|(seen, _)| *seen == ip) {
                    continue;
                }
                debug!(interface = %iface.name, ip = %ip, mac = %mac, "ARP reply");
                replies.push((ip, mac));
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(replies)
}

/// Broadcast "who-has `target_ip`" frame
fn build_arp_request(source_mac: MacAddr, source_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Option<Vec<u8>> {
    let mut frame = vec![0u8; ETHERNET_HEADER_LEN + ARP_PACKET_LEN];

    let mut ethernet = MutableEthernetPacket::new(&mut frame)?;
    ethernet.set_destination(MacAddr::broadcast());
    ethernet.set_source(source_mac);
    ethernet.set_ethertype(EtherTypes::Arp);

    let mut arp = MutableArpPacket::new(ethernet.payload_mut())?;
    arp.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp.set_protocol_type(EtherTypes::Ipv4);
    arp.set_hw_addr_len(6);
    arp.set_proto_addr_len(4);
    arp.set_operation(ArpOperations::Request);
    arp.set_sender_hw_addr(source_mac);
    arp.set_sender_proto_addr(source_ip);
    arp.set_target_hw_addr(MacAddr::zero());
    arp.set_target_proto_addr(target_ip);

    Some(frame)
}

/// Sender address of an ARP reply frame
fn parse_arp_reply(frame: &[u8]) -> Option<(Ipv4Addr, MacAddr)> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(ethernet.payload())?;
    if arp.get_operation() != ArpOperations::Reply {
        return None;
    }
    Some((arp.get_sender_proto_addr(), arp.get_sender_hw_addr()))
}

fn in_interval(interval: AddressInterval, ip: Ipv4Addr) -> bool {
    (u32::from(interval.start())..=u32::from(interval.end())).contains(&u32::from(ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUR_MAC: MacAddr = MacAddr(0x02, 0x00, 0x00, 0x00, 0x00, 0x01);
    const PEER_MAC: MacAddr = MacAddr(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff);

    fn reply_frame(sender_ip: Ipv4Addr, operation: pnet::packet::arp::ArpOperation) -> Vec<u8> {
        let mut frame = build_arp_request(PEER_MAC, sender_ip, Ipv4Addr::new(192, 168, 1, 10)).unwrap();
        let mut ethernet = MutableEthernetPacket::new(&mut frame).unwrap();
        ethernet.set_destination(OUR_MAC);
        let mut arp = MutableArpPacket::new(ethernet.payload_mut()).unwrap();
        arp.set_operation(operation);
        arp.set_target_hw_addr(OUR_MAC);
        frame
    }

    #[test]
    fn test_build_arp_request() {
        let target = Ipv4Addr::new(192, 168, 1, 77);
        let frame = build_arp_request(OUR_MAC, Ipv4Addr::new(192, 168, 1, 10), target).unwrap();
        assert_eq!(frame.len(), 42);

        let ethernet = EthernetPacket::new(&frame).unwrap();
        assert_eq!(ethernet.get_destination(), MacAddr::broadcast());
        assert_eq!(ethernet.get_ethertype(), EtherTypes::Arp);

        let arp = ArpPacket::new(ethernet.payload()).unwrap();
        assert_eq!(arp.get_operation(), ArpOperations::Request);
        assert_eq!(arp.get_target_proto_addr(), target);
        assert_eq!(arp.get_sender_hw_addr(), OUR_MAC);
    }

    #[test]
    fn test_parse_arp_reply() {
        let peer = Ipv4Addr::new(192, 168, 1, 1);
        let frame = reply_frame(peer, ArpOperations::Reply);
        assert_eq!(parse_arp_reply(&frame), Some((peer, PEER_MAC)));
    }

    #[test]
    fn test_parse_ignores_requests_and_other_frames() {
        let frame = reply_frame(Ipv4Addr::new(192, 168, 1, 1), ArpOperations::Request);
        assert_eq!(parse_arp_reply(&frame), None);

        let mut ipv4 = frame.clone();
        MutableEthernetPacket::new(&mut ipv4)
            .unwrap()
            .set_ethertype(EtherTypes::Ipv4);
        assert_eq!(parse_arp_reply(&ipv4), None);

        assert_eq!(parse_arp_reply(&frame[..10]), None);
    }

    #[test]
    fn test_interface_subnet() {
        let iface = Interface {
            name: "eth0".to_string(),
            ipv4: Ipv4Addr::new(192, 168, 1, 10),
            is_default_gateway: true,
        };
        let subnet = interface_subnet(&iface).unwrap();
        assert_eq!(subnet.start(), Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(subnet.end(), Ipv4Addr::new(192, 168, 1, 255));
        assert!(in_interval(subnet, Ipv4Addr::new(192, 168, 1, 200)));
        assert!(!in_interval(subnet, Ipv4Addr::new(192, 168, 2, 1)));
    }

    #[tokio::test]
    async fn test_unknown_interface_is_a_probe_error() {
        let iface = Interface {
            name: "netsweep-missing0".to_string(),
            ipv4: Ipv4Addr::new(10, 99, 0, 1),
            is_default_gateway: false,
        };
        let resolver = Resolver::new(1, Duration::ZERO);
        let result = discover_on_interface(&iface, Duration::from_millis(10), &resolver).await;
        assert!(matches!(result, Err(ProbeError::InterfaceNotFound(_))));
    }
}
