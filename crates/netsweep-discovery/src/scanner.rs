//! Discovery entry points and strategy dispatch

use netsweep_core::{
    ports_or_default, AddressInterval, Device, Interface, ParseError, ProbeError, RangePolicy,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::arp::{self, REPLY_WINDOW};
use crate::dns::Resolver;
use crate::error::DiscoveryError;
use crate::interfaces::{detect_default_range, list_interfaces};
use crate::probe::{probe_address, run_in_batches, BATCH_SIZE, CONNECT_TIMEOUT, DNS_TIMEOUT};

/// Scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Probe units started together in a TCP scan
    pub batch_size: usize,
    /// TCP connect timeout per port in milliseconds
    pub connect_timeout_ms: u64,
    /// Reverse DNS timeout per address in milliseconds
    pub dns_timeout_ms: u64,
    /// ARP reply window per interface in milliseconds
    pub reply_window_ms: u64,
    /// Whether range endpoints are probed
    pub range_policy: RangePolicy,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            connect_timeout_ms: CONNECT_TIMEOUT.as_millis() as u64,
            dns_timeout_ms: DNS_TIMEOUT.as_millis() as u64,
            reply_window_ms: REPLY_WINDOW.as_millis() as u64,
            range_policy: RangePolicy::Exclusive,
        }
    }
}

impl ScanOptions {
    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    fn reply_window(&self) -> Duration {
        Duration::from_millis(self.reply_window_ms)
    }
}

/// What the caller asked for, before the range is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryRequest {
    /// ARP sweep across every local interface
    LinkLayer,
    /// TCP probe of `range` (auto-detected when absent) on `ports`
    Transport {
        range: Option<String>,
        ports: Option<Vec<u16>>,
    },
}

impl DiscoveryRequest {
    /// Pick the request from the input shape: nothing given means an ARP
    /// sweep, a range or a port list means TCP probing
    pub fn from_input(range: Option<String>, ports: Option<Vec<u16>>) -> Self {
        match (range, ports) {
            (None, None) => Self::LinkLayer,
            (range, ports) => Self::Transport { range, ports },
        }
    }

    /// Parse the range and settle the port list
    ///
    /// This is the only step that can fail, and it runs before any probing.
    pub fn resolve(self) -> Result<Strategy, ParseError> {
        match self {
            Self::LinkLayer => Ok(Strategy::LinkLayer),
            Self::Transport { range, ports } => Ok(Strategy::Transport {
                range: resolve_range(range.as_deref())?,
                ports: ports_or_default(ports),
            }),
        }
    }
}

/// A resolved discovery strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    LinkLayer,
    Transport {
        range: AddressInterval,
        ports: Vec<u16>,
    },
}

impl Strategy {
    /// Run the strategy. Individual probe failures only shrink the result.
    pub async fn discover(&self, options: &ScanOptions) -> Vec<Device> {
        match self {
            Self::LinkLayer => link_layer_scan(options).await,
            Self::Transport { range, ports } => transport_scan(*range, ports, options).await,
        }
    }
}

/// Stateless scanner carrying only its options
#[derive(Debug, Clone, Default)]
pub struct DiscoveryScanner {
    options: ScanOptions,
}

impl DiscoveryScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Resolve `request` and run it
    pub async fn run(&self, request: DiscoveryRequest) -> Result<Vec<Device>, DiscoveryError> {
        let strategy = request.resolve()?;
        Ok(strategy.discover(&self.options).await)
    }
}

/// ARP-sweep every local interface with default options
pub async fn scan_network() -> Vec<Device> {
    Strategy::LinkLayer.discover(&ScanOptions::default()).await
}

/// TCP-probe `ip_range` (auto-detected when absent) with default options
pub async fn scan_network_range(
    ip_range: Option<&str>,
    ports: Option<Vec<u16>>,
) -> Result<Vec<Device>, DiscoveryError> {
    let request = DiscoveryRequest::Transport {
        range: ip_range.map(str::to_string),
        ports,
    };
    DiscoveryScanner::default().run(request).await
}

/// Parse `range`, detecting the local /24 when it is absent or blank
fn resolve_range(range: Option<&str>) -> Result<AddressInterval, ParseError> {
    match range.map(str::trim).filter(|r| !r.is_empty()) {
        Some(expr) => expr.parse(),
        None => detect_default_range().parse(),
    }
}

async fn link_layer_scan(options: &ScanOptions) -> Vec<Device> {
    let interfaces = list_interfaces();
    let window = options.reply_window();
    let resolver = Resolver::new(options.batch_size, options.dns_timeout());

    sweep_interfaces(&interfaces, |iface| {
        let resolver = resolver.clone();
        async move { arp::discover_on_interface(&iface, window, &resolver).await }
    })
    .await
}

/// Sweep each interface in turn and concatenate the results in order
///
/// An interface whose sweep fails contributes nothing.
async fn sweep_interfaces<F, Fut>(interfaces: &[Interface], mut sweep: F) -> Vec<Device>
where
    F: FnMut(Interface) -> Fut,
    Fut: Future<Output = Result<Vec<Device>, ProbeError>>,
{
    if interfaces.is_empty() {
        error!("No network interfaces found with IPv4 addresses");
        return Vec::new();
    }

    let mut devices = Vec::new();
    for iface in interfaces {
        info!(interface = %iface.name, ip = %iface.ipv4, "Scanning interface");
        match sweep(iface.clone()).await {
            Ok(found) => devices.extend(found),
            Err(e) => warn!(interface = %iface.name, error = %e, "ARP sweep failed"),
        }
    }

    info!(
        interfaces = interfaces.len(),
        devices = devices.len(),
        "Link-layer discovery complete"
    );
    devices
}

async fn transport_scan(range: AddressInterval, ports: &[u16], options: &ScanOptions) -> Vec<Device> {
    info!(
        start = %range.start(),
        end = %range.end(),
        targets = range.target_count(options.range_policy),
        ports = ports.len(),
        "Starting TCP probe scan"
    );

    let ports: Arc<[u16]> = ports.into();
    let connect_timeout = options.connect_timeout();
    // Shared across batches so lookups outliving their unit still count
    let resolver = Resolver::new(options.batch_size, options.dns_timeout());

    let devices = run_in_batches(
        range.targets(options.range_policy),
        options.batch_size,
        move |ip| {
            let ports = ports.clone();
            let resolver = resolver.clone();
            async move { probe_address(ip, &ports, connect_timeout, &resolver).await }
        },
    )
    .await;

    info!(devices = devices.len(), "TCP probe scan complete");
    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    fn quick_options() -> ScanOptions {
        ScanOptions {
            dns_timeout_ms: 200,
            ..ScanOptions::default()
        }
    }

    #[test]
    fn test_request_shape_picks_strategy() {
        assert_eq!(DiscoveryRequest::from_input(None, None), DiscoveryRequest::LinkLayer);
        assert_eq!(
            DiscoveryRequest::from_input(None, Some(vec![22])),
            DiscoveryRequest::Transport {
                range: None,
                ports: Some(vec![22])
            }
        );
    }

    #[test]
    fn test_resolve_fills_default_ports() {
        let request = DiscoveryRequest::Transport {
            range: Some("10.0.0.0/30".to_string()),
            ports: Some(Vec::new()),
        };
        match request.resolve().unwrap() {
            Strategy::Transport { range, ports } => {
                assert_eq!(range.start(), Ipv4Addr::new(10, 0, 0, 0));
                assert_eq!(ports.len(), 15);
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn test_blank_range_is_detected() {
        let range = resolve_range(Some("   ")).unwrap();
        assert_eq!(range.target_count(RangePolicy::Exclusive), 254);
    }

    #[tokio::test]
    async fn test_malformed_range_aborts_before_probing() {
        let err = scan_network_range(Some("10.0.0.0/abc"), None).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Parse(ParseError::InvalidPrefix(_))));

        let err = scan_network_range(Some("10.0.0.0/24/1"), None).await.unwrap_err();
        assert!(err.to_string().starts_with("invalid range"));
    }

    #[tokio::test]
    async fn test_empty_interval_returns_nothing() {
        let devices = scan_network_range(Some("10.0.0.1/32"), Some(vec![80])).await.unwrap();
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn test_transport_scan_finds_loopback_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let scanner = DiscoveryScanner::new(quick_options());
        let devices = scanner
            .run(DiscoveryRequest::Transport {
                range: Some("127.0.0.0-127.0.0.2".to_string()),
                ports: Some(vec![port]),
            })
            .await
            .unwrap();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].ip_address, Ipv4Addr::LOCALHOST);
        assert_eq!(devices[0].open_ports, Some(vec![port]));
        assert_eq!(devices[0].interface, None);
    }

    fn iface(name: &str, last_octet: u8) -> Interface {
        Interface {
            name: name.to_string(),
            ipv4: Ipv4Addr::new(192, 168, last_octet, 10),
            is_default_gateway: false,
        }
    }

    fn arp_device(iface: &Interface, host: u8) -> Device {
        let [a, b, c, _] = iface.ipv4.octets();
        Device::from_arp_reply(
            Ipv4Addr::new(a, b, c, host),
            "aa:bb:cc:dd:ee:ff".to_string(),
            &iface.name,
        )
    }

    #[tokio::test]
    async fn test_no_interfaces_is_an_empty_result() {
        let devices = sweep_interfaces(&[], |_| async { Ok(Vec::new()) }).await;
        assert!(devices.is_empty());
    }

    #[tokio::test]
    async fn test_failed_interface_is_skipped_in_order() {
        let interfaces = vec![iface("eth0", 1), iface("missing0", 2), iface("wlan0", 3)];

        let devices = sweep_interfaces(&interfaces, |iface| async move {
            if iface.name == "missing0" {
                return Err(ProbeError::InterfaceNotFound(iface.name.clone()));
            }
            Ok(vec![arp_device(&iface, 1), arp_device(&iface, 2)])
        })
        .await;

        let seen: Vec<(Option<&str>, Ipv4Addr)> = devices
            .iter()
            .map(|d| (d.interface.as_deref(), d.ip_address))
            .collect();
        assert_eq!(
            seen,
            vec![
                (Some("eth0"), Ipv4Addr::new(192, 168, 1, 1)),
                (Some("eth0"), Ipv4Addr::new(192, 168, 1, 2)),
                (Some("wlan0"), Ipv4Addr::new(192, 168, 3, 1)),
                (Some("wlan0"), Ipv4Addr::new(192, 168, 3, 2)),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_interface_next_to_a_working_one() {
        let interfaces = vec![iface("netsweep-missing0", 4), iface("lan0", 5)];
        let resolver = Resolver::new(4, Duration::ZERO);

        let devices = sweep_interfaces(&interfaces, |iface| {
            let resolver = resolver.clone();
            async move {
                if iface.name == "lan0" {
                    return Ok(vec![arp_device(&iface, 7)]);
                }
                arp::discover_on_interface(&iface, Duration::from_millis(10), &resolver).await
            }
        })
        .await;

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].interface.as_deref(), Some("lan0"));
    }

    #[tokio::test]
    async fn test_inclusive_policy_probes_single_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let options = ScanOptions {
            range_policy: RangePolicy::Inclusive,
            ..quick_options()
        };
        let strategy = Strategy::Transport {
            range: "127.0.0.1".parse().unwrap(),
            ports: vec![port],
        };
        let devices = strategy.discover(&options).await;
        assert_eq!(devices.len(), 1);

        let legacy = strategy.discover(&quick_options()).await;
        assert!(legacy.is_empty());
    }
}
