//! netsweep Discovery - Network discovery for local and routed hosts
//!
//! This crate provides two discovery methods:
//! - ARP sweeps of the /24 around every local interface
//! - TCP connect probing (plus reverse DNS) of an explicit address range
//!
//! It can also ping a single host to check that it is still up.
//!
//! The method is picked from the shape of the request: no range means an ARP
//! sweep, a range means TCP probing.

pub mod arp;
pub mod dns;
pub mod error;
pub mod interfaces;
pub mod ping;
pub mod probe;
pub mod scanner;

pub use error::DiscoveryError;
pub use interfaces::{get_local_ip, get_network_range, list_interfaces, network_info};
pub use ping::{host_details, ping_host, HostDetails, PingResult, PING_TIMEOUT};
pub use scanner::{
    scan_network, scan_network_range, DiscoveryRequest, DiscoveryScanner, ScanOptions, Strategy,
};
