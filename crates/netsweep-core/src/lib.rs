//! netsweep Core - Core types for network discovery
//!
//! This crate provides the foundational types for the netsweep engine:
//! - Device and interface records produced by a discovery run
//! - Address range parsing (CIDR, dash ranges, single addresses)
//! - TCP port list parsing and the default well-known port set
//! - The error taxonomy shared by the discovery strategies

pub mod device;
pub mod error;
pub mod ports;
pub mod range;

pub use device::{Device, DiscoveryMethod, Interface, NetworkInfo};
pub use error::{ParseError, ProbeError};
pub use ports::{parse_ports, ports_or_default, DEFAULT_PORTS};
pub use range::{AddressInterval, RangePolicy, DEFAULT_RANGE};
