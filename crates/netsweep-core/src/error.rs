//! Error taxonomy for discovery runs
//!
//! Only [`ParseError`] ever reaches the caller of a scan. [`ProbeError`]
//! describes per-address and per-interface failures, which the strategies log
//! and then drop from the result set.

use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// A malformed range expression or CIDR prefix
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("invalid range: '{0}' is not a valid IPv4 address")]
    InvalidAddress(String),
    #[error("invalid range: CIDR prefix length '{0}' must be an integer between 0 and 32")]
    InvalidPrefix(String),
    #[error("invalid range: start {start} is after end {end}")]
    Reversed { start: Ipv4Addr, end: Ipv4Addr },
}

/// A failure while probing a single address or interface
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Interface {0} not found")]
    InterfaceNotFound(String),
    #[error("Interface {0} has no MAC address")]
    NoMacAddress(String),
    #[error("Interface {0} does not provide an ethernet channel")]
    UnsupportedChannel(String),
    #[error("No network range for {0}")]
    NoNetworkRange(IpAddr),
    #[error("Invalid network range: {0}")]
    Range(#[from] ParseError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
