//! Address range expressions
//!
//! A range expression is one of:
//! - CIDR notation, `192.168.1.0/24`
//! - a dash range, `192.168.1.10-192.168.1.20`
//! - a single address, `192.168.1.7`
//!
//! Ranges are held as 32-bit integers so that iteration is plain arithmetic.
//! Probing walks the interval according to a [`RangePolicy`]; the default
//! policy excludes both endpoints, which drops the network and broadcast
//! addresses of a CIDR block but also the last host of a dash range.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::ParseError;

/// Range used when no range was given and none could be detected
pub const DEFAULT_RANGE: &str = "192.168.1.0/24";

/// Which addresses of an [`AddressInterval`] get probed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangePolicy {
    /// Probe `(start, end)`, excluding both endpoints
    #[default]
    Exclusive,
    /// Probe `[start, end]`
    Inclusive,
}

/// An IPv4 interval with `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressInterval {
    start: u32,
    end: u32,
}

impl AddressInterval {
    /// Create an interval from two addresses
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self, ParseError> {
        if u32::from(start) > u32::from(end) {
            return Err(ParseError::Reversed { start, end });
        }
        Ok(Self {
            start: start.into(),
            end: end.into(),
        })
    }

    /// Interval covering a single address
    pub fn single(addr: Ipv4Addr) -> Self {
        let value = u32::from(addr);
        Self {
            start: value,
            end: value,
        }
    }

    /// Network address through broadcast address of `addr/prefix_len`
    pub fn from_cidr(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, ParseError> {
        if prefix_len > 32 {
            return Err(ParseError::InvalidPrefix(prefix_len.to_string()));
        }
        let mask = prefix_mask(prefix_len);
        let start = u32::from(addr) & mask;
        let end = start | !mask;
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.start)
    }

    pub fn end(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.end)
    }

    /// Number of addresses [`Self::targets`] yields under `policy`
    pub fn target_count(&self, policy: RangePolicy) -> u64 {
        let (lo, hi) = self.bounds(policy);
        hi.saturating_sub(lo)
    }

    /// Addresses to probe, in ascending order
    pub fn targets(&self, policy: RangePolicy) -> impl Iterator<Item = Ipv4Addr> {
        let (lo, hi) = self.bounds(policy);
        (lo..hi).map(|value| Ipv4Addr::from(value as u32))
    }

    /// Half-open `[lo, hi)` bounds in u64 so that the edges of the address
    /// space cannot overflow
    fn bounds(&self, policy: RangePolicy) -> (u64, u64) {
        let start = u64::from(self.start);
        let end = u64::from(self.end);
        match policy {
            RangePolicy::Exclusive => (start + 1, end.max(start + 1)),
            RangePolicy::Inclusive => (start, end + 1),
        }
    }
}

impl FromStr for AddressInterval {
    type Err = ParseError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ParseError::InvalidRange("empty range expression".to_string()));
        }

        if expr.contains('/') {
            let parts: Vec<&str> = expr.split('/').collect();
            if parts.len() != 2 {
                return Err(ParseError::InvalidRange(format!(
                    "'{expr}' must be in CIDR notation, e.g. 192.168.1.0/24"
                )));
            }
            let network = parse_ipv4(parts[0])?;
            let prefix_len: u8 = parts[1]
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidPrefix(parts[1].trim().to_string()))?;
            return Self::from_cidr(network, prefix_len);
        }

        if let Some((first, last)) = expr.split_once('-') {
            return Self::new(parse_ipv4(first)?, parse_ipv4(last)?);
        }

        Ok(Self::single(parse_ipv4(expr)?))
    }
}

impl fmt::Display for AddressInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start(), self.end())
    }
}

fn parse_ipv4(s: &str) -> Result<Ipv4Addr, ParseError> {
    let s = s.trim();
    Ipv4Addr::from_str(s).map_err(|_| ParseError::InvalidAddress(s.to_string()))
}

fn prefix_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        !0u32 << (32 - prefix_len)
    }
}
