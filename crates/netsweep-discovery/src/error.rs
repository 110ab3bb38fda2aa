//! Errors that cross the discovery boundary

use netsweep_core::ParseError;
use thiserror::Error;

/// The only failure a scan reports to its caller. Probe failures never get
/// here; they only shrink the result set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error(transparent)]
    Parse(#[from] ParseError),
}
