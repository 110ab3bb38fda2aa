//! Configuration loading

use anyhow::Result;
use netsweep_core::{parse_ports, RangePolicy};
use netsweep_discovery::ScanOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub link_layer: LinkLayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Default range for `scan` when none is given on the command line
    #[serde(default)]
    pub range: Option<String>,
    /// Default comma-separated port list
    #[serde(default)]
    pub ports: Option<String>,
    /// Probe range endpoints too
    #[serde(default)]
    pub inclusive_ranges: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_dns_timeout")]
    pub dns_timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            range: None,
            ports: None,
            inclusive_ranges: false,
            batch_size: default_batch_size(),
            connect_timeout_ms: default_connect_timeout(),
            dns_timeout_ms: default_dns_timeout(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_connect_timeout() -> u64 {
    100
}

fn default_dns_timeout() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkLayerConfig {
    /// How long to collect ARP replies per interface
    #[serde(default = "default_reply_window")]
    pub reply_window_ms: u64,
}

impl Default for LinkLayerConfig {
    fn default() -> Self {
        Self {
            reply_window_ms: default_reply_window(),
        }
    }
}

fn default_reply_window() -> u64 {
    3000
}

impl Config {
    /// Convert to ScanOptions
    pub fn to_scan_options(&self) -> ScanOptions {
        ScanOptions {
            batch_size: self.scan.batch_size,
            connect_timeout_ms: self.scan.connect_timeout_ms,
            dns_timeout_ms: self.scan.dns_timeout_ms,
            reply_window_ms: self.link_layer.reply_window_ms,
            range_policy: if self.scan.inclusive_ranges {
                RangePolicy::Inclusive
            } else {
                RangePolicy::Exclusive
            },
        }
    }

    /// Configured default port list, if any
    pub fn default_ports(&self) -> Option<Vec<u16>> {
        self.scan.ports.as_deref().map(parse_ports)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
