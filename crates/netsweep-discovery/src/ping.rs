//! ICMP liveness checks through the system `ping` binary

use chrono::{DateTime, Utc};
use netsweep_core::Device;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, trace};

/// How long `ping_host` waits for an echo reply
pub const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of a single echo request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub ip: Ipv4Addr,
    pub is_alive: bool,
    /// Round-trip time in milliseconds, when the reply reported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// Why the ping could not be run at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A discovered device together with a fresh liveness check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDetails {
    #[serde(flatten)]
    pub device: Device,
    pub is_alive: bool,
    pub last_ping: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_error: Option<String>,
}

/// Send one echo request to `ip` and wait up to `limit` for the reply
pub async fn ping_host(ip: Ipv4Addr, limit: Duration) -> PingResult {
    let wait_secs = limit.as_secs().max(1).to_string();
    let run = Command::new("ping")
        .args(["-c", "1", "-W", &wait_secs, &ip.to_string()])
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    // ping enforces its own wait; the outer bound covers a stuck process
    let (is_alive, time_ms, error) = match timeout(limit + Duration::from_secs(1), run).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let time_ms = parse_round_trip(&stdout);
            trace!(ip = %ip, status = %output.status, time_ms = ?time_ms, "ping finished");
            (output.status.success(), time_ms, None)
        }
        Ok(Err(e)) => {
            debug!(ip = %ip, error = %e, "Failed to run ping");
            (false, None, Some(e.to_string()))
        }
        Err(_) => (false, None, Some("ping timed out".to_string())),
    };

    PingResult {
        ip,
        is_alive,
        time_ms: if is_alive { time_ms } else { None },
        timestamp: Utc::now(),
        error,
    }
}

/// Ping a previously discovered device and attach the result
pub async fn host_details(device: Device) -> HostDetails {
    let ping = ping_host(device.ip_address, PING_TIMEOUT).await;
    HostDetails {
        device,
        is_alive: ping.is_alive,
        last_ping: ping.timestamp,
        ping_time_ms: ping.time_ms,
        ping_error: ping.error,
    }
}

/// Round-trip time from the reply line of `ping` output
/// Format: "64 bytes from 192.168.1.1: icmp_seq=1 ttl=64 time=0.512 ms"
fn parse_round_trip(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let value = line
            .split_whitespace()
            .find_map(|field| field.strip_prefix("time=").or_else(|| field.strip_prefix("time<")))?;
        value.trim_end_matches("ms").parse::<f64>().ok()
    })
}
