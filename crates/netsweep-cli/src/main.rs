//! netsweep - Main entry point
//!
//! Runs a discovery pass and prints the inventory as JSON on stdout. Logs go
//! to stderr.

mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use netsweep_core::{parse_ports, NetworkInfo, RangePolicy};
use netsweep_discovery::probe::run_in_batches;
use netsweep_discovery::{
    get_local_ip, get_network_range, host_details, list_interfaces, network_info, ping_host,
    DiscoveryRequest, DiscoveryScanner, PING_TIMEOUT,
};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "netsweep")]
#[command(about = "Local network discovery via ARP sweeps and TCP probing")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "netsweep.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover devices. Without a range or ports this is an ARP sweep of
    /// every local interface; otherwise a TCP probe of the range.
    Scan {
        /// Range to probe: CIDR, "start-end" or a single address
        #[arg(short, long)]
        range: Option<String>,

        /// Comma-separated ports to probe
        #[arg(short, long)]
        ports: Option<String>,

        /// Probe the first and last address of the range too
        #[arg(long)]
        inclusive: bool,

        /// TCP-probe the auto-detected range even without a range or ports
        #[arg(long)]
        tcp: bool,

        /// Ping every discovered device and report whether it is still up
        #[arg(long)]
        ping: bool,
    },
    /// Send one ICMP echo request to a host
    Ping {
        /// Address to ping
        ip: Ipv4Addr,

        /// Reply timeout in milliseconds
        #[arg(short, long, default_value_t = PING_TIMEOUT.as_millis() as u64)]
        timeout_ms: u64,
    },
    /// List local IPv4 interfaces
    Interfaces,
    /// Show the local address and the range a scan would default to
    Info,
}

#[derive(Serialize)]
struct InfoReport {
    local_ip: Ipv4Addr,
    network_range: Option<String>,
    network: Option<NetworkInfo>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("netsweep v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;

    match args.command {
        Command::Scan {
            range,
            ports,
            inclusive,
            tcp,
            ping,
        } => {
            let mut options = config.to_scan_options();
            if inclusive {
                options.range_policy = RangePolicy::Inclusive;
            }

            let range = range.or_else(|| config.scan.range.clone());
            let ports = ports
                .as_deref()
                .map(parse_ports)
                .or_else(|| config.default_ports());

            let request = match DiscoveryRequest::from_input(range, ports) {
                DiscoveryRequest::LinkLayer if tcp => DiscoveryRequest::Transport {
                    range: None,
                    ports: None,
                },
                request => request,
            };
            info!(request = ?request, "Running discovery");

            let batch_size = options.batch_size;
            let devices = DiscoveryScanner::new(options).run(request).await?;
            info!(devices = devices.len(), "Discovery finished");

            if ping {
                let details = run_in_batches(devices, batch_size, |device| async move {
                    Some(host_details(device).await)
                })
                .await;
                println!("{}", serde_json::to_string_pretty(&details)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            }
        }
        Command::Ping { ip, timeout_ms } => {
            let result = ping_host(ip, Duration::from_millis(timeout_ms)).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Interfaces => {
            println!("{}", serde_json::to_string_pretty(&list_interfaces())?);
        }
        Command::Info => {
            let local_ip = get_local_ip();
            let report = InfoReport {
                local_ip,
                network_range: get_network_range(&local_ip.to_string()),
                network: network_info(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
