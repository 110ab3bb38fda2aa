//! TCP connect probing with batch-bounded concurrency

use netsweep_core::Device;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::dns::Resolver;

/// Per-port TCP connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Reverse DNS timeout per address
pub const DNS_TIMEOUT: Duration = Duration::from_secs(1);

/// Number of probe units running at once
pub const BATCH_SIZE: usize = 100;

/// Try a full TCP handshake with `ip:port`
///
/// The stream is dropped (closed) as soon as the handshake completes.
pub async fn probe_port(ip: Ipv4Addr, port: u16, connect_timeout: Duration) -> bool {
    let addr = SocketAddr::new(IpAddr::V4(ip), port);
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            trace!(ip = %ip, port = port, error = %e, "Connect failed");
            false
        }
        Err(_) => false,
    }
}

/// Probe one address: reverse DNS, then every port in order
///
/// Returns `None` for an address with no hostname and no open port.
pub async fn probe_address(
    ip: Ipv4Addr,
    ports: &[u16],
    connect_timeout: Duration,
    resolver: &Resolver,
) -> Option<Device> {
    let hostname = resolver.lookup(ip).await;

    let mut open_ports = Vec::new();
    for &port in ports {
        if probe_port(ip, port, connect_timeout).await {
            open_ports.push(port);
        }
    }

    let device = Device::from_probe(ip, hostname, open_ports);
    if let Some(ref device) = device {
        debug!(
            ip = %ip,
            hostname = ?device.hostname,
            open_ports = ?device.open_ports,
            "Found host"
        );
    }
    device
}

/// Run `unit` over `items`, at most `batch_size` at a time
///
/// Units are started in fixed batches: a batch must finish completely before
/// the next one starts, so one slow unit holds back the whole batch. Results
/// within a batch are in completion order; batches are in input order.
pub async fn run_in_batches<T, R, F, Fut>(
    items: impl IntoIterator<Item = T>,
    batch_size: usize,
    unit: F,
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Option<R>> + Send + 'static,
    R: Send + 'static,
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::new();
    let mut batch = JoinSet::new();

    for item in items {
        batch.spawn(unit(item));
        if batch.len() >= batch_size {
            drain_batch(&mut batch, &mut results).await;
        }
    }
    drain_batch(&mut batch, &mut results).await;

    results
}

async fn drain_batch<R: Send + 'static>(batch: &mut JoinSet<Option<R>>, results: &mut Vec<R>) {
    while let Some(joined) = batch.join_next().await {
        match joined {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Probe task failed"),
        }
    }
}
