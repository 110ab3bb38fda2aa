//! Best-effort reverse DNS
//!
//! Lookups go through the system resolver (`getnameinfo`), so `/etc/hosts`,
//! mDNS and whatever else the host is configured for all apply. Failure is
//! the normal case for most LAN addresses and is never reported.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Reverse resolver with a cap on lookups running at once
///
/// Each lookup holds a permit until `getnameinfo` actually returns, not just
/// until the caller stops waiting, so lookups abandoned on timeout still count
/// against the cap. Clones share the same permits.
#[derive(Debug, Clone)]
pub struct Resolver {
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    limit: Duration,
}

impl Resolver {
    /// At most `max_in_flight` lookups at once, each given up on after `limit`
    pub fn new(max_in_flight: usize, limit: Duration) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            limit,
        }
    }

    /// Lookups still running, including ones whose caller already gave up
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    /// Resolve `ip` to a hostname
    ///
    /// Waiting for a free permit counts against the timeout.
    pub async fn lookup(&self, ip: Ipv4Addr) -> Option<String> {
        self.lookup_with(ip, lookup_addr).await
    }

    async fn lookup_with<F>(&self, ip: Ipv4Addr, resolve: F) -> Option<String>
    where
        F: FnOnce(Ipv4Addr) -> Option<String> + Send + 'static,
    {
        let permits = self.permits.clone();
        let attempt = async move {
            let permit = permits.acquire_owned().await.ok()?;
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                resolve(ip)
            });
            match task.await {
                Ok(hostname) => hostname,
                Err(e) => {
                    debug!(ip = %ip, error = %e, "Reverse lookup task failed");
                    None
                }
            }
        };

        match timeout(self.limit, attempt).await {
            Ok(hostname) => {
                if let Some(ref name) = hostname {
                    trace!(ip = %ip, hostname = %name, "Reverse lookup succeeded");
                }
                hostname
            }
            Err(_) => {
                trace!(ip = %ip, "Reverse lookup timed out");
                None
            }
        }
    }
}

#[cfg(unix)]
fn lookup_addr(ip: Ipv4Addr) -> Option<String> {
    const HOST_BUF_LEN: usize = 1025;

    // SAFETY: sockaddr_in is plain old data; all-zero is a valid value.
    let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    sa.sin_family = libc::AF_INET as libc::sa_family_t;
    sa.sin_addr = libc::in_addr {
        s_addr: u32::from_ne_bytes(ip.octets()),
    };
    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    {
        sa.sin_len = std::mem::size_of::<libc::sockaddr_in>() as u8;
    }

    let mut host = [0 as libc::c_char; HOST_BUF_LEN];
    // SAFETY: sa and host outlive the call and their lengths are passed alongside.
    let rc = unsafe {
        libc::getnameinfo(
            std::ptr::addr_of!(sa).cast(),
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            host.as_mut_ptr(),
            HOST_BUF_LEN as libc::socklen_t,
            std::ptr::null_mut(),
            0,
            libc::NI_NAMEREQD,
        )
    };
    if rc != 0 {
        return None;
    }

    // SAFETY: getnameinfo NUL-terminates host on success.
    let name = unsafe { std::ffi::CStr::from_ptr(host.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    // Some resolvers echo the address back instead of failing
    if name.is_empty() || name == ip.to_string() {
        None
    } else {
        Some(name)
    }
}

#[cfg(not(unix))]
fn lookup_addr(_ip: Ipv4Addr) -> Option<String> {
    None
}
