use futures::future::join_all;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, warn};

use crate::error::VitalsError;
use crate::probes::socket::new_raw;
use crate::types::{Family, Host};

/// Well-known public v6 address; only used to ask the kernel for a route.
const V6_PROBE_ADDR: Ipv6Addr = Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888);

/// An IP literal, or the first address `name` resolves to.
pub async fn resolve_host(name: &str) -> Option<Host> {
    if let Ok(addr) = name.parse::<IpAddr>() {
        return Some(Host::new(addr));
    }
    match lookup_host((name, 0)).await {
        Ok(mut addrs) => addrs.next().map(|sa| Host::new(sa.ip())),
        Err(e) => {
            warn!(host = name, error = %e, "could not resolve host");
            None
        }
    }
}

/// Resolves every name concurrently, keeping the input order and dropping
/// the ones that fail.
pub async fn resolve_hosts(names: &[String]) -> Vec<(String, Host)> {
    let resolved = join_all(names.iter().map(|n| resolve_host(n))).await;
    names
        .iter()
        .zip(resolved)
        .filter_map(|(name, host)| match host {
            Some(h) => Some((name.clone(), h)),
            None => {
                warn!(host = %name, "skipping unresolvable host");
                None
            }
        })
        .collect()
}

/// Source address the kernel would use for outbound IPv6 traffic.
///
/// Connecting a UDP socket sends nothing, it only selects a route.
pub async fn local_ipv6() -> Option<Ipv6Addr> {
    let sock = UdpSocket::bind(SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))).await.ok()?;
    if let Err(e) = sock.connect(SocketAddr::from((V6_PROBE_ADDR, 53))).await {
        debug!(error = %e, "no IPv6 route");
        return None;
    }
    match sock.local_addr().ok()?.ip() {
        IpAddr::V6(v6) if !v6.is_unspecified() => Some(v6),
        _ => None,
    }
}

/// Opens and immediately closes a raw ICMP socket so a missing privilege is
/// reported before any host is probed.
pub fn check_raw_socket_privilege() -> Result<(), VitalsError> {
    new_raw(Family::V4)
        .map(drop)
        .map_err(|e| VitalsError::socket("raw icmp", e))
}
