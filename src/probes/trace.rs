//! UDP route tracer.
//!
//! Each hop is an empty UDP datagram with an increasing TTL (hop limit on
//! IPv6) sent to `target:port`, where `port` identifies this trace. Routers
//! answer with Time Exceeded, the target with Port Unreachable; both quote
//! our datagram, which is how replies are told apart from the traffic of
//! concurrent traces.
//!
//! IPv6 is best-effort: the quoted-datagram check is applied at the ICMPv6
//! offsets, but common platforms do not reliably hand those messages to a raw
//! socket, so hops may go missing or be misattributed under concurrent load.

use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::ipv6::Ipv6Packet;
use pnet_packet::udp::UdpPacket;
use socket2::SockRef;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::helper::duration_ms;
use super::icmp::{icmp_message, ICMP_HEADER_LEN, IPV4_HEADER_LEN};
use super::socket::{IcmpTransport, RawIcmpSocket};
use crate::error::VitalsError;
use crate::types::{Family, Host, Trace, TraceStep};

/// First destination port handed out to traces, as in classic traceroute.
pub const TRACE_BASE_PORT: u16 = 33434;
pub const TRACE_PORT_SPAN: u16 = 27566;

const IPV6_HEADER_LEN: usize = 40;
const RECV_BUF_LEN: usize = 1500;

pub struct Tracer<R> {
    host: Host,
    port: u16,
    sender: UdpSocket,
    receiver: R,
}

impl Tracer<RawIcmpSocket> {
    pub async fn open(host: Host, port: u16) -> Result<Self, VitalsError> {
        let receiver = RawIcmpSocket::open(host.family).map_err(|e| VitalsError::socket("trace receive", e))?;
        Self::with_receiver(host, port, receiver).await
    }
}

impl<R: IcmpTransport> Tracer<R> {
    pub async fn with_receiver(host: Host, port: u16, receiver: R) -> Result<Self, VitalsError> {
        let bind = match host.family {
            Family::V4 => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            Family::V6 => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        };
        let sender = UdpSocket::bind(bind)
            .await
            .map_err(|e| VitalsError::socket("trace send", e))?;
        Ok(Self { host, port, sender, receiver })
    }

    fn set_hop_limit(&self, ttl: u8) -> io::Result<()> {
        match self.host.family {
            Family::V4 => self.sender.set_ttl(u32::from(ttl)),
            Family::V6 => SockRef::from(&self.sender).set_unicast_hops_v6(u32::from(ttl)),
        }
    }

    /// Walks TTL 1..=`max_hops`, stopping early once the target answers.
    pub async fn trace(&mut self, max_hops: u8, per_hop_timeout: Duration) -> Trace {
        let dest = SocketAddr::new(self.host.addr, self.port);
        let mut steps = Vec::with_capacity(usize::from(max_hops));
        let mut buf = vec![0u8; RECV_BUF_LEN];

        for ttl in 1..=max_hops {
            if let Err(e) = self.set_hop_limit(ttl) {
                warn!(host = %self.host, ttl, error = %e, "could not set hop limit");
                steps.push(TraceStep::no_response());
                continue;
            }

            let sent_at = Instant::now();
            if let Err(e) = self.sender.send_to(&[], dest).await {
                warn!(host = %self.host, ttl, error = %e, "trace datagram could not be sent");
                steps.push(TraceStep::no_response());
                continue;
            }

            match timeout_at(sent_at + per_hop_timeout, self.await_hop(&mut buf)).await {
                Ok(Ok((responder, received))) => {
                    let rtt = duration_ms(received.saturating_duration_since(sent_at));
                    debug!(host = %self.host, ttl, %responder, rtt, "hop");
                    steps.push(TraceStep::new(responder, rtt));
                    if responder == self.host.addr {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    warn!(host = %self.host, ttl, error = %e, "failed to read trace response");
                    steps.push(TraceStep::no_response());
                }
                Err(_) => steps.push(TraceStep::no_response()),
            }
        }

        Trace::new(steps)
    }

    async fn await_hop(&mut self, buf: &mut [u8]) -> io::Result<(IpAddr, Instant)> {
        loop {
            let (n, from) = self.receiver.recv_from(buf).await?;
            if is_trace_response(self.host.family, &buf[..n], &self.host.addr, self.port) {
                return Ok((from, Instant::now()));
            }
        }
    }
}

/// True when `bytes` (as read from a raw socket of `family`) is a Time
/// Exceeded or Destination Unreachable message about a datagram this trace
/// sent to `target:port`.
pub fn is_trace_response(family: Family, bytes: &[u8], target: &IpAddr, port: u16) -> bool {
    let Ok(msg) = icmp_message(family, bytes) else {
        return false;
    };
    let layout = family.layout();
    if msg[0] != layout.time_exceeded && msg[0] != layout.unreachable {
        return false;
    }
    match quoted_destination(family, &msg[ICMP_HEADER_LEN..]) {
        Some((dst, dport)) => dst == *target && dport == port,
        None => false,
    }
}

/// Destination address and UDP port of the datagram quoted in an ICMP error.
fn quoted_destination(family: Family, quoted: &[u8]) -> Option<(IpAddr, u16)> {
    match family {
        Family::V4 => {
            let ip = Ipv4Packet::new(quoted)?;
            if ip.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
                return None;
            }
            let ihl = usize::from(ip.get_header_length()) * 4;
            if ihl < IPV4_HEADER_LEN {
                return None;
            }
            let udp = UdpPacket::new(quoted.get(ihl..)?)?;
            Some((IpAddr::V4(ip.get_destination()), udp.get_destination()))
        }
        Family::V6 => {
            let ip = Ipv6Packet::new(quoted)?;
            if ip.get_next_header() != IpNextHeaderProtocols::Udp {
                return None;
            }
            let udp = UdpPacket::new(quoted.get(IPV6_HEADER_LEN..)?)?;
            Some((IpAddr::V6(ip.get_destination()), udp.get_destination()))
        }
    }
}
