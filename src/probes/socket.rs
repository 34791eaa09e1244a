use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::net::UdpSocket;

use crate::types::Family;

/// Datagram-level access to ICMP traffic.
///
/// The prober and the tracer only talk to the network through this trait,
/// so a scripted transport can stand in for a raw socket.
#[async_trait]
pub trait IcmpTransport: Send {
    async fn send_to(&mut self, packet: &[u8], dest: IpAddr) -> io::Result<usize>;

    /// Receives one datagram, returning its length and source address.
    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)>;
}

/// Raw `SOCK_RAW` ICMP / ICMPv6 socket driven by the tokio reactor.
///
/// The raw socket is handed to tokio as a datagram socket; sends and
/// receives are plain `sendto`/`recvfrom` either way. Closed when dropped.
pub struct RawIcmpSocket {
    inner: UdpSocket,
}

impl RawIcmpSocket {
    /// Needs `CAP_NET_RAW` (or root); fails with `PermissionDenied` otherwise.
    pub fn open(family: Family) -> io::Result<Self> {
        let socket = new_raw(family)?;
        socket.set_nonblocking(true)?;
        let inner = UdpSocket::from_std(socket.into())?;
        Ok(Self { inner })
    }
}

pub(crate) fn new_raw(family: Family) -> io::Result<Socket> {
    let (domain, proto) = match family {
        Family::V4 => (Domain::IPV4, Protocol::ICMPV4),
        Family::V6 => (Domain::IPV6, Protocol::ICMPV6),
    };
    Socket::new(domain, Type::RAW, Some(proto))
}

#[async_trait]
impl IcmpTransport for RawIcmpSocket {
    async fn send_to(&mut self, packet: &[u8], dest: IpAddr) -> io::Result<usize> {
        // ICMP has no ports
        self.inner.send_to(packet, SocketAddr::new(dest, 0)).await
    }

    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)> {
        let (n, from) = self.inner.recv_from(buf).await?;
        Ok((n, from.ip()))
    }
}
