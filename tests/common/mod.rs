#![allow(dead_code)]

use async_trait::async_trait;
use netvitals::probes::IcmpTransport;
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::mpsc;

/// One packet the scripted network delivers after `delay`.
pub struct Delivery {
    pub delay: Duration,
    pub bytes: Vec<u8>,
    pub from: IpAddr,
}

impl Delivery {
    pub fn new(delay_ms: u64, bytes: Vec<u8>, from: IpAddr) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            bytes,
            from,
        }
    }
}

type Responder = Box<dyn FnMut(&[u8], IpAddr) -> Vec<Delivery> + Send>;

/// In-memory stand-in for a raw ICMP socket. Every sent packet is handed to
/// `respond`, whose deliveries show up on `recv_from` once their delay has
/// passed on the tokio clock.
pub struct ScriptedNet {
    respond: Responder,
    tx: mpsc::UnboundedSender<(Vec<u8>, IpAddr)>,
    rx: mpsc::UnboundedReceiver<(Vec<u8>, IpAddr)>,
}

impl ScriptedNet {
    pub fn new(respond: impl FnMut(&[u8], IpAddr) -> Vec<Delivery> + Send + 'static) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            respond: Box::new(respond),
            tx,
            rx,
        }
    }

    /// A network that never answers.
    pub fn silent() -> Self {
        Self::new(|_, _| Vec::new())
    }

    /// Injects packets directly, independent of anything sent.
    pub fn feeder(&self) -> mpsc::UnboundedSender<(Vec<u8>, IpAddr)> {
        self.tx.clone()
    }
}

#[async_trait]
impl IcmpTransport for ScriptedNet {
    async fn send_to(&mut self, packet: &[u8], dest: IpAddr) -> io::Result<usize> {
        for d in (self.respond)(packet, dest) {
            let tx = self.tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(d.delay).await;
                let _ = tx.send((d.bytes, d.from));
            });
        }
        Ok(packet.len())
    }

    async fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)> {
        let (bytes, from) = self
            .rx
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "scripted network closed"))?;
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok((n, from))
    }
}

/// Minimal IPv4 header as an `AF_INET` raw socket prepends it.
pub fn ipv4_header(protocol: u8, src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
    let mut h = vec![0x45, 0, 0, 0, 0, 0, 0, 0, 64, protocol, 0, 0];
    h.extend_from_slice(&src);
    h.extend_from_slice(&dst);
    h
}

/// Turns an outgoing echo request into the IPv4 reply a host would send,
/// with `icmp_type` and the identifier overridable for foreign traffic.
pub fn v4_echo_reply(request: &[u8], icmp_type: u8, identifier: Option<u16>) -> Vec<u8> {
    let mut icmp = request.to_vec();
    icmp[0] = icmp_type;
    if let Some(id) = identifier {
        icmp[4..6].copy_from_slice(&id.to_be_bytes());
    }
    let mut pkt = ipv4_header(1, [192, 0, 2, 1], [192, 0, 2, 100]);
    pkt.extend(icmp);
    pkt
}

pub fn sequence_of(request: &[u8]) -> u16 {
    u16::from_be_bytes([request[6], request[7]])
}

pub fn identifier_of(request: &[u8]) -> u16 {
    u16::from_be_bytes([request[4], request[5]])
}

/// ICMPv4 error (as read off an `AF_INET` raw socket) quoting a UDP datagram
/// sent to `dst:dst_port`.
pub fn v4_icmp_error(icmp_type: u8, router: [u8; 4], dst: [u8; 4], dst_port: u16) -> Vec<u8> {
    let mut pkt = ipv4_header(1, router, [127, 0, 0, 1]);
    pkt.extend_from_slice(&[icmp_type, 0, 0, 0, 0, 0, 0, 0]);
    pkt.extend(ipv4_header(17, [127, 0, 0, 1], dst));
    pkt.extend_from_slice(&40000u16.to_be_bytes());
    pkt.extend_from_slice(&dst_port.to_be_bytes());
    pkt.extend_from_slice(&[0, 8, 0, 0]);
    pkt
}
