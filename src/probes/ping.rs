//! ICMP echo prober.

use std::collections::HashMap;
use std::io;
use std::net::Ipv6Addr;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use super::helper::duration_ms;
use super::icmp::EchoCodec;
use super::socket::IcmpTransport;
use crate::types::{Host, PingResult};

/// Room for the IP and ICMP headers on top of the payload.
const RECV_HEADROOM: usize = 128;

/// Sequence number → send timestamp bookkeeping for one probing round.
///
/// Replies are matched to the request they answer by sequence number, never
/// by arrival order.
#[derive(Debug, Default)]
pub struct EchoBook {
    pending: HashMap<u16, Instant>,
    rtts: HashMap<u16, f64>,
}

impl EchoBook {
    pub fn record_send(&mut self, sequence: u16, at: Instant) {
        self.pending.insert(sequence, at);
    }

    /// Matches a reply; returns its round-trip time in ms if `sequence` was
    /// still waiting.
    pub fn resolve(&mut self, sequence: u16, received: Instant) -> Option<f64> {
        let sent = self.pending.remove(&sequence)?;
        let rtt = duration_ms(received.saturating_duration_since(sent));
        self.rtts.insert(sequence, rtt);
        Some(rtt)
    }

    /// Gives up on `sequence`; it counts as lost.
    pub fn expire(&mut self, sequence: u16) {
        self.pending.remove(&sequence);
    }

    pub fn is_answered(&self, sequence: u16) -> bool {
        self.rtts.contains_key(&sequence)
    }

    /// Round-trip samples in sequence order.
    pub fn samples(&self) -> Vec<f64> {
        let mut answered: Vec<_> = self.rtts.iter().collect();
        answered.sort_by_key(|(seq, _)| **seq);
        answered.into_iter().map(|(_, rtt)| *rtt).collect()
    }
}

/// Sends sequenced echo requests to one host over a socket it owns.
pub struct Pinger<T> {
    host: Host,
    codec: EchoCodec,
    identifier: u16,
    transport: T,
}

impl<T: IcmpTransport> Pinger<T> {
    pub fn with_transport(host: Host, identifier: u16, local_v6: Option<Ipv6Addr>, transport: T) -> Self {
        Self {
            host,
            codec: EchoCodec::for_host(&host, local_v6),
            identifier,
            transport,
        }
    }

    /// Runs one round of `count` echo requests and aggregates the replies.
    ///
    /// A request that is not answered within `per_packet_timeout`, or that
    /// could not be sent at all, is lost; the round carries on regardless.
    pub async fn probe(&mut self, count: u16, payload: &[u8], per_packet_timeout: Duration) -> PingResult {
        let mut book = EchoBook::default();
        let mut buf = vec![0u8; payload.len() + RECV_HEADROOM];

        for seq in 0..count {
            let pkt = self.codec.encode_echo(self.identifier, seq, payload);

            let sent_at = Instant::now();
            book.record_send(seq, sent_at);
            if let Err(e) = self.transport.send_to(&pkt, self.host.addr).await {
                warn!(host = %self.host, seq, error = %e, "echo request could not be sent");
                book.expire(seq);
                continue;
            }

            match timeout_at(sent_at + per_packet_timeout, self.await_reply(seq, &mut book, &mut buf)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(host = %self.host, seq, error = %e, "failed to receive echo reply");
                    book.expire(seq);
                }
                Err(_) => {
                    debug!(host = %self.host, seq, "echo request timed out");
                    book.expire(seq);
                }
            }
        }

        PingResult::from_samples(&book.samples(), usize::from(count))
    }

    /// Reads until `seq` is answered. Foreign, undecodable and unrelated
    /// packets are dropped on the floor.
    async fn await_reply(&mut self, seq: u16, book: &mut EchoBook, buf: &mut [u8]) -> io::Result<()> {
        let family = self.host.family;
        loop {
            let (n, from) = self.transport.recv_from(buf).await?;
            let received = Instant::now();

            if from != self.host.addr {
                continue;
            }
            let pkt = match self.codec.decode(&buf[..n]) {
                Ok(pkt) => pkt,
                Err(e) => {
                    trace!(host = %self.host, error = %e, "discarding undecodable packet");
                    continue;
                }
            };
            if !pkt.is_echo_reply(family) || pkt.identifier != self.identifier {
                continue;
            }

            match book.resolve(pkt.sequence, received) {
                Some(rtt) => trace!(host = %self.host, seq = pkt.sequence, rtt, "echo reply"),
                None => debug!(host = %self.host, seq = pkt.sequence, "late or duplicate echo reply"),
            }
            if book.is_answered(seq) {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_matches_by_sequence() {
        let t0 = Instant::now();
        let mut book = EchoBook::default();
        book.record_send(0, t0);
        book.record_send(1, t0 + Duration::from_millis(5));

        // reply for 1 arrives first
        assert_eq!(book.resolve(1, t0 + Duration::from_millis(12)), Some(7.0));
        assert_eq!(book.resolve(0, t0 + Duration::from_millis(20)), Some(20.0));
        assert_eq!(book.samples(), vec![20.0, 7.0]);
    }

    #[test]
    fn expired_sequence_ignores_late_reply() {
        let t0 = Instant::now();
        let mut book = EchoBook::default();
        book.record_send(3, t0);
        book.expire(3);
        assert_eq!(book.resolve(3, t0 + Duration::from_millis(1)), None);
        assert!(!book.is_answered(3));
        assert!(book.samples().is_empty());
    }
}
