//! ICMP / ICMPv6 echo codec.
//!
//! Outbound packets are bare ICMP messages (the kernel adds the IP header).
//! Inbound buffers come straight off a raw socket: an `AF_INET` raw socket
//! delivers the IPv4 header in front of the ICMP message, an `AF_INET6` one
//! delivers the ICMPv6 message alone.

use std::net::{IpAddr, Ipv6Addr};

use crate::error::DecodeError;
use crate::types::{Family, Host};

pub const ICMP_HEADER_LEN: usize = 8;
pub const IPV4_HEADER_LEN: usize = 20;
const NEXT_HEADER_ICMPV6: u8 = 58;

/// Type numbers of the messages this crate sends or listens for.
#[derive(Debug, PartialEq, Eq)]
pub struct Layout {
    pub echo_request: u8,
    pub echo_reply: u8,
    pub time_exceeded: u8,
    pub unreachable: u8,
    /// Raw sockets of this family hand us the IP header as well.
    pub ip_header_prepended: bool,
}

pub const V4_LAYOUT: Layout = Layout {
    echo_request: 8,
    echo_reply: 0,
    time_exceeded: 11,
    unreachable: 3,
    ip_header_prepended: true,
};

pub const V6_LAYOUT: Layout = Layout {
    echo_request: 128,
    echo_reply: 129,
    time_exceeded: 3,
    unreachable: 1,
    ip_header_prepended: false,
};

impl Family {
    pub fn layout(self) -> &'static Layout {
        match self {
            Family::V4 => &V4_LAYOUT,
            Family::V6 => &V6_LAYOUT,
        }
    }
}

/// RFC 1071 internet checksum.
///
/// The returned value goes onto the wire big-endian (`to_be_bytes`). A buffer
/// that already carries its correct checksum sums to zero.
pub fn checksum_v4(bytes: &[u8]) -> u16 {
    fold(sum_words(bytes))
}

/// ICMPv6 checksum over the RFC 2460 pseudo header followed by `message`.
pub fn checksum_v6(message: &[u8], local: &Ipv6Addr, remote: &Ipv6Addr) -> u16 {
    let mut buf = Vec::with_capacity(40 + message.len());
    buf.extend_from_slice(&local.octets());
    buf.extend_from_slice(&remote.octets());
    buf.extend_from_slice(&(message.len() as u32).to_be_bytes());
    buf.extend_from_slice(&[0, 0, 0, NEXT_HEADER_ICMPV6]);
    buf.extend_from_slice(message);
    fold(sum_words(&buf))
}

fn sum_words(bytes: &[u8]) -> u64 {
    let mut chunks = bytes.chunks_exact(2);
    let mut sum: u64 = 0;
    for word in &mut chunks {
        sum += u64::from(u16::from_be_bytes([word[0], word[1]]));
    }
    // odd trailing byte is padded with a zero low byte
    if let [last] = chunks.remainder() {
        sum += u64::from(*last) << 8;
    }
    sum
}

fn fold(mut sum: u64) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum >> 16) + (sum & 0xffff);
    }
    !(sum as u16)
}

/// Family-specific encoder/decoder, chosen once per host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoCodec {
    V4,
    /// ICMPv6 needs both ends of the path for its pseudo-header checksum.
    V6 { local: Ipv6Addr, remote: Ipv6Addr },
}

impl EchoCodec {
    /// `local_v6` is the process-wide source address; `::` is used when the
    /// machine has no IPv6 route.
    pub fn for_host(host: &Host, local_v6: Option<Ipv6Addr>) -> Self {
        match host.addr {
            IpAddr::V4(_) => EchoCodec::V4,
            IpAddr::V6(remote) => EchoCodec::V6 {
                local: local_v6.unwrap_or(Ipv6Addr::UNSPECIFIED),
                remote,
            },
        }
    }

    pub fn family(&self) -> Family {
        match self {
            EchoCodec::V4 => Family::V4,
            EchoCodec::V6 { .. } => Family::V6,
        }
    }

    pub fn layout(&self) -> &'static Layout {
        self.family().layout()
    }

    pub fn checksum(&self, message: &[u8]) -> u16 {
        match self {
            EchoCodec::V4 => checksum_v4(message),
            EchoCodec::V6 { local, remote } => checksum_v6(message, local, remote),
        }
    }

    /// Builds an Echo Request with the checksum patched in.
    pub fn encode_echo(&self, identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
        let mut pkt = Vec::with_capacity(ICMP_HEADER_LEN + payload.len());
        pkt.extend_from_slice(&[self.layout().echo_request, 0, 0, 0]);
        pkt.extend_from_slice(&identifier.to_be_bytes());
        pkt.extend_from_slice(&sequence.to_be_bytes());
        pkt.extend_from_slice(payload);

        let csum = self.checksum(&pkt);
        pkt[2..4].copy_from_slice(&csum.to_be_bytes());
        pkt
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<ParsedPacket, DecodeError> {
        decode(self.family(), bytes)
    }
}

/// Header fields of a received ICMP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedPacket {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: u16,
}

impl ParsedPacket {
    pub fn is_echo_reply(&self, family: Family) -> bool {
        self.icmp_type == family.layout().echo_reply && self.code == 0
    }
}

/// Decodes a buffer as delivered by a raw socket of `family`.
pub fn decode(family: Family, bytes: &[u8]) -> Result<ParsedPacket, DecodeError> {
    decode_message(icmp_message(family, bytes)?)
}

/// Decodes a bare ICMP message (no IP header in front).
pub fn decode_message(msg: &[u8]) -> Result<ParsedPacket, DecodeError> {
    if msg.len() < ICMP_HEADER_LEN {
        return Err(DecodeError::Truncated(msg.len()));
    }
    Ok(ParsedPacket {
        icmp_type: msg[0],
        code: msg[1],
        checksum: u16::from_be_bytes([msg[2], msg[3]]),
        identifier: u16::from_be_bytes([msg[4], msg[5]]),
        sequence: u16::from_be_bytes([msg[6], msg[7]]),
    })
}

/// Strips whatever the raw socket put in front of the ICMP message.
pub fn icmp_message(family: Family, bytes: &[u8]) -> Result<&[u8], DecodeError> {
    let offset = match family {
        Family::V6 => 0,
        Family::V4 => {
            let first = *bytes.first().ok_or(DecodeError::Truncated(0))?;
            if first >> 4 != 4 {
                return Err(DecodeError::NotIpv4(first >> 4));
            }
            (usize::from(first & 0x0f) * 4).max(IPV4_HEADER_LEN)
        }
    };
    match bytes.get(offset..) {
        Some(msg) if msg.len() >= ICMP_HEADER_LEN => Ok(msg),
        Some(msg) => Err(DecodeError::Truncated(msg.len())),
        None => Err(DecodeError::Truncated(bytes.len())),
    }
}
