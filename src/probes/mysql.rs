use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tracing::warn;

use super::helper::{connect_with_timeout, elapsed_ms, within};
use crate::types::{MysqlProbe, UNKNOWN};

const PACKET_HEADER_LEN: usize = 4;
/// First payload byte of an ERR packet (e.g. "Host is blocked").
const ERR_PACKET: u8 = 0xff;

/// Fields of the server's initial handshake packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlHandshake {
    pub protocol_version: u8,
    pub server_version: Option<String>,
    pub connection_id: Option<u32>,
}

/// Parses the greeting a MySQL server sends right after accept.
///
/// Layout: 3-byte LE payload length, sequence id, protocol version, then the
/// NUL-terminated server version. Returns `None` when the buffer is too short
/// to hold even the protocol byte.
pub fn parse_handshake(buf: &[u8]) -> Option<MysqlHandshake> {
    let protocol_version = *buf.get(PACKET_HEADER_LEN)?;
    if protocol_version == ERR_PACKET {
        return Some(MysqlHandshake {
            protocol_version,
            server_version: None,
            connection_id: None,
        });
    }

    let rest = &buf[PACKET_HEADER_LEN + 1..];
    let Some(end) = rest.iter().position(|&b| b == 0) else {
        return Some(MysqlHandshake {
            protocol_version,
            server_version: None,
            connection_id: None,
        });
    };

    let server_version = std::str::from_utf8(&rest[..end])
        .ok()
        .filter(|v| !v.is_empty() && !v.chars().any(char::is_control))
        .map(str::to_owned);
    let connection_id = rest
        .get(end + 1..end + 5)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));

    Some(MysqlHandshake {
        protocol_version,
        server_version,
        connection_id,
    })
}

/// Opens a fresh connection, reads the greeting and closes again.
///
/// The rtt runs from the start of the connect to the arrival of the greeting.
pub async fn probe_mysql(addr: SocketAddr, op_timeout: Duration) -> Option<MysqlProbe> {
    let started = Instant::now();
    let mut stream = match connect_with_timeout(addr, op_timeout).await {
        Ok(s) => s,
        Err(e) => {
            warn!(%addr, error = %e, "mysql: connect failed");
            return None;
        }
    };

    let mut buf = [0u8; 1024];
    let n = match within(op_timeout, stream.read(&mut buf)).await {
        Ok(0) => {
            warn!(%addr, "mysql: connection closed before greeting");
            return None;
        }
        Ok(n) => n,
        Err(e) => {
            warn!(%addr, error = %e, "mysql: failed to read greeting");
            return None;
        }
    };
    let rtt = elapsed_ms(started);

    let version = match parse_handshake(&buf[..n]).and_then(|h| h.server_version) {
        Some(v) => v,
        None => {
            warn!(%addr, "mysql: greeting could not be decoded");
            UNKNOWN.to_string()
        }
    };
    Some(MysqlProbe { rtt, version })
}
