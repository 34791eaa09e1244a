use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use super::helper::{elapsed_ms, within};
use crate::types::{HttpProbe, UNKNOWN};

pub const RESPONSE_BUF_LEN: usize = 1024;

/// `HEAD /` on a keep-alive connection. IPv6 literals are bracketed in the
/// Host header.
pub fn head_request(name: &str) -> Vec<u8> {
    let host = match name.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{}]", v6),
        _ => name.to_string(),
    };
    format!("HEAD / HTTP/1.1\r\nConnection: Keep-Alive\r\nHost: {}\r\n\r\n", host).into_bytes()
}

/// Writes `request` and reads one response chunk of at most 1 KiB.
///
/// A peer that closes the connection yields `UnexpectedEof`; a reply that is
/// not HTTP yields `InvalidData`.
pub async fn head_exchange<S>(stream: &mut S, request: &[u8], op_timeout: Duration) -> io::Result<HttpProbe>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; RESPONSE_BUF_LEN];
    let started = Instant::now();

    within(op_timeout, stream.write_all(request)).await?;
    let n = within(op_timeout, stream.read(&mut buf)).await?;
    let rtt = elapsed_ms(started);

    if n == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer"));
    }
    let (status, server) = parse_response(&buf[..n])
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "response is not HTTP"))?;
    Ok(HttpProbe { rtt, status, server })
}

/// Status code and `Server` header of a (possibly truncated) response head.
pub fn parse_response(resp: &[u8]) -> Option<(String, String)> {
    // "HTTP/1.1 " is 9 bytes, the code follows
    if !resp.starts_with(b"HTTP/") {
        return None;
    }
    let status = std::str::from_utf8(resp.get(9..12)?).ok()?.to_string();
    let server = server_header(resp).unwrap_or_else(|| UNKNOWN.to_string());
    Some((status, server))
}

pub fn server_header(resp: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(resp);
    text.split("\r\n")
        .skip(1)
        .take_while(|line| !line.is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("server")
                .then(|| value.trim().to_string())
        })
}
