//! HTTP, HTTPS and MySQL probes against one host.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_openssl::SslStream;
use tracing::{debug, warn};

use super::helper::{connect_with_timeout, within};
use super::http::{head_exchange, head_request};
use super::mysql::probe_mysql;
use super::tls::connect_tls;
use crate::config::ScanSettings;
use crate::types::{Host, HttpProbe, ScanResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceAddrs {
    pub http: SocketAddr,
    pub https: SocketAddr,
    pub mysql: SocketAddr,
}

impl ServiceAddrs {
    pub fn new(host: &Host, settings: &ScanSettings) -> Self {
        Self {
            http: SocketAddr::new(host.addr, settings.ports.http),
            https: SocketAddr::new(host.addr, settings.ports.https),
            mysql: SocketAddr::new(host.addr, settings.ports.mysql),
        }
    }
}

/// Keeps the HTTP and HTTPS connections open across scans; MySQL gets a
/// fresh connection every time.
pub struct Scanner {
    addrs: ServiceAddrs,
    server_name: String,
    request: Vec<u8>,
    op_timeout: Duration,
    http: Option<TcpStream>,
    https: Option<SslStream<TcpStream>>,
}

impl Scanner {
    /// Opens the persistent connections. A port that cannot be reached is
    /// retried on the first scan.
    pub async fn connect(name: &str, host: Host, settings: &ScanSettings) -> Self {
        let addrs = ServiceAddrs::new(&host, settings);
        let op_timeout = settings.op_timeout;

        let (http, https) = tokio::join!(
            connect_with_timeout(addrs.http, op_timeout),
            connect_tls(addrs.https, name, op_timeout),
        );
        let http = http
            .map_err(|e| debug!(addr = %addrs.http, error = %e, "http: initial connect failed"))
            .ok();
        let https = https
            .map_err(|e| debug!(addr = %addrs.https, error = %e, "https: initial connect failed"))
            .ok();

        Self {
            addrs,
            server_name: name.to_string(),
            request: head_request(name),
            op_timeout,
            http,
            https,
        }
    }

    /// Probes the three services concurrently; a slow one does not hold up
    /// the others.
    pub async fn scan(&mut self) -> ScanResult {
        let Scanner {
            addrs,
            server_name,
            request,
            op_timeout,
            http,
            https,
        } = self;
        let addrs = *addrs;
        let op_timeout = *op_timeout;
        let name = server_name.as_str();
        let request = request.as_slice();

        let (http, https, mysql) = tokio::join!(
            exchange_persistent("http", http, request, op_timeout, move || {
                connect_with_timeout(addrs.http, op_timeout)
            }),
            exchange_persistent("https", https, request, op_timeout, move || {
                connect_tls(addrs.https, name, op_timeout)
            }),
            probe_mysql(addrs.mysql, op_timeout),
        );

        ScanResult { http, https, mysql }
    }

    /// Closes the persistent connections, sending TLS close_notify.
    pub async fn shutdown(mut self) {
        if let Some(mut s) = self.http.take() {
            let _ = within(self.op_timeout, s.shutdown()).await;
        }
        if let Some(mut s) = self.https.take() {
            let _ = within(self.op_timeout, s.shutdown()).await;
        }
    }
}

/// Sends the HEAD request over `slot`, re-opening the connection once if it
/// turned out to be broken.
async fn exchange_persistent<S, F, Fut>(
    service: &'static str,
    slot: &mut Option<S>,
    request: &[u8],
    op_timeout: Duration,
    reconnect: F,
) -> Option<HttpProbe>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnOnce() -> Fut,
    Fut: Future<Output = io::Result<S>>,
{
    if let Some(stream) = slot.as_mut() {
        match head_exchange(stream, request, op_timeout).await {
            Ok(probe) => return Some(probe),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(service, error = %e, "probe failed");
                return None;
            }
            Err(e) => debug!(service, error = %e, "persistent connection broken, reconnecting"),
        }
    }
    *slot = None;

    let mut stream = match reconnect().await {
        Ok(s) => s,
        Err(e) => {
            warn!(service, error = %e, "could not connect");
            return None;
        }
    };
    match head_exchange(&mut stream, request, op_timeout).await {
        Ok(probe) => {
            *slot = Some(stream);
            Some(probe)
        }
        Err(e) => {
            warn!(service, error = %e, "probe failed");
            None
        }
    }
}
