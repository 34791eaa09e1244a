use openssl::error::ErrorStack;
use openssl::ssl::{Ssl, SslConnector, SslMethod, SslVerifyMode};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

use super::helper::{connect_with_timeout, within};

/// Opens a TLS session to `addr` without verifying the peer.
///
/// The certificate is never checked, only reachability and the HTTP banner
/// behind it matter. SNI is sent when `server_name` is a DNS name.
pub async fn connect_tls(addr: SocketAddr, server_name: &str, op_timeout: Duration) -> io::Result<SslStream<TcpStream>> {
    let tcp = connect_with_timeout(addr, op_timeout).await?;
    let ssl = insecure_ssl(server_name).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let mut tls = SslStream::new(ssl, tcp).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    within(op_timeout, async {
        Pin::new(&mut tls).connect().await.map_err(|e| match e.into_io_error() {
            Ok(io_err) => io_err,
            Err(e) => io::Error::new(io::ErrorKind::ConnectionAborted, e),
        })
    })
    .await?;

    Ok(tls)
}

fn insecure_ssl(server_name: &str) -> Result<Ssl, ErrorStack> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    builder.set_verify(SslVerifyMode::NONE);
    let connector = builder.build();

    // SNI must not carry an IP literal
    let is_literal = server_name.parse::<IpAddr>().is_ok();
    connector
        .configure()?
        .verify_hostname(false)
        .use_server_name_indication(!is_literal)
        .into_ssl(server_name)
}
