use netvitals::config::{ScanSettings, ServicePorts};
use netvitals::probes::mysql::probe_mysql;
use netvitals::probes::Scanner;
use netvitals::types::{Host, UNKNOWN};
use openssl::pkey::PKey;
use openssl::ssl::{Ssl, SslAcceptor, SslMethod};
use openssl::x509::X509;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_openssl::SslStream;

const NGINX: &[u8] = b"HTTP/1.1 200 OK\r\nServer: nginx/1.18\r\nContent-Length: 0\r\n\r\n";

fn localhost() -> Host {
    Host::new("127.0.0.1".parse().unwrap())
}

fn settings(http: u16, https: u16, mysql: u16) -> ScanSettings {
    ScanSettings {
        enabled: true,
        ports: ServicePorts { http, https, mysql },
        op_timeout: Duration::from_secs(1),
        budget: Duration::from_secs(5),
    }
}

/// A port nothing listens on.
async fn closed_port() -> u16 {
    let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
    l.local_addr().unwrap().port()
}

/// Answers up to `per_conn` requests on each connection, then hangs up.
async fn serve_head<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S, response: &'static [u8], per_conn: usize) {
    let mut buf = [0u8; 1024];
    for _ in 0..per_conn {
        match stream.read(&mut buf).await {
            Ok(n) if n > 0 => {}
            _ => return,
        }
        if stream.write_all(response).await.is_err() {
            return;
        }
    }
}

async fn http_server(response: &'static [u8], per_conn: usize) -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve_head(tcp, response, per_conn));
        }
    });
    (port, accepted)
}

fn tls_acceptor() -> SslAcceptor {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let x509 = X509::from_pem(cert.serialize_pem().unwrap().as_bytes()).unwrap();
    let key = PKey::private_key_from_pem(cert.serialize_private_key_pem().as_bytes()).unwrap();

    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    builder.set_private_key(&key).unwrap();
    builder.set_certificate(&x509).unwrap();
    builder.build()
}

async fn https_server(response: &'static [u8]) -> u16 {
    let acceptor = Arc::new(tls_acceptor());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let ssl = Ssl::new(acceptor.context()).unwrap();
                let mut stream = SslStream::new(ssl, tcp).unwrap();
                if Pin::new(&mut stream).accept().await.is_ok() {
                    serve_head(stream, response, usize::MAX).await;
                }
            });
        }
    });
    port
}

async fn mysql_server(greeting: Vec<u8>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut tcp, _)) = listener.accept().await {
            let greeting = greeting.clone();
            tokio::spawn(async move {
                let _ = tcp.write_all(&greeting).await;
                let mut sink = [0u8; 64];
                while let Ok(n) = tcp.read(&mut sink).await {
                    if n == 0 {
                        break;
                    }
                }
            });
        }
    });
    port
}

fn mysql_greeting(version: &str) -> Vec<u8> {
    let mut payload = vec![10u8];
    payload.extend_from_slice(version.as_bytes());
    payload.push(0);
    payload.extend_from_slice(&7u32.to_le_bytes());
    payload.extend_from_slice(b"12345678\0");
    let mut pkt = (payload.len() as u32).to_le_bytes()[..3].to_vec();
    pkt.push(0);
    pkt.extend(payload);
    pkt
}

#[tokio::test]
async fn only_http_present() {
    let (http, _) = http_server(NGINX, usize::MAX).await;
    let settings = settings(http, closed_port().await, closed_port().await);

    let mut scanner = Scanner::connect("127.0.0.1", localhost(), &settings).await;
    let result = scanner.scan().await;

    let probe = result.http.expect("http should answer");
    assert_eq!(probe.status, "200");
    assert_eq!(probe.server, "nginx/1.18");
    assert!(probe.rtt >= 0.0);
    assert!(result.https.is_none());
    assert!(result.mysql.is_none());
}

#[tokio::test]
async fn http_connection_is_reused_across_scans() {
    let (http, accepted) = http_server(NGINX, usize::MAX).await;
    let settings = settings(http, closed_port().await, closed_port().await);

    let mut scanner = Scanner::connect("127.0.0.1", localhost(), &settings).await;
    for _ in 0..3 {
        assert!(scanner.scan().await.http.is_some());
    }
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dropped_connection_is_reopened_once() {
    // server hangs up after every response
    let (http, accepted) = http_server(NGINX, 1).await;
    let settings = settings(http, closed_port().await, closed_port().await);

    let mut scanner = Scanner::connect("127.0.0.1", localhost(), &settings).await;
    assert!(scanner.scan().await.http.is_some());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(scanner.scan().await.http.is_some());
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_server_header_reads_unknown() {
    let (http, _) = http_server(b"HTTP/1.0 404 Not Found\r\nContent-Length: 0\r\n\r\n", usize::MAX).await;
    let settings = settings(http, closed_port().await, closed_port().await);

    let mut scanner = Scanner::connect("127.0.0.1", localhost(), &settings).await;
    let probe = scanner.scan().await.http.unwrap();
    assert_eq!(probe.status, "404");
    assert_eq!(probe.server, UNKNOWN);
}

#[tokio::test]
async fn https_over_self_signed_certificate() {
    let https = https_server(b"HTTP/1.1 204 No Content\r\nServer: TestServer\r\n\r\n").await;
    let settings = settings(closed_port().await, https, closed_port().await);

    let mut scanner = Scanner::connect("localhost", localhost(), &settings).await;
    let result = scanner.scan().await;
    let probe = result.https.expect("https should answer");
    assert_eq!(probe.status, "204");
    assert_eq!(probe.server, "TestServer");
    assert!(result.http.is_none());

    // the TLS session stays up for the next round
    assert!(scanner.scan().await.https.is_some());
    scanner.shutdown().await;
}

#[tokio::test]
async fn all_three_services() {
    let (http, _) = http_server(NGINX, usize::MAX).await;
    let https = https_server(NGINX).await;
    let mysql = mysql_server(mysql_greeting("5.7.44-log")).await;

    let mut scanner = Scanner::connect("127.0.0.1", localhost(), &settings(http, https, mysql)).await;
    let result = scanner.scan().await;
    assert!(result.http.is_some() && result.https.is_some());
    assert_eq!(result.mysql.unwrap().version, "5.7.44-log");
}

#[tokio::test]
async fn mysql_greeting_versions() {
    let addr = |port| SocketAddr::from(([127, 0, 0, 1], port));
    let timeout = Duration::from_secs(1);

    let port = mysql_server(mysql_greeting("8.0.36")).await;
    let probe = probe_mysql(addr(port), timeout).await.unwrap();
    assert_eq!(probe.version, "8.0.36");
    assert!(probe.rtt >= 0.0);

    let port = mysql_server(b"\x07\x00\x00\x00\xff\x6a\x04Host".to_vec()).await;
    assert_eq!(probe_mysql(addr(port), timeout).await.unwrap().version, UNKNOWN);

    assert!(probe_mysql(addr(closed_port().await), timeout).await.is_none());
}
