use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};

/// Runs one socket operation under `limit`, turning expiry into `TimedOut`.
pub async fn within<F, T>(limit: Duration, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "operation timed out")),
    }
}

pub async fn connect_with_timeout(addr: SocketAddr, limit: Duration) -> io::Result<TcpStream> {
    let stream = within(limit, TcpStream::connect(addr)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Milliseconds since `since`, with sub-millisecond precision.
pub fn elapsed_ms(since: Instant) -> f64 {
    duration_ms(since.elapsed())
}

pub fn duration_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_keep_fraction() {
        assert_eq!(duration_ms(Duration::from_micros(15_250)), 15.25);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_operation_is_timed_out() {
        let err = within(Duration::from_millis(10), std::future::pending::<io::Result<()>>())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
