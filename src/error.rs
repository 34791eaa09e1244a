use std::io;
use thiserror::Error;

/// Errors that escape a probe or the driver.
///
/// Only `PermissionDenied` and `NoHosts` are fatal for a run; everything a
/// single probe runs into is folded into an absent or sentinel result instead.
#[derive(Debug, Error)]
pub enum VitalsError {
    #[error("cannot open raw sockets ({0}); try running as root, with `capsh` or with `sudo`")]
    PermissionDenied(#[source] io::Error),

    #[error("no hosts could be resolved")]
    NoHosts,

    #[error("failed to set up {what} socket: {source}")]
    Socket {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("results for {0} were already collected")]
    AlreadyCollected(String),

    #[error("collector for {host} did not finish: {source}")]
    Task {
        host: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl VitalsError {
    pub fn socket(what: &'static str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            return VitalsError::PermissionDenied(source);
        }
        VitalsError::Socket { what, source }
    }
}

/// Reasons a received buffer is not a usable ICMP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("buffer of {0} bytes is too short for an ICMP message")]
    Truncated(usize),

    #[error("not an IPv4 datagram (version nibble {0})")]
    NotIpv4(u8),
}
