pub mod cli;
pub mod collector;
pub mod config;
pub mod error;
pub mod netutils;
pub mod output;
pub mod probes;
pub mod scan;
pub mod types;

pub use scan::run;

use tracing_subscriber::EnvFilter;

/// Logs go to stderr; `RUST_LOG` wins over the `-v` count.
pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
