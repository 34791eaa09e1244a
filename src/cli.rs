use clap::{ArgAction, Parser};

/// Largest echo payload that still fits one IPv4 datagram.
pub const MAX_PAYLOAD_SIZE: u16 = 65507;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "netvitals",
    version,
    about = "Checks connection vitals: ping statistics, route traces and HTTP/HTTPS/MySQL reachability"
)]
pub struct Cli {
    /// Hostnames or IP addresses to probe
    #[arg(required = true, value_name = "HOST")]
    pub hosts: Vec<String>,

    /// Maximum number of hops for route traces
    #[arg(short = 'H', long, default_value_t = 30, value_parser = clap::value_parser!(u8).range(1..))]
    pub hops: u8,

    /// Number of echo requests per host
    #[arg(short = 'p', long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..))]
    pub pings: u16,

    /// Skip the ping round
    #[arg(short = 'P', long, action = ArgAction::SetTrue)]
    pub no_ping: bool,

    /// Trace the route to each host
    #[arg(short = 't', long, action = ArgAction::SetTrue)]
    pub trace: bool,

    /// Probe HTTP (80), HTTPS (443) and MySQL (3306)
    #[arg(short = 's', long, action = ArgAction::SetTrue)]
    pub port_scan: bool,

    /// Echo payload size in bytes
    #[arg(long, default_value_t = 41, value_parser = clap::value_parser!(u16).range(..=i64::from(MAX_PAYLOAD_SIZE)))]
    pub payload_size: u16,

    /// Print one JSON object per host
    #[arg(short = 'j', long, action = ArgAction::SetTrue)]
    pub json: bool,

    #[arg(long, default_value_t = 500)]
    pub ping_timeout_ms: u64,

    #[arg(long, default_value_t = 50)]
    pub hop_timeout_ms: u64,

    /// Timeout for each connect, read and write of the service probes
    #[arg(long, default_value_t = 80)]
    pub scan_timeout_ms: u64,

    /// Overall time a host's service probes may take
    #[arg(long, default_value_t = 500)]
    pub scan_budget_ms: u64,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        Parser::parse()
    }
}
