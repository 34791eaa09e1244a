use std::time::Duration;

use crate::cli::Cli;

/// Echo payload, cycled or cut to the requested size.
pub const PAYLOAD_PHRASE: &[u8] = b"The very model of a modern Major General.";

/// Slack on top of a probe's own worst case before its collector gives up.
pub const BUDGET_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePorts {
    pub http: u16,
    pub https: u16,
    pub mysql: u16,
}

impl Default for ServicePorts {
    fn default() -> Self {
        Self {
            http: 80,
            https: 443,
            mysql: 3306,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PingSettings {
    pub enabled: bool,
    pub count: u16,
    pub payload: Vec<u8>,
    pub per_packet_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TraceSettings {
    pub enabled: bool,
    pub max_hops: u8,
    pub per_hop_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub enabled: bool,
    pub ports: ServicePorts,
    /// Limit for every single connect, read and write.
    pub op_timeout: Duration,
    pub budget: Duration,
}

/// Immutable run configuration, shared by every collector.
#[derive(Debug, Clone)]
pub struct Config {
    pub ping: PingSettings,
    pub trace: TraceSettings,
    pub scan: ScanSettings,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ping: PingSettings {
                enabled: true,
                count: 10,
                payload: payload_of_size(41),
                per_packet_timeout: Duration::from_millis(500),
            },
            trace: TraceSettings {
                enabled: false,
                max_hops: 30,
                per_hop_timeout: Duration::from_millis(50),
            },
            scan: ScanSettings {
                enabled: false,
                ports: ServicePorts::default(),
                op_timeout: Duration::from_millis(80),
                budget: Duration::from_millis(500),
            },
            json: false,
        }
    }
}

impl Config {
    pub fn ping_budget(&self) -> Duration {
        self.ping.per_packet_timeout * u32::from(self.ping.count) + BUDGET_GRACE
    }

    pub fn trace_budget(&self) -> Duration {
        self.trace.per_hop_timeout * u32::from(self.trace.max_hops) + BUDGET_GRACE
    }
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        Self {
            ping: PingSettings {
                enabled: !cli.no_ping,
                count: cli.pings,
                payload: payload_of_size(usize::from(cli.payload_size)),
                per_packet_timeout: Duration::from_millis(cli.ping_timeout_ms),
            },
            trace: TraceSettings {
                enabled: cli.trace,
                max_hops: cli.hops,
                per_hop_timeout: Duration::from_millis(cli.hop_timeout_ms),
            },
            scan: ScanSettings {
                enabled: cli.port_scan,
                ports: ServicePorts::default(),
                op_timeout: Duration::from_millis(cli.scan_timeout_ms),
                budget: Duration::from_millis(cli.scan_budget_ms),
            },
            json: cli.json,
        }
    }
}

pub fn payload_of_size(size: usize) -> Vec<u8> {
    PAYLOAD_PHRASE.iter().copied().cycle().take(size).collect()
}
