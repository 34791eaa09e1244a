//! Per-host collection of ping, trace and scan results.

use rand::Rng;
use std::io;
use std::net::Ipv6Addr;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::VitalsError;
use crate::probes::trace::{TRACE_BASE_PORT, TRACE_PORT_SPAN};
use crate::probes::{IcmpTransport, Pinger, RawIcmpSocket, Scanner, Tracer};
use crate::types::{Family, Host, HostReport, PingResult, ScanResult, Trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Running,
    Done,
}

/// Identifiers that keep the packets of concurrent collectors apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeIds {
    pub echo_identifier: u16,
    pub trace_port: u16,
}

impl ProbeIds {
    /// Hands out `count` distinct id pairs starting at a random base.
    pub fn allocate(count: usize) -> Vec<ProbeIds> {
        let mut rng = rand::thread_rng();
        Self::from_base(count, rng.gen(), rng.gen_range(0..TRACE_PORT_SPAN))
    }

    pub fn from_base(count: usize, echo_base: u16, port_offset: u16) -> Vec<ProbeIds> {
        (0..count)
            .map(|i| {
                let i = i as u16;
                ProbeIds {
                    echo_identifier: echo_base.wrapping_add(i),
                    trace_port: TRACE_BASE_PORT + port_offset.wrapping_add(i) % TRACE_PORT_SPAN,
                }
            })
            .collect()
    }
}

/// Runs the enabled probes of one host concurrently and produces exactly
/// one [`HostReport`].
pub struct Collector {
    name: String,
    host: Host,
    ids: ProbeIds,
    config: Arc<Config>,
    local_v6: Option<Ipv6Addr>,
    state: CollectorState,
}

impl Collector {
    pub fn new(name: String, host: Host, ids: ProbeIds, config: Arc<Config>, local_v6: Option<Ipv6Addr>) -> Self {
        Self {
            name,
            host,
            ids,
            config,
            local_v6,
            state: CollectorState::Idle,
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub async fn run(&mut self) -> Result<HostReport, VitalsError> {
        self.run_with(|host: &Host| RawIcmpSocket::open(host.family)).await
    }

    /// Like [`run`](Self::run), with the echo socket supplied by `open_echo`.
    pub async fn run_with<T, F>(&mut self, open_echo: F) -> Result<HostReport, VitalsError>
    where
        T: IcmpTransport,
        F: FnOnce(&Host) -> io::Result<T> + Send,
    {
        if self.state != CollectorState::Idle {
            return Err(VitalsError::AlreadyCollected(self.name.clone()));
        }
        self.transition(CollectorState::Running);

        let this = &*self;
        let (ping, trace, scan) = tokio::join!(this.ping(open_echo), this.trace(), this.scan());

        let report = HostReport {
            name: self.name.clone(),
            host: self.host,
            ping,
            trace,
            scan,
        };
        self.transition(CollectorState::Done);
        Ok(report)
    }

    fn transition(&mut self, next: CollectorState) {
        debug!(host = %self.name, from = ?self.state, to = ?next, "collector state");
        self.state = next;
    }

    async fn ping<T, F>(&self, open_echo: F) -> Option<PingResult>
    where
        T: IcmpTransport,
        F: FnOnce(&Host) -> io::Result<T>,
    {
        let settings = &self.config.ping;
        if !settings.enabled {
            return None;
        }
        let transport = match open_echo(&self.host) {
            Ok(t) => t,
            Err(e) => {
                warn!(host = %self.name, error = %e, "could not open echo socket");
                return None;
            }
        };

        let mut pinger = Pinger::with_transport(self.host, self.ids.echo_identifier, self.local_v6, transport);
        let round = pinger.probe(settings.count, &settings.payload, settings.per_packet_timeout);
        match timeout(self.config.ping_budget(), round).await {
            Ok(result) => Some(result),
            Err(_) => {
                warn!(host = %self.name, "ping round ran over its budget");
                Some(PingResult::SENTINEL)
            }
        }
    }

    async fn trace(&self) -> Option<Trace> {
        let settings = &self.config.trace;
        if !settings.enabled {
            return None;
        }
        if self.host.family == Family::V6 {
            debug!(host = %self.name, "IPv6 route tracing is best-effort");
        }
        let mut tracer = match Tracer::open(self.host, self.ids.trace_port).await {
            Ok(t) => t,
            Err(e) => {
                warn!(host = %self.name, error = %e, "could not set up route trace");
                return None;
            }
        };

        match timeout(self.config.trace_budget(), tracer.trace(settings.max_hops, settings.per_hop_timeout)).await {
            Ok(trace) => Some(trace),
            Err(_) => {
                warn!(host = %self.name, "route trace ran over its budget");
                Some(Trace::timed_out())
            }
        }
    }

    async fn scan(&self) -> Option<ScanResult> {
        let settings = &self.config.scan;
        if !settings.enabled {
            return None;
        }
        let work = async {
            let mut scanner = Scanner::connect(&self.name, self.host, settings).await;
            let result = scanner.scan().await;
            (result, scanner)
        };

        // closing the connections is not part of the budget
        match timeout(settings.budget, work).await {
            Ok((result, scanner)) => {
                scanner.shutdown().await;
                Some(result)
            }
            Err(_) => {
                warn!(host = %self.name, "service scan ran over its budget");
                Some(ScanResult::default())
            }
        }
    }
}
