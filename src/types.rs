use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;

/// Address family of a resolved target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

/// A resolved target. Immutable once the resolver hands it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Host {
    pub addr: IpAddr,
    pub family: Family,
}

impl Host {
    pub fn new(addr: IpAddr) -> Self {
        Self { addr, family: Family::of(&addr) }
    }
}

impl From<IpAddr> for Host {
    fn from(addr: IpAddr) -> Self {
        Host::new(addr)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}

/// Aggregate round-trip statistics of one probing round, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PingResult {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub stddev: f64,
    #[serde(rename = "lossPercent")]
    pub loss: f64,
}

impl PingResult {
    /// "No replies received."
    pub const SENTINEL: PingResult = PingResult {
        min: -1.0,
        avg: -1.0,
        max: -1.0,
        stddev: -1.0,
        loss: 100.0,
    };

    /// Builds the statistics from the round-trip samples of the answered
    /// packets out of `sent` requests.
    pub fn from_samples(samples: &[f64], sent: usize) -> Self {
        if samples.is_empty() || sent == 0 {
            return Self::SENTINEL;
        }

        let n = samples.len() as f64;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = samples.iter().sum::<f64>() / n;

        let stddev = if samples.len() < 2 {
            0.0
        } else {
            let var = samples.iter().map(|s| (s - avg).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        };

        let lost = sent.saturating_sub(samples.len());
        let loss = lost as f64 / sent as f64 * 100.0;

        Self { min, avg, max, stddev, loss }
    }

    pub fn is_sentinel(&self) -> bool {
        self.loss >= 100.0 && self.avg < 0.0
    }
}

/// One hop of a route trace. `addr == None` is the "no response" marker.
#[derive(Debug, Clone, Copy)]
pub struct TraceStep {
    pub addr: Option<IpAddr>,
    pub rtt: f64,
}

impl TraceStep {
    pub fn new(addr: IpAddr, rtt: f64) -> Self {
        Self { addr: Some(addr), rtt }
    }

    pub const fn no_response() -> Self {
        Self { addr: None, rtt: -1.0 }
    }

    /// True when the hop answered within its timeout.
    pub fn responded(&self) -> bool {
        self.addr.is_some() && self.rtt >= 0.0
    }
}

// rtt is informational only
impl PartialEq for TraceStep {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr {
            Some(addr) if self.rtt >= 0.0 => write!(f, "{}\t{:.3}", addr, self.rtt),
            _ => f.write_str("*"),
        }
    }
}

impl Serialize for TraceStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.addr {
            Some(addr) if self.rtt >= 0.0 => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&addr.to_string())?;
                seq.serialize_element(&self.rtt)?;
                seq.end()
            }
            _ => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element("*")?;
                seq.end()
            }
        }
    }
}

/// Ordered hop list, index + 1 is the hop number.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Trace {
    pub steps: Vec<TraceStep>,
}

impl Trace {
    pub fn new(steps: Vec<TraceStep>) -> Self {
        Self { steps }
    }

    /// Substituted when the tracer blows its budget.
    pub fn timed_out() -> Self {
        Self { steps: vec![TraceStep::no_response()] }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn responding(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps.iter().filter(|s| s.responded())
    }
}

/// Two traces are the same route when their responding hops match in order.
impl PartialEq for Trace {
    fn eq(&self, other: &Self) -> bool {
        self.responding().eq(other.responding())
    }
}

impl From<Vec<TraceStep>> for Trace {
    fn from(steps: Vec<TraceStep>) -> Self {
        Trace::new(steps)
    }
}

/// Outcome of an HTTP or HTTPS HEAD probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpProbe {
    #[serde(rename = "latencyMs")]
    pub rtt: f64,
    #[serde(rename = "statusOrVersion")]
    pub status: String,
    #[serde(rename = "serverBanner")]
    pub server: String,
}

/// Outcome of the MySQL handshake probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MysqlProbe {
    #[serde(rename = "latencyMs")]
    pub rtt: f64,
    #[serde(rename = "statusOrVersion")]
    pub version: String,
}

/// Placeholder used when a banner or version could not be decoded.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanResult {
    pub http: Option<HttpProbe>,
    pub https: Option<HttpProbe>,
    pub mysql: Option<MysqlProbe>,
}

/// Everything collected for one host. A field is `None` when its probe was
/// disabled or could not be set up.
#[derive(Debug, Clone)]
pub struct HostReport {
    pub name: String,
    pub host: Host,
    pub ping: Option<PingResult>,
    pub trace: Option<Trace>,
    pub scan: Option<ScanResult>,
}

impl HostReport {
    pub fn empty(name: impl Into<String>, host: Host) -> Self {
        Self {
            name: name.into(),
            host,
            ping: None,
            trace: None,
            scan: None,
        }
    }
}
