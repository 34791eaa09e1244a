use serde_json::{json, Value};
use std::fmt::Write as _;
use std::io::{self, Write};

use crate::types::{HostReport, HttpProbe, MysqlProbe, PingResult, ScanResult};

pub fn render_plain(report: &HostReport) -> String {
    let mut out = String::new();
    let addr = report.host.addr.to_string();
    if report.name == addr {
        out.push_str(&addr);
    } else {
        let _ = write!(out, "{} ({})", report.name, addr);
    }
    out.push('\n');

    if let Some(ping) = &report.ping {
        out.push_str(&ping_line(ping));
        out.push('\n');
    }
    if let Some(trace) = &report.trace {
        for step in &trace.steps {
            let _ = writeln!(out, "{}", step);
        }
    }
    if let Some(scan) = &report.scan {
        out.push_str(&scan_line(scan));
        out.push('\n');
    }
    out
}

fn ping_line(p: &PingResult) -> String {
    format!(
        "{:.3}\t{:.3}\t{:.3}\t{:.3}\t{:.3}",
        p.min, p.avg, p.max, p.stddev, p.loss
    )
}

fn scan_line(scan: &ScanResult) -> String {
    fn http(p: &Option<HttpProbe>) -> String {
        match p {
            Some(p) => format!("{:.3}, {}, {}", p.rtt, p.status, p.server),
            None => "None".to_string(),
        }
    }
    fn mysql(p: &Option<MysqlProbe>) -> String {
        match p {
            Some(p) => format!("{:.3}, {}", p.rtt, p.version),
            None => "None".to_string(),
        }
    }
    format!("{}\t{}\t{}", http(&scan.http), http(&scan.https), mysql(&scan.mysql))
}

/// One JSON object per host; probes that did not run are left out.
pub fn render_json(report: &HostReport) -> Value {
    let mut obj = json!({
        "addr": report.host.addr.to_string(),
        "name": report.name,
    });
    if let Value::Object(map) = &mut obj {
        if let Some(ping) = &report.ping {
            map.insert("ping".into(), json!(ping));
        }
        if let Some(trace) = &report.trace {
            map.insert("trace".into(), json!(trace));
        }
        if let Some(scan) = &report.scan {
            map.insert("scan".into(), json!(scan));
        }
    }
    obj
}

pub fn write_report<W: Write>(out: &mut W, report: &HostReport, as_json: bool) -> io::Result<()> {
    if as_json {
        writeln!(out, "{}", render_json(report))
    } else {
        out.write_all(render_plain(report).as_bytes())
    }
}
