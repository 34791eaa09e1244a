use anyhow::Result;
use futures::future::join_all;
use std::io::{self, BufWriter, Write};
use std::net::Ipv6Addr;
use std::sync::Arc;
use tracing::{error, info};

use crate::cli::Cli;
use crate::collector::{Collector, ProbeIds};
use crate::config::Config;
use crate::error::VitalsError;
use crate::netutils::{check_raw_socket_privilege, local_ipv6, resolve_hosts};
use crate::output::write_report;
use crate::types::{Family, Host, HostReport};

/// Entry point of the binary: resolve, collect every host concurrently,
/// print the reports in the order the hosts were given.
pub async fn run(cli: Cli) -> Result<()> {
    let config = Arc::new(Config::from(&cli));

    let hosts = resolve_hosts(&cli.hosts).await;
    if hosts.is_empty() {
        return Err(VitalsError::NoHosts.into());
    }

    check_raw_socket_privilege()?;

    let local_v6 = if hosts.iter().any(|(_, h)| h.family == Family::V6) {
        local_ipv6().await
    } else {
        None
    };
    info!(hosts = hosts.len(), ?local_v6, "starting collection");

    let reports = collect_all(hosts, config.clone(), local_v6).await;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for report in reports {
        match report {
            Ok(r) => write_report(&mut out, &r, config.json)?,
            Err(e) => error!(error = %e, "host dropped from results"),
        }
    }
    out.flush()?;
    Ok(())
}

/// Spawns one collector task per host and joins them in submission order.
pub async fn collect_all(
    hosts: Vec<(String, Host)>,
    config: Arc<Config>,
    local_v6: Option<Ipv6Addr>,
) -> Vec<Result<HostReport, VitalsError>> {
    let ids = ProbeIds::allocate(hosts.len());

    let (names, handles): (Vec<_>, Vec<_>) = hosts
        .into_iter()
        .zip(ids)
        .map(|((name, host), ids)| {
            let mut collector = Collector::new(name.clone(), host, ids, config.clone(), local_v6);
            (name, tokio::spawn(async move { collector.run().await }))
        })
        .unzip();

    names
        .into_iter()
        .zip(join_all(handles).await)
        .map(|(host, joined)| match joined {
            Ok(report) => report,
            Err(source) => Err(VitalsError::Task { host, source }),
        })
        .collect()
}
