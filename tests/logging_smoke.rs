// tests/logging_smoke.rs
use netvitals::collector::ProbeIds;
use netvitals::config::Config;
use netvitals::scan::collect_all;
use netvitals::types::Host;
use std::sync::Arc;

#[tokio::test]
async fn logging_smoke() {
    // second call must be a no-op, not a panic
    netvitals::init_tracing(3);
    netvitals::init_tracing(0);

    let mut config = Config::default();
    config.ping.enabled = false;
    let hosts = vec![("localhost".to_string(), Host::new("127.0.0.1".parse().unwrap()))];

    let reports = collect_all(hosts, Arc::new(config), None).await;
    let report = reports.into_iter().next().unwrap().unwrap();
    println!("HostReport: {:#?}", report);
    assert!(report.ping.is_none());
    assert_eq!(ProbeIds::allocate(0).len(), 0);
}
