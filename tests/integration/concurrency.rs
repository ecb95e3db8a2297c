//! Concurrency tests: repository writes under concurrent load, the TCP
//! scanner's single-scan-in-flight guarantee, and the probe scheduler
//! running several hosts' tick loops independently.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use netpulse::probes::tcp_scan::{PortScanConfig, ScanCallbacks, TcpPortScanner};
use netpulse::runtime::Runtime;
use netpulse::scheduler::ProbeScheduler;
use netpulse::storage::models::PortRange;

use super::helpers::{new_host, test_storage};

#[tokio::test]
async fn concurrent_host_inserts_all_land_with_unique_ids() {
    let storage = test_storage().await;

    let mut tasks = Vec::new();
    for i in 0..20 {
        let hosts = storage.hosts.clone();
        tasks.push(tokio::spawn(async move {
            hosts.insert(&new_host(&format!("host-{i}"), &format!("10.0.0.{i}"))).await.unwrap()
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap());
    }

    assert_eq!(ids.len(), 20, "every concurrent insert must produce a distinct id");
    assert_eq!(storage.hosts.count().await.unwrap(), 20);
}

/// spec.md §4.5 Concurrency: one scanner instance allows only one
/// outstanding scan at a time.
#[tokio::test]
async fn second_concurrent_scan_on_same_scanner_is_rejected() {
    let scanner = Arc::new(TcpPortScanner::new());
    let config = PortScanConfig {
        target_address: "127.0.0.1".to_string(),
        port_range: PortRange::Custom,
        custom_ports: vec![1],
        max_concurrency: 1,
        timeout: Duration::from_millis(200),
    };

    let first = {
        let scanner = scanner.clone();
        let config = config.clone();
        tokio::spawn(async move { scanner.scan(config, ScanCallbacks::default()).await })
    };

    // Give the first scan a chance to flip the in-flight flag before the
    // second call races it.
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(scanner.is_scanning());

    let second = scanner.scan(config, ScanCallbacks::default()).await;
    assert!(second.is_err(), "a scan already in progress must reject a concurrent one");

    first.await.unwrap().unwrap();
    assert!(!scanner.is_scanning());
}

#[tokio::test]
async fn probe_scheduler_runs_several_hosts_independently() {
    let runtime = Runtime::new();
    let scheduler = ProbeScheduler::new(runtime.clone());
    let storage = test_storage().await;

    let tick_counts: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();

    for (i, counter) in tick_counts.iter().enumerate() {
        let mut host = new_host(&format!("probe-{i}"), "127.0.0.1");
        host.id = storage.hosts.insert(&host).await.unwrap();
        host.ping_interval_seconds = 1;
        let counter = counter.clone();
        scheduler
            .start_monitoring(host, move |_result| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
    }

    // The first tick fires after one `ping_interval_seconds`, not immediately.
    tokio::time::sleep(Duration::from_millis(1300)).await;

    for counter in &tick_counts {
        assert!(counter.load(Ordering::SeqCst) >= 1, "every host's scheduler must tick independently");
    }

    scheduler.stop_all().await;
    runtime.stop();
}
