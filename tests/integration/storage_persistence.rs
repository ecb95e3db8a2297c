//! Cross-repository persistence against a real tempfile-backed SQLite
//! database (spec.md §8 invariants 1-4), plus the retention sweep's cutoff
//! behavior (spec.md §4.13).

use chrono::{Duration as ChronoDuration, Utc};
use netpulse::retention::Retention;
use netpulse::runtime::Runtime;
use netpulse::storage::models::{Alert, AlertSeverity, AlertType, PingResult, PortScanResult, PortState};
use netpulse::storage::{HostRepository, MetricsRepository, ScheduledScanRepository, SnmpRepository, Storage};
use tempfile::tempdir;

use super::helpers::new_host;

#[tokio::test]
async fn ping_results_persist_and_statistics_reflect_the_full_history() {
    let dir = tempdir().unwrap();
    let storage = Storage::open(dir.path().join("netpulse.db")).await.unwrap();
    let hosts = HostRepository::new(storage.clone());
    let metrics = MetricsRepository::new(storage.clone());

    let host_id = hosts.insert(&new_host("db-primary", "10.0.3.1")).await.unwrap();

    for (latency_us, success) in [(10_000, true), (30_000, true), (0, false), (20_000, true)] {
        metrics
            .insert_ping_result(&PingResult {
                id: 0,
                host_id,
                timestamp: Utc::now(),
                latency_us,
                success,
                ttl: Some(64),
                error_message: if success { String::new() } else { "timed out".to_string() },
            })
            .await
            .unwrap();
    }

    let stats = metrics.get_statistics(host_id, 100).await.unwrap();
    assert_eq!(stats.total_pings, 4);
    assert_eq!(stats.successful_pings, 3);
    // spec.md §8 invariant: packetLossPercent is in [0, 100] and consistent
    // with successful/total.
    assert!((0.0..=100.0).contains(&stats.packet_loss_percent));
    assert_eq!(stats.packet_loss_percent, 25.0);

    // Reopening the same file must see everything already written.
    drop(metrics);
    drop(hosts);
    let storage2 = Storage::open(dir.path().join("netpulse.db")).await.unwrap();
    let hosts2 = HostRepository::new(storage2.clone());
    let metrics2 = MetricsRepository::new(storage2);
    assert_eq!(hosts2.count().await.unwrap(), 1);
    assert_eq!(metrics2.get_ping_results(host_id, 100).await.unwrap().len(), 4);
}

#[tokio::test]
async fn port_scan_results_and_alerts_round_trip_through_a_real_database() {
    let dir = tempdir().unwrap();
    let storage = Storage::open(dir.path().join("netpulse.db")).await.unwrap();
    let hosts = HostRepository::new(storage.clone());
    let metrics = MetricsRepository::new(storage.clone());

    let host_id = hosts.insert(&new_host("web-1", "10.0.4.1")).await.unwrap();

    metrics
        .insert_port_scan_result(&PortScanResult {
            id: 0,
            target_address: "10.0.4.1".to_string(),
            port: 443,
            state: PortState::Open,
            service_name: "https".to_string(),
            scan_timestamp: Utc::now(),
        })
        .await
        .unwrap();

    let results = metrics.get_port_scan_results("10.0.4.1", 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].port, 443);

    metrics
        .insert_alert(&Alert {
            id: 0,
            host_id,
            alert_type: AlertType::HighLatency,
            severity: AlertSeverity::Warning,
            title: "web-1: HighLatency".to_string(),
            message: "web-1 latency is 250.0ms".to_string(),
            timestamp: Utc::now(),
            acknowledged: false,
        })
        .await
        .unwrap();

    let unacked = metrics.get_unacknowledged_alerts().await.unwrap();
    assert_eq!(unacked.len(), 1);
    metrics.acknowledge_all().await.unwrap();
    assert_eq!(metrics.get_unacknowledged_alerts().await.unwrap().len(), 0);
}

#[tokio::test]
async fn retention_sweep_deletes_only_rows_older_than_the_cutoff() {
    let dir = tempdir().unwrap();
    let storage = Storage::open(dir.path().join("netpulse.db")).await.unwrap();
    let hosts = HostRepository::new(storage.clone());
    let metrics = MetricsRepository::new(storage.clone());
    let scans = ScheduledScanRepository::new(storage.clone());
    let snmp = SnmpRepository::new(storage.clone());

    let host_id = hosts.insert(&new_host("archive-host", "10.0.5.1")).await.unwrap();

    let old = PingResult {
        id: 0,
        host_id,
        timestamp: Utc::now() - ChronoDuration::days(40),
        latency_us: 5_000,
        success: true,
        ttl: Some(64),
        error_message: String::new(),
    };
    let fresh = PingResult { timestamp: Utc::now(), ..old.clone() };
    metrics.insert_ping_result(&old).await.unwrap();
    metrics.insert_ping_result(&fresh).await.unwrap();

    let runtime = Runtime::new();
    let retention = Retention::new(runtime.clone(), metrics.clone(), scans, snmp);
    let report = retention.start(30, false).await.unwrap();

    assert_eq!(report.ping_results, 1, "only the 40-day-old row should be swept at a 30-day retention");
    let remaining = metrics.get_ping_results(host_id, 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].success);

    retention.stop().await;
    runtime.stop();
}
