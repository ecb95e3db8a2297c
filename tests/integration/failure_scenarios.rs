//! Failure-mode tests: every probe reports failure as data rather than
//! panicking or propagating an error (spec.md §4.4/§4.5/§4.6 Failure modes),
//! and the HTTP API maps bad client input to 4xx instead of crashing.

use std::time::Duration;

use netpulse::probes::icmp;
use netpulse::probes::snmp::poller::{self, SnmpRequestConfig};
use netpulse::probes::tcp_scan::{PortScanConfig, ScanCallbacks, TcpPortScanner};
use netpulse::storage::models::{PortRange, PortState, SnmpCredentials, SnmpVersion};

use super::helpers::spawn_api_server;

#[tokio::test]
async fn icmp_ping_against_an_unreachable_host_fails_without_panicking() {
    // Either a lack of raw-socket privilege or genuine unreachability ends
    // up on this path; both must surface as data, never a panic or a hang.
    let result = icmp::ping("192.0.2.1", Duration::from_millis(300)).await;
    assert!(!result.success);
    assert!(!result.error_message.is_empty());
    assert_eq!(result.latency_us, 0);
}

#[tokio::test]
async fn icmp_ping_rejects_an_unresolvable_hostname_gracefully() {
    let result = icmp::ping("this-host-does-not-resolve.invalid", Duration::from_millis(300)).await;
    assert!(!result.success);
    assert!(result.error_message.contains("resolve") || !result.error_message.is_empty());
}

#[tokio::test]
async fn tcp_scan_of_closed_local_ports_reports_closed_not_panic() {
    let scanner = TcpPortScanner::new();
    let config = PortScanConfig {
        target_address: "127.0.0.1".to_string(),
        port_range: PortRange::Custom,
        custom_ports: vec![1, 2],
        max_concurrency: 2,
        timeout: Duration::from_millis(300),
    };

    let results = scanner.scan(config, ScanCallbacks::default()).await.unwrap();
    assert_eq!(results.len(), 2);
    for r in &results {
        assert_ne!(r.state, PortState::Open, "nothing should be listening on these ports");
    }
}

#[tokio::test]
async fn tcp_scan_with_empty_custom_ports_is_rejected_as_validation_error() {
    let scanner = TcpPortScanner::new();
    let config = PortScanConfig {
        target_address: "127.0.0.1".to_string(),
        port_range: PortRange::Custom,
        custom_ports: vec![],
        max_concurrency: 1,
        timeout: Duration::from_millis(100),
    };

    let err = scanner.scan(config, ScanCallbacks::default()).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn snmp_get_against_a_non_responder_times_out_as_a_failed_result() {
    let credentials = SnmpCredentials::V2c { community: "public".to_string() };
    let config = SnmpRequestConfig {
        port: 161,
        timeout: Duration::from_millis(200),
        retries: 0,
    };

    let result = poller::get_async(
        "192.0.2.1",
        SnmpVersion::V2c,
        &credentials,
        &["1.3.6.1.2.1.1.1.0".to_string()],
        &config,
    )
    .await;

    assert!(!result.success);
    assert!(!result.error_message.is_empty());
}

#[tokio::test]
async fn malformed_json_body_to_create_host_is_a_400_not_a_panic() {
    let (base, _storage) = spawn_api_server("").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/hosts"))
        .header("Content-Type", "application/json")
        .body(r#"{"name": "broken", "#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn creating_a_host_with_an_empty_name_is_rejected_by_validation() {
    let (base, _storage) = spawn_api_server("").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/hosts"))
        .json(&serde_json::json!({"name": "", "address": "10.0.0.1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
