//! End-to-end pipeline tests: a synthesized `PingResult` flows through the
//! Alert Engine into persisted metrics/alerts, a dispatched webhook, and a
//! broadcast subscriber, all wired the way `bin/hub.rs` wires them.

use std::sync::Arc;

use chrono::Utc;
use netpulse::alert_engine::AlertEngine;
use netpulse::notifications::NotificationDispatcher;
use netpulse::storage::models::{AlertThresholds, HostStatus, PingResult};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::{new_host, test_storage};

#[tokio::test]
async fn consecutive_failures_persist_an_alert_dispatch_a_webhook_and_broadcast() {
    let storage = test_storage().await;
    let host_id = storage.hosts.insert(&new_host("gateway", "10.0.0.1")).await.unwrap();

    let mock_server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&mock_server).await;

    let notifier = NotificationDispatcher::new(storage.hosts.clone());
    notifier.set_enabled(true);
    notifier.add_endpoint(mock_server.uri()).await;

    let engine = Arc::new(AlertEngine::new(storage.hosts.clone(), storage.metrics.clone()));
    engine
        .set_thresholds(AlertThresholds {
            consecutive_failures_for_down: 2,
            ..AlertThresholds::default()
        })
        .await;

    let mut events = engine.subscribe();
    {
        let notifier = notifier.clone();
        engine.set_notifier(move |alert| notifier.dispatch(alert)).await;
    }

    for _ in 0..2 {
        let result = PingResult {
            id: 0,
            host_id,
            timestamp: Utc::now(),
            latency_us: 0,
            success: false,
            ttl: None,
            error_message: "request timed out".to_string(),
        };
        engine.process_ping_result(&result).await.unwrap();
    }

    let broadcast_alert = tokio::time::timeout(std::time::Duration::from_millis(500), events.recv())
        .await
        .expect("an alert must be broadcast once the failure streak crosses the threshold")
        .unwrap();
    assert_eq!(broadcast_alert.host_id, host_id);

    let host = storage.hosts.find_by_id(host_id).await.unwrap().unwrap();
    assert_eq!(host.status, HostStatus::Down);

    let stored_alerts = storage.metrics.get_alerts(10).await.unwrap();
    assert_eq!(stored_alerts.len(), 1);

    // The webhook dispatch is fire-and-forget; give it a moment to land.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn a_host_recovering_after_being_down_emits_a_recovered_alert() {
    let storage = test_storage().await;
    let host_id = storage.hosts.insert(&new_host("edge-router", "10.0.0.2")).await.unwrap();

    let engine = Arc::new(AlertEngine::new(storage.hosts.clone(), storage.metrics.clone()));
    engine
        .set_thresholds(AlertThresholds { consecutive_failures_for_down: 1, ..AlertThresholds::default() })
        .await;

    let down = PingResult {
        id: 0,
        host_id,
        timestamp: Utc::now(),
        latency_us: 0,
        success: false,
        ttl: None,
        error_message: "timed out".to_string(),
    };
    engine.process_ping_result(&down).await.unwrap();
    assert_eq!(storage.hosts.find_by_id(host_id).await.unwrap().unwrap().status, HostStatus::Down);

    let recovered = PingResult {
        id: 0,
        host_id,
        timestamp: Utc::now(),
        latency_us: 5_000,
        success: true,
        ttl: Some(64),
        error_message: String::new(),
    };
    engine.process_ping_result(&recovered).await.unwrap();

    let host = storage.hosts.find_by_id(host_id).await.unwrap().unwrap();
    assert_eq!(host.status, HostStatus::Up);

    let alerts = storage.metrics.get_alerts(10).await.unwrap();
    assert!(alerts.iter().any(|a| a.alert_type.as_str() == "HostRecovered"));
}
