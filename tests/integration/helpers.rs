//! Shared test builders for the netpulse integration suite.

use std::sync::Arc;

use chrono::Utc;
use netpulse::storage::models::{Host, HostGroup, HostStatus};
use netpulse::storage::{HostGroupRepository, HostRepository, MetricsRepository, Storage};

/// A fresh in-memory database with every repository wired to it.
pub struct TestStorage {
    pub storage: Storage,
    pub hosts: HostRepository,
    pub groups: HostGroupRepository,
    pub metrics: MetricsRepository,
}

pub async fn test_storage() -> TestStorage {
    let storage = Storage::open_in_memory().await.expect("open in-memory storage");
    TestStorage {
        hosts: HostRepository::new(storage.clone()),
        groups: HostGroupRepository::new(storage.clone()),
        metrics: MetricsRepository::new(storage.clone()),
        storage,
    }
}

pub fn new_host(name: &str, address: &str) -> Host {
    Host {
        id: 0,
        name: name.to_string(),
        address: address.to_string(),
        ping_interval_seconds: 30,
        warning_threshold_ms: 100,
        critical_threshold_ms: 500,
        status: HostStatus::Unknown,
        enabled: true,
        group_id: None,
        created_at: Utc::now(),
        last_checked: None,
    }
}

pub fn new_group(name: &str) -> HostGroup {
    HostGroup {
        id: 0,
        name: name.to_string(),
        description: String::new(),
        parent_id: None,
        created_at: Utc::now(),
    }
}

/// Spawns a real `ApiServer` on an ephemeral port and returns its base URL
/// plus the storage backing it, for use with a real `reqwest` client
/// (mirrors the teacher's `spawn on 127.0.0.1:0` integration-test pattern).
pub async fn spawn_api_server(api_key: &str) -> (String, TestStorage) {
    let test_storage = test_storage().await;
    let state = Arc::new(netpulse::api::ApiState {
        hosts: test_storage.hosts.clone(),
        groups: test_storage.groups.clone(),
        metrics: test_storage.metrics.clone(),
    });
    let runtime = netpulse::runtime::Runtime::new();
    let server = netpulse::api::ApiServer::new(runtime, state, api_key.to_string());
    let port = server.listen(0).await.expect("bind ephemeral port");
    // Each test binds its own ephemeral port, so leaking the server for the
    // life of the test process never collides across tests.
    std::mem::forget(server);
    (format!("http://127.0.0.1:{port}"), test_storage)
}
