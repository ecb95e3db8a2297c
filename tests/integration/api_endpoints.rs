//! End-to-end tests for the HTTP/JSON API (spec.md §4.11), driven with a
//! real `reqwest` client against an `ApiServer` bound to an ephemeral port.

use serde_json::{json, Value};

use super::helpers::{new_host, spawn_api_server};

#[tokio::test]
async fn health_endpoint_requires_no_auth_and_reports_host_count() {
    let (base, test_storage) = spawn_api_server("secret").await;
    test_storage.hosts.insert(&new_host("edge", "10.0.0.1")).await.unwrap();

    let client = reqwest::Client::new();
    let resp = client.get(format!("{base}/api/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["hosts"], 1);
}

#[tokio::test]
async fn missing_api_key_is_rejected_and_valid_key_is_accepted() {
    let (base, _storage) = spawn_api_server("secret").await;
    let client = reqwest::Client::new();

    let unauthorized = client.get(format!("{base}/api/hosts")).send().await.unwrap();
    assert_eq!(unauthorized.status(), 401);

    let authorized = client
        .get(format!("{base}/api/hosts"))
        .header("x-api-key", "secret")
        .send()
        .await
        .unwrap();
    assert_eq!(authorized.status(), 200);
}

#[tokio::test]
async fn bearer_token_and_query_param_both_satisfy_auth() {
    let (base, _storage) = spawn_api_server("secret").await;
    let client = reqwest::Client::new();

    let via_bearer = client
        .get(format!("{base}/api/hosts"))
        .header("Authorization", "Bearer secret")
        .send()
        .await
        .unwrap();
    assert_eq!(via_bearer.status(), 200);

    let via_query = client
        .get(format!("{base}/api/hosts?api_key=secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(via_query.status(), 200);
}

#[tokio::test]
async fn stale_header_key_falls_through_to_a_valid_bearer_token() {
    let (base, _storage) = spawn_api_server("secret").await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/hosts"))
        .header("x-api-key", "stale")
        .header("Authorization", "Bearer secret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn host_crud_round_trips_through_the_api() {
    let (base, _storage) = spawn_api_server("").await;
    let client = reqwest::Client::new();

    let create = client
        .post(format!("{base}/api/hosts"))
        .json(&json!({"name": "db-1", "address": "10.0.0.5", "pingIntervalSeconds": 15}))
        .send()
        .await
        .unwrap();
    assert_eq!(create.status(), 201);
    let created: Value = create.json().await.unwrap();
    let id = created["host"]["id"].as_i64().unwrap();
    assert_eq!(created["host"]["name"], "db-1");

    let get = client.get(format!("{base}/api/hosts/{id}")).send().await.unwrap();
    assert_eq!(get.status(), 200);
    let fetched: Value = get.json().await.unwrap();
    assert_eq!(fetched["address"], "10.0.0.5");

    // Partial update must not clear fields it omits (spec.md §4.11 PUT /api/hosts/:id).
    let update = client
        .put(format!("{base}/api/hosts/{id}"))
        .json(&json!({"pingIntervalSeconds": 60}))
        .send()
        .await
        .unwrap();
    assert_eq!(update.status(), 200);
    let updated: Value = update.json().await.unwrap();
    assert_eq!(updated["host"]["pingIntervalSeconds"], 60);
    assert_eq!(updated["host"]["address"], "10.0.0.5");

    let delete = client.delete(format!("{base}/api/hosts/{id}")).send().await.unwrap();
    assert_eq!(delete.status(), 200);

    let missing = client.get(format!("{base}/api/hosts/{id}")).send().await.unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn group_listing_embeds_its_member_hosts() {
    let (base, test_storage) = spawn_api_server("").await;
    let client = reqwest::Client::new();

    let group_id = test_storage
        .groups
        .insert(&super::helpers::new_group("datacenter-1"))
        .await
        .unwrap();
    let mut host = new_host("rack-1", "10.0.1.1");
    host.group_id = Some(group_id);
    test_storage.hosts.insert(&host).await.unwrap();

    let resp = client.get(format!("{base}/api/groups/{group_id}")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["hosts"].as_array().unwrap().len(), 1);
    assert_eq!(body["hosts"][0]["name"], "rack-1");
}

#[tokio::test]
async fn malformed_json_body_maps_to_400() {
    let (base, _storage) = spawn_api_server("").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/hosts"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn unknown_route_is_404_and_options_is_204_with_cors_headers() {
    let (base, _storage) = spawn_api_server("").await;
    let client = reqwest::Client::new();

    let not_found = client.get(format!("{base}/api/nope")).send().await.unwrap();
    assert_eq!(not_found.status(), 404);

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("{base}/api/hosts"))
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 204);
    assert_eq!(
        preflight.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn alerts_can_be_listed_filtered_and_acknowledged() {
    let (base, test_storage) = spawn_api_server("").await;
    let client = reqwest::Client::new();

    let host_id = test_storage.hosts.insert(&new_host("core-switch", "10.0.0.1")).await.unwrap();
    test_storage
        .metrics
        .insert_alert(&netpulse::storage::models::Alert {
            id: 0,
            host_id,
            alert_type: netpulse::storage::models::AlertType::HostDown,
            severity: netpulse::storage::models::AlertSeverity::Critical,
            title: "Host down".into(),
            message: "core-switch is unreachable".into(),
            timestamp: chrono::Utc::now(),
            acknowledged: false,
        })
        .await
        .unwrap();

    let list = client.get(format!("{base}/api/alerts?severity=Critical")).send().await.unwrap();
    assert_eq!(list.status(), 200);
    let body: Value = list.json().await.unwrap();
    assert_eq!(body["count"], 1);
    let alert_id = body["alerts"][0]["id"].as_i64().unwrap();

    let ack = client
        .post(format!("{base}/api/alerts/{alert_id}/acknowledge"))
        .send()
        .await
        .unwrap();
    assert_eq!(ack.status(), 200);

    let ack_all = client.post(format!("{base}/api/alerts/acknowledge-all")).send().await.unwrap();
    assert_eq!(ack_all.status(), 200);
}

#[tokio::test]
async fn host_statistics_and_json_export_reflect_ping_history() {
    let (base, test_storage) = spawn_api_server("").await;
    let client = reqwest::Client::new();

    let host_id = test_storage.hosts.insert(&new_host("api-1", "10.0.2.1")).await.unwrap();
    for (latency_us, success) in [(10_000, true), (20_000, true), (0, false)] {
        test_storage
            .metrics
            .insert_ping_result(&netpulse::storage::models::PingResult {
                id: 0,
                host_id,
                timestamp: chrono::Utc::now(),
                latency_us,
                success,
                ttl: Some(64),
                error_message: String::new(),
            })
            .await
            .unwrap();
    }

    let stats = client.get(format!("{base}/api/hosts/{host_id}/statistics")).send().await.unwrap();
    assert_eq!(stats.status(), 200);
    let body: Value = stats.json().await.unwrap();
    assert_eq!(body["totalPings"], 3);
    assert_eq!(body["hostName"], "api-1");

    let export = client
        .get(format!("{base}/api/hosts/{host_id}/export?format=json"))
        .send()
        .await
        .unwrap();
    assert_eq!(export.status(), 200);
    let text = export.text().await.unwrap();
    let results: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(results.as_array().unwrap().len(), 3);
}
