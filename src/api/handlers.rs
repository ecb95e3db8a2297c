//! Route handlers (spec.md §4.11 route table). Each handler reads whatever
//! repositories it needs from `ApiState` and returns a `Response` or lets
//! `?` bubble a `NetPulseError` up to `dispatch`'s status-code mapping.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{NetPulseError, NetPulseResult};
use crate::storage::models::{
    Alert, AlertFilter, AlertSeverity, AlertType, Host, HostGroup, HostStatus,
};

use super::http::{Method, Request, Response};
use super::json::{AlertJson, GroupJson, HostJson, PingResultJson, PortScanResultJson, StatisticsJson};
use super::router::Router;
use super::ApiState;

fn path_id(req: &Request) -> NetPulseResult<i64> {
    req.path_params
        .get("id")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| NetPulseError::validation("missing or invalid id path segment"))
}

fn query_i64(req: &Request, name: &str, default: i64) -> i64 {
    req.query_param(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_body(req: &Request) -> NetPulseResult<serde_json::Value> {
    if req.body.is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    Ok(serde_json::from_slice(&req.body)?)
}

pub async fn health(state: Arc<ApiState>, _req: Request) -> NetPulseResult<Response> {
    let count = state.hosts.count().await?;
    Ok(Response::json(
        200,
        &serde_json::json!({
            "status": "healthy",
            "timestamp": Utc::now().timestamp(),
            "version": env!("CARGO_PKG_VERSION"),
            "hosts": count,
        }),
    ))
}

pub async fn list_hosts(state: Arc<ApiState>, _req: Request) -> NetPulseResult<Response> {
    let hosts = state.hosts.find_all().await?;
    let hosts: Vec<HostJson> = hosts.iter().map(HostJson::from).collect();
    Ok(Response::json(200, &serde_json::json!({"count": hosts.len(), "hosts": hosts})))
}

pub async fn get_host(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let id = path_id(&req)?;
    let host = state
        .hosts
        .find_by_id(id)
        .await?
        .ok_or_else(|| NetPulseError::not_found(format!("host {id} not found")))?;
    Ok(Response::json(200, &HostJson::from(&host)))
}

pub async fn create_host(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let body = parse_body(&req)?;
    let host = Host {
        id: 0,
        name: body.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        address: body.get("address").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        ping_interval_seconds: body.get("pingIntervalSeconds").and_then(|v| v.as_i64()).unwrap_or(30),
        warning_threshold_ms: body.get("warningThresholdMs").and_then(|v| v.as_i64()).unwrap_or(100),
        critical_threshold_ms: body.get("criticalThresholdMs").and_then(|v| v.as_i64()).unwrap_or(500),
        status: HostStatus::Unknown,
        enabled: body.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true),
        group_id: body.get("groupId").and_then(|v| v.as_i64()),
        created_at: Utc::now(),
        last_checked: None,
    };
    let id = state.hosts.insert(&host).await?;
    let host = Host { id, ..host };
    Ok(Response::json(
        201,
        &serde_json::json!({"host": HostJson::from(&host), "message": "host created successfully"}),
    ))
}

/// Merges only the fields present in the request body onto the existing
/// host (spec.md §4.11 `PUT /api/hosts/:id`): a partial body never clears
/// fields it omits.
pub async fn update_host(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let id = path_id(&req)?;
    let mut host = state
        .hosts
        .find_by_id(id)
        .await?
        .ok_or_else(|| NetPulseError::not_found(format!("host {id} not found")))?;
    let body = parse_body(&req)?;

    if let Some(v) = body.get("name").and_then(|v| v.as_str()) {
        host.name = v.to_string();
    }
    if let Some(v) = body.get("address").and_then(|v| v.as_str()) {
        host.address = v.to_string();
    }
    if let Some(v) = body.get("pingIntervalSeconds").and_then(|v| v.as_i64()) {
        host.ping_interval_seconds = v;
    }
    if let Some(v) = body.get("warningThresholdMs").and_then(|v| v.as_i64()) {
        host.warning_threshold_ms = v;
    }
    if let Some(v) = body.get("criticalThresholdMs").and_then(|v| v.as_i64()) {
        host.critical_threshold_ms = v;
    }
    if let Some(v) = body.get("enabled").and_then(|v| v.as_bool()) {
        host.enabled = v;
    }
    if let Some(v) = body.get("groupId") {
        host.group_id = v.as_i64();
    }

    state.hosts.update(&host).await?;
    Ok(Response::json(
        200,
        &serde_json::json!({"host": HostJson::from(&host), "message": "host updated successfully"}),
    ))
}

pub async fn delete_host(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let id = path_id(&req)?;
    state.hosts.remove(id).await?;
    Ok(Response::json(200, &serde_json::json!({"message": "host deleted successfully"})))
}

pub async fn list_groups(state: Arc<ApiState>, _req: Request) -> NetPulseResult<Response> {
    let groups = state.groups.find_all().await?;
    let groups: Vec<GroupJson> = groups.iter().map(GroupJson::from).collect();
    Ok(Response::json(200, &serde_json::json!({"count": groups.len(), "groups": groups})))
}

/// Embeds the group's member hosts as a nested `hosts` array (spec.md
/// §4.11 `GET /api/groups/:id`).
pub async fn get_group(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let id = path_id(&req)?;
    let group = state
        .groups
        .find_by_id(id)
        .await?
        .ok_or_else(|| NetPulseError::not_found(format!("group {id} not found")))?;
    let hosts = state.hosts.find_by_group_id(Some(id)).await?;
    let hosts: Vec<HostJson> = hosts.iter().map(HostJson::from).collect();

    let mut body = serde_json::to_value(GroupJson::from(&group))?;
    body["hosts"] = serde_json::to_value(hosts)?;
    Ok(Response::json(200, &body))
}

pub async fn create_group(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let body = parse_body(&req)?;
    let group = HostGroup {
        id: 0,
        name: body.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        description: body.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        parent_id: body.get("parentId").and_then(|v| v.as_i64()),
        created_at: Utc::now(),
    };
    let id = state.groups.insert(&group).await?;
    let group = HostGroup { id, ..group };
    Ok(Response::json(
        201,
        &serde_json::json!({"group": GroupJson::from(&group), "message": "group created successfully"}),
    ))
}

pub async fn delete_group(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let id = path_id(&req)?;
    state.groups.remove(id).await?;
    Ok(Response::json(200, &serde_json::json!({"message": "group deleted successfully"})))
}

/// Builds an `AlertFilter` from `severity`/`type`/`acknowledged`/`search`
/// query params (spec.md §4.11 `GET /api/alerts`); default `limit` is 100.
pub async fn list_alerts(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let limit = query_i64(&req, "limit", 100);
    let filter = AlertFilter {
        severity: req.query_param("severity").and_then(AlertSeverity::parse),
        alert_type: req.query_param("type").and_then(AlertType::parse),
        acknowledged: req.query_param("acknowledged").map(|v| v == "true" || v == "1"),
        search_text: req.query_param("search").map(str::to_string),
    };
    let alerts: Vec<Alert> = state.metrics.get_alerts_filtered(&filter, limit).await?;
    let alerts: Vec<AlertJson> = alerts.iter().map(AlertJson::from).collect();
    Ok(Response::json(200, &serde_json::json!({"count": alerts.len(), "alerts": alerts})))
}

pub async fn acknowledge_alert(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let id = path_id(&req)?;
    state.metrics.acknowledge_alert(id).await?;
    Ok(Response::json(200, &serde_json::json!({"message": "alert acknowledged"})))
}

pub async fn acknowledge_all(state: Arc<ApiState>, _req: Request) -> NetPulseResult<Response> {
    let count = state.metrics.acknowledge_all().await?;
    Ok(Response::json(200, &serde_json::json!({"message": "all alerts acknowledged", "count": count})))
}

pub async fn host_metrics(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let id = path_id(&req)?;
    let host = state
        .hosts
        .find_by_id(id)
        .await?
        .ok_or_else(|| NetPulseError::not_found(format!("host {id} not found")))?;
    let limit = query_i64(&req, "limit", 100);
    let results = state.metrics.get_ping_results(id, limit).await?;
    let results: Vec<PingResultJson> = results.iter().map(PingResultJson::from).collect();
    Ok(Response::json(
        200,
        &serde_json::json!({
            "hostId": id,
            "hostName": host.name,
            "count": results.len(),
            "results": results,
        }),
    ))
}

pub async fn host_statistics(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let id = path_id(&req)?;
    let host = state
        .hosts
        .find_by_id(id)
        .await?
        .ok_or_else(|| NetPulseError::not_found(format!("host {id} not found")))?;
    let samples = query_i64(&req, "samples", 100);
    let stats = state.metrics.get_statistics(id, samples).await?;

    let mut body = serde_json::to_value(StatisticsJson::from(&stats))?;
    body["hostName"] = serde_json::Value::String(host.name);
    body["hostAddress"] = serde_json::Value::String(host.address);
    body["hostStatus"] = serde_json::Value::String(host.status.as_str().to_string());
    Ok(Response::json(200, &body))
}

/// `format=csv` returns `text/csv` with a download-disposition header;
/// anything else returns the JSON array (spec.md §4.11 `GET
/// /api/hosts/:id/export`).
pub async fn export_host_metrics(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let id = path_id(&req)?;
    state
        .hosts
        .find_by_id(id)
        .await?
        .ok_or_else(|| NetPulseError::not_found(format!("host {id} not found")))?;

    let format = req.query_param("format").unwrap_or("json");
    if format == "csv" {
        let csv = state.metrics.export_to_csv(id, 10_000).await?;
        Ok(Response::text(200, "text/csv", csv)
            .with_header("Content-Disposition", format!("attachment; filename=\"metrics_{id}.csv\"")))
    } else {
        let json = state.metrics.export_to_json(id, 10_000).await?;
        Ok(Response::text(200, "application/json", json))
    }
}

pub async fn port_scans(state: Arc<ApiState>, req: Request) -> NetPulseResult<Response> {
    let address = req
        .query_param("address")
        .ok_or_else(|| NetPulseError::validation("missing 'address' query parameter"))?
        .to_string();
    let limit = query_i64(&req, "limit", 1000);
    let results = state.metrics.get_port_scan_results(&address, limit).await?;
    let results: Vec<PortScanResultJson> = results.iter().map(PortScanResultJson::from).collect();
    Ok(Response::json(
        200,
        &serde_json::json!({"address": address, "count": results.len(), "results": results}),
    ))
}

/// Registers every route from spec.md §4.11 in table order.
pub fn build_router(state: Arc<ApiState>) -> Router {
    let mut router = Router::new();

    macro_rules! route {
        ($method:expr, $pattern:expr, $auth:expr, $handler:expr) => {{
            let state = state.clone();
            router.add($method, $pattern, $auth, move |req| {
                let state = state.clone();
                async move { $handler(state, req).await }
            });
        }};
    }

    route!(Method::Get, "/api/health", false, health);
    route!(Method::Get, "/api/hosts", true, list_hosts);
    route!(Method::Get, "/api/hosts/:id", true, get_host);
    route!(Method::Post, "/api/hosts", true, create_host);
    route!(Method::Put, "/api/hosts/:id", true, update_host);
    route!(Method::Delete, "/api/hosts/:id", true, delete_host);
    route!(Method::Get, "/api/groups", true, list_groups);
    route!(Method::Get, "/api/groups/:id", true, get_group);
    route!(Method::Post, "/api/groups", true, create_group);
    route!(Method::Delete, "/api/groups/:id", true, delete_group);
    route!(Method::Get, "/api/alerts", true, list_alerts);
    route!(Method::Post, "/api/alerts/:id/acknowledge", true, acknowledge_alert);
    route!(Method::Post, "/api/alerts/acknowledge-all", true, acknowledge_all);
    route!(Method::Get, "/api/hosts/:id/metrics", true, host_metrics);
    route!(Method::Get, "/api/hosts/:id/statistics", true, host_statistics);
    route!(Method::Get, "/api/hosts/:id/export", true, export_host_metrics);
    route!(Method::Get, "/api/portscans", true, port_scans);

    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{HostGroupRepository, HostRepository, MetricsRepository, Storage};

    async fn test_state() -> Arc<ApiState> {
        let storage = Storage::open_in_memory().await.unwrap();
        Arc::new(ApiState {
            hosts: HostRepository::new(storage.clone()),
            groups: HostGroupRepository::new(storage.clone()),
            metrics: MetricsRepository::new(storage),
        })
    }

    fn new_host(name: &str, address: &str) -> Host {
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

    #[tokio::test]
    async fn health_reports_host_count() {
        let state = test_state().await;
        state.hosts.insert(&new_host("edge", "10.0.0.1")).await.unwrap();

        let response = health(state, Request::empty(Method::Get, "/api/health")).await.unwrap();
        assert_eq!(response.status, 200);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["hosts"], 1);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn get_host_returns_404_for_missing_id() {
        let state = test_state().await;
        let mut req = Request::empty(Method::Get, "/api/hosts/99");
        req.path_params.insert("id".to_string(), "99".to_string());

        let err = get_host(state, req).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn update_host_merges_partial_body() {
        let state = test_state().await;
        let id = state.hosts.insert(&new_host("edge", "10.0.0.1")).await.unwrap();

        let mut req = Request::empty(Method::Put, "/api/hosts/1");
        req.path_params.insert("id".to_string(), id.to_string());
        req.body = serde_json::to_vec(&serde_json::json!({"criticalThresholdMs": 750})).unwrap();

        let response = update_host(state.clone(), req).await.unwrap();
        assert_eq!(response.status, 200);

        let host = state.hosts.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(host.critical_threshold_ms, 750);
        assert_eq!(host.name, "edge");
        assert_eq!(host.warning_threshold_ms, 100);
    }

    #[tokio::test]
    async fn port_scans_requires_address_query_param() {
        let state = test_state().await;
        let err = port_scans(state, Request::empty(Method::Get, "/api/portscans")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn export_csv_sets_content_disposition() {
        let state = test_state().await;
        let id = state.hosts.insert(&new_host("edge", "10.0.0.1")).await.unwrap();

        let mut req = Request::empty(Method::Get, "/api/hosts/1/export");
        req.path_params.insert("id".to_string(), id.to_string());
        req.query.insert("format".to_string(), "csv".to_string());

        let response = export_host_metrics(state, req).await.unwrap();
        assert!(response
            .headers
            .iter()
            .any(|(k, v)| k == "Content-Disposition" && v.contains("metrics_")));
        assert!(String::from_utf8(response.body).unwrap().starts_with("timestamp,latency_ms,success,ttl"));
    }
}
