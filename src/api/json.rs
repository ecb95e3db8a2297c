//! JSON response shapes (spec.md §4.11): camelCase keys, timestamps as
//! epoch seconds — matching the wire format the reference client already
//! speaks, distinct from the `YYYY-MM-DD HH:MM:SS` strings the storage
//! layer persists.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::models::{Alert, Host, HostGroup, PingResult, PingStatistics, PortScanResult};

fn epoch_seconds(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostJson {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub ping_interval_seconds: i64,
    pub warning_threshold_ms: i64,
    pub critical_threshold_ms: i64,
    pub status: &'static str,
    pub enabled: bool,
    pub group_id: Option<i64>,
    pub created_at: i64,
    pub last_checked: Option<i64>,
}

impl From<&Host> for HostJson {
    fn from(host: &Host) -> Self {
        Self {
            id: host.id,
            name: host.name.clone(),
            address: host.address.clone(),
            ping_interval_seconds: host.ping_interval_seconds,
            warning_threshold_ms: host.warning_threshold_ms,
            critical_threshold_ms: host.critical_threshold_ms,
            status: host.status.as_str(),
            enabled: host.enabled,
            group_id: host.group_id,
            created_at: epoch_seconds(&host.created_at),
            last_checked: host.last_checked.as_ref().map(epoch_seconds),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupJson {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub parent_id: Option<i64>,
    pub created_at: i64,
}

impl From<&HostGroup> for GroupJson {
    fn from(group: &HostGroup) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            description: group.description.clone(),
            parent_id: group.parent_id,
            created_at: epoch_seconds(&group.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertJson {
    pub id: i64,
    pub host_id: i64,
    #[serde(rename = "type")]
    pub alert_type: &'static str,
    pub severity: &'static str,
    pub title: String,
    pub message: String,
    pub timestamp: i64,
    pub acknowledged: bool,
}

impl From<&Alert> for AlertJson {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id,
            host_id: alert.host_id,
            alert_type: alert.alert_type.as_str(),
            severity: alert.severity.as_str(),
            title: alert.title.clone(),
            message: alert.message.clone(),
            timestamp: epoch_seconds(&alert.timestamp),
            acknowledged: alert.acknowledged,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResultJson {
    pub id: i64,
    pub host_id: i64,
    pub timestamp: i64,
    pub latency_ms: f64,
    pub success: bool,
    pub ttl: Option<i32>,
    pub error_message: String,
}

impl From<&PingResult> for PingResultJson {
    fn from(result: &PingResult) -> Self {
        Self {
            id: result.id,
            host_id: result.host_id,
            timestamp: epoch_seconds(&result.timestamp),
            latency_ms: result.latency_ms(),
            success: result.success,
            ttl: result.ttl,
            error_message: result.error_message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsJson {
    pub host_id: i64,
    pub total_pings: i64,
    pub successful_pings: i64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub avg_latency_ms: f64,
    pub jitter_ms: f64,
    pub packet_loss_percent: f64,
    pub success_rate: f64,
}

impl From<&PingStatistics> for StatisticsJson {
    fn from(stats: &PingStatistics) -> Self {
        Self {
            host_id: stats.host_id,
            total_pings: stats.total_pings,
            successful_pings: stats.successful_pings,
            min_latency_ms: stats.min_latency_us as f64 / 1000.0,
            max_latency_ms: stats.max_latency_us as f64 / 1000.0,
            avg_latency_ms: stats.avg_latency_us / 1000.0,
            jitter_ms: stats.jitter_us / 1000.0,
            packet_loss_percent: stats.packet_loss_percent,
            success_rate: stats.success_rate(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortScanResultJson {
    pub id: i64,
    pub target_address: String,
    pub port: u16,
    pub state: &'static str,
    pub service_name: String,
    pub timestamp: i64,
}

impl From<&PortScanResult> for PortScanResultJson {
    fn from(result: &PortScanResult) -> Self {
        Self {
            id: result.id,
            target_address: result.target_address.clone(),
            port: result.port,
            state: result.state.as_str(),
            service_name: result.service_name.clone(),
            timestamp: epoch_seconds(&result.scan_timestamp),
        }
    }
}
