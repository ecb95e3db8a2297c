//! Shared data model types (spec.md §3).
//!
//! These are the aggregate types the repositories persist and the HTTP API
//! serializes. Timestamps are stored as UTC `DateTime<Utc>` in memory and
//! persisted as `YYYY-MM-DD HH:MM:SS` strings (see `storage::engine::time`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostStatus {
    Unknown,
    Up,
    Warning,
    Down,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Unknown => "Unknown",
            HostStatus::Up => "Up",
            HostStatus::Warning => "Warning",
            HostStatus::Down => "Down",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Up" => HostStatus::Up,
            "Warning" => HostStatus::Warning,
            "Down" => HostStatus::Down,
            _ => HostStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub ping_interval_seconds: i64,
    pub warning_threshold_ms: i64,
    pub critical_threshold_ms: i64,
    pub status: HostStatus,
    pub enabled: bool,
    pub group_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Host {
    /// Validates the invariants from spec.md §3: non-empty name/address,
    /// non-negative thresholds, interval >= 1.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.address.trim().is_empty() {
            return Err("address must not be empty".to_string());
        }
        if self.warning_threshold_ms < 0 || self.critical_threshold_ms < 0 {
            return Err("thresholds must be non-negative".to_string());
        }
        if self.ping_interval_seconds < 1 {
            return Err("pingIntervalSeconds must be >= 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostGroup {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResult {
    pub id: i64,
    pub host_id: i64,
    pub timestamp: DateTime<Utc>,
    /// Round-trip latency in microseconds; 0 when `success` is false.
    pub latency_us: i64,
    pub success: bool,
    pub ttl: Option<i32>,
    pub error_message: String,
}

impl PingResult {
    pub fn latency_ms(&self) -> f64 {
        self.latency_us as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PingStatistics {
    pub host_id: i64,
    pub total_pings: i64,
    pub successful_pings: i64,
    pub min_latency_us: i64,
    pub max_latency_us: i64,
    pub avg_latency_us: f64,
    pub jitter_us: f64,
    pub packet_loss_percent: f64,
}

impl PingStatistics {
    pub fn success_rate(&self) -> f64 {
        100.0 - self.packet_loss_percent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertType {
    HostDown,
    HighLatency,
    PacketLoss,
    HostRecovered,
    ScanComplete,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::HostDown => "HostDown",
            AlertType::HighLatency => "HighLatency",
            AlertType::PacketLoss => "PacketLoss",
            AlertType::HostRecovered => "HostRecovered",
            AlertType::ScanComplete => "ScanComplete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "HostDown" => AlertType::HostDown,
            "HighLatency" => AlertType::HighLatency,
            "PacketLoss" => AlertType::PacketLoss,
            "HostRecovered" => AlertType::HostRecovered,
            "ScanComplete" => AlertType::ScanComplete,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "Info",
            AlertSeverity::Warning => "Warning",
            AlertSeverity::Critical => "Critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Info" => AlertSeverity::Info,
            "Warning" => AlertSeverity::Warning,
            "Critical" => AlertSeverity::Critical,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub host_id: i64,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Global alert thresholds (spec.md §3); per-host `warning_threshold_ms` /
/// `critical_threshold_ms` are display-only (spec.md §9 Open Questions).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub latency_warning_ms: i64,
    pub latency_critical_ms: i64,
    pub packet_loss_warning_percent: f64,
    pub packet_loss_critical_percent: f64,
    pub consecutive_failures_for_down: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            latency_warning_ms: 100,
            latency_critical_ms: 500,
            packet_loss_warning_percent: 10.0,
            packet_loss_critical_percent: 50.0,
            consecutive_failures_for_down: 3,
        }
    }
}

/// Filter applied to the alert listing (spec.md §4.3 Filter semantics).
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub severity: Option<AlertSeverity>,
    pub alert_type: Option<AlertType>,
    pub acknowledged: Option<bool>,
    pub search_text: Option<String>,
}

impl AlertFilter {
    pub fn is_empty(&self) -> bool {
        self.severity.is_none()
            && self.alert_type.is_none()
            && self.acknowledged.is_none()
            && self.search_text.is_none()
    }

    /// Conjunctive match against a single alert, used by in-memory callers
    /// and mirrored by the SQL WHERE clause built in `metrics.rs`.
    pub fn matches(&self, alert: &Alert) -> bool {
        if let Some(sev) = self.severity
            && sev != alert.severity
        {
            return false;
        }
        if let Some(ty) = self.alert_type
            && ty != alert.alert_type
        {
            return false;
        }
        if let Some(ack) = self.acknowledged
            && ack != alert.acknowledged
        {
            return false;
        }
        if let Some(text) = &self.search_text {
            let needle = text.to_lowercase();
            let haystack = format!("{} {}", alert.title, alert.message).to_lowercase();
            if !haystack.contains(&needle) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortState {
    Unknown,
    Open,
    Closed,
    Filtered,
}

impl PortState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortState::Unknown => "Unknown",
            PortState::Open => "Open",
            PortState::Closed => "Closed",
            PortState::Filtered => "Filtered",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Open" => PortState::Open,
            "Closed" => PortState::Closed,
            "Filtered" => PortState::Filtered,
            _ => PortState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortScanResult {
    pub id: i64,
    pub target_address: String,
    pub port: u16,
    pub state: PortState,
    pub service_name: String,
    pub scan_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortRange {
    Common,
    Web,
    Database,
    All,
    Custom,
}

impl PortRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortRange::Common => "Common",
            PortRange::Web => "Web",
            PortRange::Database => "Database",
            PortRange::All => "All",
            PortRange::Custom => "Custom",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Web" => PortRange::Web,
            "Database" => PortRange::Database,
            "All" => PortRange::All,
            "Custom" => PortRange::Custom,
            _ => PortRange::Common,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledScanConfig {
    pub id: i64,
    pub name: String,
    pub target_address: String,
    pub port_range: PortRange,
    /// Required non-empty iff `port_range == Custom` (spec.md §3 invariant).
    pub custom_ports: Vec<u16>,
    pub interval_minutes: i64,
    pub enabled: bool,
    pub notify_on_changes: bool,
    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl ScheduledScanConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.target_address.trim().is_empty() {
            return Err("targetAddress must not be empty".to_string());
        }
        if self.interval_minutes < 1 {
            return Err("intervalMinutes must be >= 1".to_string());
        }
        if self.port_range == PortRange::Custom && self.custom_ports.is_empty() {
            return Err("customPorts is required when portRange is Custom".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortChangeType {
    NewOpen,
    NewClosed,
    StateChanged,
}

impl PortChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortChangeType::NewOpen => "NewOpen",
            PortChangeType::NewClosed => "NewClosed",
            PortChangeType::StateChanged => "StateChanged",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortChange {
    pub port: u16,
    pub change_type: PortChangeType,
    pub previous_state: PortState,
    pub current_state: PortState,
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortScanDiff {
    pub id: i64,
    pub target_address: String,
    pub previous_scan_time: DateTime<Utc>,
    pub current_scan_time: DateTime<Utc>,
    pub changes: Vec<PortChange>,
    pub total_ports_scanned: i64,
    pub open_ports_before: i64,
    pub open_ports_after: i64,
}

impl PortScanDiff {
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnmpVersion {
    V1,
    V2c,
    V3,
}

impl SnmpVersion {
    /// Wire-format version integer (spec.md §4.6).
    pub fn wire_value(&self) -> i32 {
        match self {
            SnmpVersion::V1 => 0,
            SnmpVersion::V2c => 1,
            SnmpVersion::V3 => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SnmpVersion::V1 => "V1",
            SnmpVersion::V2c => "V2c",
            SnmpVersion::V3 => "V3",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "V1" => SnmpVersion::V1,
            "V3" => SnmpVersion::V3,
            _ => SnmpVersion::V2c,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
    NoAuthNoPriv,
    AuthNoPriv,
    AuthPriv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SnmpCredentials {
    V2c {
        community: String,
    },
    V3 {
        username: String,
        security_level: SecurityLevel,
        auth_protocol: String,
        auth_password: String,
        priv_protocol: String,
        priv_password: String,
        context_name: String,
        context_engine_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpDeviceConfig {
    pub id: i64,
    pub host_id: i64,
    pub version: SnmpVersion,
    pub credentials: SnmpCredentials,
    pub port: u16,
    pub timeout_ms: i64,
    pub retries: i32,
    pub poll_interval_seconds: i64,
    pub oids: Vec<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_polled: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnmpDataType {
    Integer,
    OctetString,
    ObjectIdentifier,
    IpAddress,
    Counter32,
    Gauge32,
    TimeTicks,
    Counter64,
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
    Unknown,
}

impl SnmpDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnmpDataType::Integer => "Integer",
            SnmpDataType::OctetString => "OctetString",
            SnmpDataType::ObjectIdentifier => "ObjectIdentifier",
            SnmpDataType::IpAddress => "IpAddress",
            SnmpDataType::Counter32 => "Counter32",
            SnmpDataType::Gauge32 => "Gauge32",
            SnmpDataType::TimeTicks => "TimeTicks",
            SnmpDataType::Counter64 => "Counter64",
            SnmpDataType::Null => "Null",
            SnmpDataType::NoSuchObject => "NoSuchObject",
            SnmpDataType::NoSuchInstance => "NoSuchInstance",
            SnmpDataType::EndOfMibView => "EndOfMibView",
            SnmpDataType::Unknown => "Unknown",
        }
    }

    /// True for the three SNMPv2 exception types that terminate a walk.
    pub fn is_walk_terminator(&self) -> bool {
        matches!(
            self,
            SnmpDataType::EndOfMibView | SnmpDataType::NoSuchObject | SnmpDataType::NoSuchInstance
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpVarBind {
    pub oid: String,
    pub data_type: SnmpDataType,
    pub value: String,
    pub int_value: Option<i64>,
    pub counter_value: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpResult {
    pub id: i64,
    pub host_id: i64,
    pub timestamp: DateTime<Utc>,
    pub version: SnmpVersion,
    pub varbinds: Vec<SnmpVarBind>,
    pub response_time_us: i64,
    pub success: bool,
    pub error_message: String,
    pub error_status: i32,
    pub error_index: i32,
}

/// Per-host statistics accumulated by an SNMP `MonitoredDevice` (spec.md
/// §4.6 Monitoring).
#[derive(Debug, Clone, Default)]
pub struct SnmpDeviceStats {
    pub total_polls: u64,
    pub successful_polls: u64,
    pub min_response_time_us: i64,
    pub max_response_time_us: i64,
    pub avg_response_time_us: f64,
    pub last_values: HashMap<String, String>,
}
