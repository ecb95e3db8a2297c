//! Configuration & Secrets (spec.md §4.12).
//!
//! A typed record persisted as JSON in the user's app-data directory,
//! written atomically (temp file + rename) the way the teacher's
//! `read_config_file` loads a typed record with serde defaults for every
//! optional field. Secrets (currently just the REST API key) live in a
//! separate file and are never embedded in `Config`'s JSON representation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{NetPulseError, NetPulseResult};
use crate::storage::models::{AlertThresholds, PortRange};

fn app_data_root() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("netpulse")
}

pub fn default_config_path() -> PathBuf {
    app_data_root().join("config.json")
}

pub fn default_database_path() -> PathBuf {
    app_data_root().join("netpulse.db")
}

pub fn default_secrets_path() -> PathBuf {
    app_data_root().join("secrets.json")
}

fn default_database_path_serde() -> PathBuf {
    default_database_path()
}

fn default_retention_days() -> u32 {
    30
}

fn default_ping_interval() -> i64 {
    30
}

fn default_warning_threshold_ms() -> i64 {
    100
}

fn default_critical_threshold_ms() -> i64 {
    500
}

fn default_rest_api_port() -> u16 {
    8080
}

fn default_theme() -> String {
    "system".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortScanDefaults {
    #[serde(default = "default_port_range")]
    pub default_port_range: PortRange,
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_port_range() -> PortRange {
    PortRange::Common
}

fn default_concurrency() -> usize {
    100
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Default for PortScanDefaults {
    fn default() -> Self {
        Self {
            default_port_range: default_port_range(),
            default_concurrency: default_concurrency(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
}

/// Engine-relevant configuration (spec.md §4.12). `theme`/`window_geometry`/
/// `start_minimized`/`minimize_to_tray` are carried through unused by this
/// crate — they belong to the desktop UI, which is out of scope (spec.md §1
/// Non-goals), but the config record still round-trips them so a UI
/// consumer sharing the same file does not lose its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path_serde")]
    pub database_path: PathBuf,
    #[serde(default)]
    pub alert_thresholds: AlertThresholds,
    #[serde(default = "default_ping_interval")]
    pub default_ping_interval_seconds: i64,
    #[serde(default = "default_warning_threshold_ms")]
    pub default_warning_threshold_ms: i64,
    #[serde(default = "default_critical_threshold_ms")]
    pub default_critical_threshold_ms: i64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_true")]
    pub auto_cleanup: bool,
    #[serde(default)]
    pub port_scan_defaults: PortScanDefaults,
    #[serde(default = "default_true")]
    pub rest_api_enabled: bool,
    #[serde(default = "default_rest_api_port")]
    pub rest_api_port: u16,
    #[serde(default = "default_true")]
    pub desktop_notifications_enabled: bool,
    #[serde(default = "default_true")]
    pub webhook_enabled: bool,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub window_geometry: Option<WindowGeometry>,
    #[serde(default)]
    pub start_minimized: bool,
    #[serde(default)]
    pub minimize_to_tray: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            alert_thresholds: AlertThresholds::default(),
            default_ping_interval_seconds: default_ping_interval(),
            default_warning_threshold_ms: default_warning_threshold_ms(),
            default_critical_threshold_ms: default_critical_threshold_ms(),
            retention_days: default_retention_days(),
            auto_cleanup: true,
            port_scan_defaults: PortScanDefaults::default(),
            rest_api_enabled: true,
            rest_api_port: default_rest_api_port(),
            desktop_notifications_enabled: true,
            webhook_enabled: true,
            theme: default_theme(),
            window_geometry: None,
            start_minimized: false,
            minimize_to_tray: false,
        }
    }
}

impl Config {
    /// Loads from `path`, or returns defaults if the file does not exist.
    #[instrument]
    pub async fn load(path: &Path) -> NetPulseResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| NetPulseError::Fatal(format!(
                    "failed to parse config file {}: {e}",
                    path.display()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(NetPulseError::Fatal(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))),
        }
    }

    /// Writes atomically: serialize to a temp file beside `path`, then
    /// rename over it (spec.md §6 "written atomically").
    #[instrument(skip(self))]
    pub async fn save(&self, path: &Path) -> NetPulseResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}
