//! ScheduledScanRepository (spec.md §3, §4.8): CRUD over `ScheduledScanConfig`
//! plus persistence of the `PortScanDiff`s the Scheduled Scan Engine
//! computes.

use tracing::instrument;

use crate::error::{NetPulseError, NetPulseResult};

use super::engine::{Storage, time};
use super::models::{PortChange, PortRange, PortScanDiff, ScheduledScanConfig};

#[derive(Clone)]
pub struct ScheduledScanRepository {
    storage: Storage,
}

impl ScheduledScanRepository {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    #[instrument(skip(self, config), fields(name = %config.name))]
    pub async fn insert(&self, config: &ScheduledScanConfig) -> NetPulseResult<i64> {
        config.validate().map_err(NetPulseError::validation)?;
        let result = sqlx::query(
            "INSERT INTO scheduled_scans \
             (name, target_address, port_range, custom_ports, interval_minutes, enabled, \
              notify_on_changes, created_at, last_run_at, next_run_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&config.name)
        .bind(&config.target_address)
        .bind(config.port_range.as_str())
        .bind(encode_ports(&config.custom_ports))
        .bind(config.interval_minutes)
        .bind(config.enabled)
        .bind(config.notify_on_changes)
        .bind(time::to_sql(&config.created_at))
        .bind(config.last_run_at.map(|t| time::to_sql(&t)))
        .bind(config.next_run_at.map(|t| time::to_sql(&t)))
        .execute(self.storage.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update(&self, config: &ScheduledScanConfig) -> NetPulseResult<()> {
        config.validate().map_err(NetPulseError::validation)?;
        sqlx::query(
            "UPDATE scheduled_scans SET name = ?, target_address = ?, port_range = ?, \
             custom_ports = ?, interval_minutes = ?, enabled = ?, notify_on_changes = ?, \
             last_run_at = ?, next_run_at = ? WHERE id = ?",
        )
        .bind(&config.name)
        .bind(&config.target_address)
        .bind(config.port_range.as_str())
        .bind(encode_ports(&config.custom_ports))
        .bind(config.interval_minutes)
        .bind(config.enabled)
        .bind(config.notify_on_changes)
        .bind(config.last_run_at.map(|t| time::to_sql(&t)))
        .bind(config.next_run_at.map(|t| time::to_sql(&t)))
        .bind(config.id)
        .execute(self.storage.pool())
        .await?;
        Ok(())
    }

    pub async fn remove(&self, id: i64) -> NetPulseResult<()> {
        sqlx::query("DELETE FROM scheduled_scans WHERE id = ?")
            .bind(id)
            .execute(self.storage.pool())
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> NetPulseResult<Option<ScheduledScanConfig>> {
        let row = sqlx::query_as::<_, ScanConfigRow>("SELECT * FROM scheduled_scans WHERE id = ?")
            .bind(id)
            .fetch_optional(self.storage.pool())
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn find_all(&self) -> NetPulseResult<Vec<ScheduledScanConfig>> {
        let rows = sqlx::query_as::<_, ScanConfigRow>(
            "SELECT * FROM scheduled_scans ORDER BY name ASC",
        )
        .fetch_all(self.storage.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn find_enabled(&self) -> NetPulseResult<Vec<ScheduledScanConfig>> {
        let rows = sqlx::query_as::<_, ScanConfigRow>(
            "SELECT * FROM scheduled_scans WHERE enabled = 1 ORDER BY name ASC",
        )
        .fetch_all(self.storage.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn insert_diff(&self, schedule_id: i64, diff: &PortScanDiff) -> NetPulseResult<i64> {
        let changes_json = serde_json::to_string(&diff.changes)?;
        let result = sqlx::query(
            "INSERT INTO port_scan_diffs \
             (schedule_id, target_address, previous_scan_time, current_scan_time, changes_json, \
              total_ports_scanned, open_ports_before, open_ports_after) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(schedule_id)
        .bind(&diff.target_address)
        .bind(time::to_sql(&diff.previous_scan_time))
        .bind(time::to_sql(&diff.current_scan_time))
        .bind(changes_json)
        .bind(diff.total_ports_scanned)
        .bind(diff.open_ports_before)
        .bind(diff.open_ports_after)
        .execute(self.storage.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_diffs(
        &self,
        target_address: &str,
        limit: i64,
    ) -> NetPulseResult<Vec<PortScanDiff>> {
        let rows = sqlx::query_as::<_, DiffRow>(
            "SELECT * FROM port_scan_diffs WHERE target_address = ? \
             ORDER BY current_scan_time DESC, id DESC LIMIT ?",
        )
        .bind(target_address)
        .bind(limit)
        .fetch_all(self.storage.pool())
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn cleanup_diffs_older_than(
        &self,
        max_age: chrono::Duration,
    ) -> NetPulseResult<u64> {
        let cutoff = chrono::Utc::now() - max_age;
        let result = sqlx::query("DELETE FROM port_scan_diffs WHERE current_scan_time < ?")
            .bind(time::to_sql(&cutoff))
            .execute(self.storage.pool())
            .await?;
        Ok(result.rows_affected())
    }
}

fn encode_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_ports(s: &str) -> Vec<u16> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(',').filter_map(|p| p.parse().ok()).collect()
}

#[derive(sqlx::FromRow)]
struct ScanConfigRow {
    id: i64,
    name: String,
    target_address: String,
    port_range: String,
    custom_ports: String,
    interval_minutes: i64,
    enabled: bool,
    notify_on_changes: bool,
    created_at: String,
    last_run_at: Option<String>,
    next_run_at: Option<String>,
}

impl From<ScanConfigRow> for ScheduledScanConfig {
    fn from(row: ScanConfigRow) -> Self {
        ScheduledScanConfig {
            id: row.id,
            name: row.name,
            target_address: row.target_address,
            port_range: PortRange::parse(&row.port_range),
            custom_ports: decode_ports(&row.custom_ports),
            interval_minutes: row.interval_minutes,
            enabled: row.enabled,
            notify_on_changes: row.notify_on_changes,
            created_at: time::from_sql(&row.created_at),
            last_run_at: row.last_run_at.map(|s| time::from_sql(&s)),
            next_run_at: row.next_run_at.map(|s| time::from_sql(&s)),
        }
    }
}

#[derive(sqlx::FromRow)]
struct DiffRow {
    id: i64,
    target_address: String,
    previous_scan_time: String,
    current_scan_time: String,
    changes_json: String,
    total_ports_scanned: i64,
    open_ports_before: i64,
    open_ports_after: i64,
}

impl TryFrom<DiffRow> for PortScanDiff {
    type Error = NetPulseError;

    fn try_from(row: DiffRow) -> Result<Self, Self::Error> {
        let changes: Vec<PortChange> = serde_json::from_str(&row.changes_json)?;
        Ok(PortScanDiff {
            id: row.id,
            target_address: row.target_address,
            previous_scan_time: time::from_sql(&row.previous_scan_time),
            current_scan_time: time::from_sql(&row.current_scan_time),
            changes,
            total_ports_scanned: row.total_ports_scanned,
            open_ports_before: row.open_ports_before,
            open_ports_after: row.open_ports_after,
        })
    }
}
