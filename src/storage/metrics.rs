//! MetricsRepository (spec.md §4.3): ping results, alerts, and port scan
//! results share this repository because the HTTP API and Alert Engine
//! query across all three together (e.g. a host's recent activity).

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::error::{NetPulseError, NetPulseResult};

use super::engine::{Storage, time};
use super::models::{
    Alert, AlertFilter, AlertSeverity, AlertType, PingResult, PingStatistics, PortScanResult,
    PortState,
};

#[derive(Clone)]
pub struct MetricsRepository {
    storage: Storage,
}

impl MetricsRepository {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    // ---- Ping results ----------------------------------------------------

    #[instrument(skip(self, result), fields(host_id = result.host_id, success = result.success))]
    pub async fn insert_ping_result(&self, result: &PingResult) -> NetPulseResult<i64> {
        let row = sqlx::query(
            "INSERT INTO ping_results (host_id, timestamp, latency_us, success, ttl, error_message) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(result.host_id)
        .bind(time::to_sql(&result.timestamp))
        .bind(result.latency_us)
        .bind(result.success)
        .bind(result.ttl)
        .bind(&result.error_message)
        .execute(self.storage.pool())
        .await?;
        Ok(row.last_insert_rowid())
    }

    /// Latest-first, bounded by `limit`.
    pub async fn get_ping_results(
        &self,
        host_id: i64,
        limit: i64,
    ) -> NetPulseResult<Vec<PingResult>> {
        let rows = sqlx::query_as::<_, PingRow>(
            "SELECT * FROM ping_results WHERE host_id = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(host_id)
        .bind(limit)
        .fetch_all(self.storage.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Ascending, all rows at or after `since`.
    pub async fn get_ping_results_since(
        &self,
        host_id: i64,
        since: DateTime<Utc>,
    ) -> NetPulseResult<Vec<PingResult>> {
        let rows = sqlx::query_as::<_, PingRow>(
            "SELECT * FROM ping_results WHERE host_id = ? AND timestamp >= ? \
             ORDER BY timestamp ASC, id ASC",
        )
        .bind(host_id)
        .bind(time::to_sql(&since))
        .fetch_all(self.storage.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Computes `PingStatistics` over the most recent `sample_count` rows
    /// (spec.md §4.3 Statistics computation).
    pub async fn get_statistics(
        &self,
        host_id: i64,
        sample_count: i64,
    ) -> NetPulseResult<PingStatistics> {
        let samples = self.get_ping_results(host_id, sample_count).await?;

        let total = samples.len() as i64;
        let successful: Vec<&PingResult> = samples.iter().filter(|p| p.success).collect();
        let successful_count = successful.len() as i64;

        let (min, max, avg) = if successful.is_empty() {
            (0, 0, 0.0)
        } else {
            let min = successful.iter().map(|p| p.latency_us).min().unwrap();
            let max = successful.iter().map(|p| p.latency_us).max().unwrap();
            let avg = successful.iter().map(|p| p.latency_us as f64).sum::<f64>()
                / successful_count as f64;
            (min, max, avg)
        };

        let jitter = if successful_count < 2 {
            0.0
        } else {
            successful
                .iter()
                .map(|p| (p.latency_us as f64 - avg).abs())
                .sum::<f64>()
                / successful_count as f64
        };

        let packet_loss_percent = if total == 0 {
            0.0
        } else {
            100.0 * (1.0 - successful_count as f64 / total as f64)
        };

        Ok(PingStatistics {
            host_id,
            total_pings: total,
            successful_pings: successful_count,
            min_latency_us: min,
            max_latency_us: max,
            avg_latency_us: avg,
            jitter_us: jitter,
            packet_loss_percent,
        })
    }

    // ---- Alerts ------------------------------------------------------------

    #[instrument(skip(self, alert), fields(host_id = alert.host_id, alert_type = alert.alert_type.as_str()))]
    pub async fn insert_alert(&self, alert: &Alert) -> NetPulseResult<i64> {
        let row = sqlx::query(
            "INSERT INTO alerts (host_id, alert_type, severity, title, message, timestamp, acknowledged) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(alert.host_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(time::to_sql(&alert.timestamp))
        .bind(alert.acknowledged)
        .execute(self.storage.pool())
        .await?;
        Ok(row.last_insert_rowid())
    }

    pub async fn get_alerts(&self, limit: i64) -> NetPulseResult<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT * FROM alerts ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.storage.pool())
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Applies the conjunctive filter from spec.md §4.3; an empty filter
    /// behaves like `get_alerts`. Filtering is done in-process over the
    /// fetched page so `AlertFilter::matches` stays the single source of
    /// truth for both SQL and in-memory callers.
    pub async fn get_alerts_filtered(
        &self,
        filter: &AlertFilter,
        limit: i64,
    ) -> NetPulseResult<Vec<Alert>> {
        if filter.is_empty() {
            return self.get_alerts(limit).await;
        }
        let rows = sqlx::query_as::<_, AlertRow>("SELECT * FROM alerts ORDER BY timestamp DESC, id DESC")
            .fetch_all(self.storage.pool())
            .await?;
        let alerts: Vec<Alert> = rows
            .into_iter()
            .map(Alert::try_from)
            .collect::<NetPulseResult<_>>()?;
        let filtered: Vec<Alert> = alerts
            .into_iter()
            .filter(|a| filter.matches(a))
            .take(limit.max(0) as usize)
            .collect();
        Ok(filtered)
    }

    pub async fn get_unacknowledged_alerts(&self) -> NetPulseResult<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT * FROM alerts WHERE acknowledged = 0 ORDER BY timestamp DESC, id DESC",
        )
        .fetch_all(self.storage.pool())
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn acknowledge_alert(&self, id: i64) -> NetPulseResult<()> {
        sqlx::query("UPDATE alerts SET acknowledged = 1 WHERE id = ?")
            .bind(id)
            .execute(self.storage.pool())
            .await?;
        Ok(())
    }

    pub async fn acknowledge_all(&self) -> NetPulseResult<u64> {
        let result = sqlx::query("UPDATE alerts SET acknowledged = 1 WHERE acknowledged = 0")
            .execute(self.storage.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Internal-only bulk delete (spec.md §9 Open Questions): never wired to
    /// an HTTP route, kept for parity with the reference implementation.
    pub async fn clear_alerts(&self) -> NetPulseResult<u64> {
        let result = sqlx::query("DELETE FROM alerts")
            .execute(self.storage.pool())
            .await?;
        Ok(result.rows_affected())
    }

    // ---- Port scan results ---------------------------------------------

    pub async fn insert_port_scan_result(&self, result: &PortScanResult) -> NetPulseResult<i64> {
        let row = sqlx::query(
            "INSERT INTO port_scan_results (target_address, port, state, service_name, scan_timestamp) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&result.target_address)
        .bind(result.port as i64)
        .bind(result.state.as_str())
        .bind(&result.service_name)
        .bind(time::to_sql(&result.scan_timestamp))
        .execute(self.storage.pool())
        .await?;
        Ok(row.last_insert_rowid())
    }

    pub async fn get_port_scan_results(
        &self,
        address: &str,
        limit: i64,
    ) -> NetPulseResult<Vec<PortScanResult>> {
        let rows = sqlx::query_as::<_, PortScanRow>(
            "SELECT * FROM port_scan_results WHERE target_address = ? \
             ORDER BY scan_timestamp DESC, id DESC LIMIT ?",
        )
        .bind(address)
        .bind(limit)
        .fetch_all(self.storage.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    // ---- Export -----------------------------------------------------------

    pub async fn export_to_json(&self, host_id: i64, limit: i64) -> NetPulseResult<String> {
        let results = self.get_ping_results(host_id, limit).await?;
        Ok(serde_json::to_string_pretty(&results)?)
    }

    /// CSV header fixed by spec.md §6: `timestamp,latency_ms,success,ttl`.
    pub async fn export_to_csv(&self, host_id: i64, limit: i64) -> NetPulseResult<String> {
        let results = self.get_ping_results(host_id, limit).await?;
        let mut out = String::from("timestamp,latency_ms,success,ttl\n");
        for r in &results {
            out.push_str(&format!(
                "{},{:.3},{},{}\n",
                time::to_sql(&r.timestamp),
                r.latency_ms(),
                r.success,
                r.ttl.map(|t| t.to_string()).unwrap_or_default(),
            ));
        }
        Ok(out)
    }

    // ---- Retention --------------------------------------------------------

    pub async fn cleanup_ping_results_older_than(&self, max_age: chrono::Duration) -> NetPulseResult<u64> {
        let cutoff = Utc::now() - max_age;
        let result = sqlx::query("DELETE FROM ping_results WHERE timestamp < ?")
            .bind(time::to_sql(&cutoff))
            .execute(self.storage.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn cleanup_alerts_older_than(&self, max_age: chrono::Duration) -> NetPulseResult<u64> {
        let cutoff = Utc::now() - max_age;
        let result = sqlx::query("DELETE FROM alerts WHERE timestamp < ?")
            .bind(time::to_sql(&cutoff))
            .execute(self.storage.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn cleanup_port_scan_results_older_than(
        &self,
        max_age: chrono::Duration,
    ) -> NetPulseResult<u64> {
        let cutoff = Utc::now() - max_age;
        let result = sqlx::query("DELETE FROM port_scan_results WHERE scan_timestamp < ?")
            .bind(time::to_sql(&cutoff))
            .execute(self.storage.pool())
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct PingRow {
    id: i64,
    host_id: i64,
    timestamp: String,
    latency_us: i64,
    success: bool,
    ttl: Option<i32>,
    error_message: String,
}

impl From<PingRow> for PingResult {
    fn from(row: PingRow) -> Self {
        PingResult {
            id: row.id,
            host_id: row.host_id,
            timestamp: time::from_sql(&row.timestamp),
            latency_us: row.latency_us,
            success: row.success,
            ttl: row.ttl,
            error_message: row.error_message,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: i64,
    host_id: i64,
    alert_type: String,
    severity: String,
    title: String,
    message: String,
    timestamp: String,
    acknowledged: bool,
}

impl TryFrom<AlertRow> for Alert {
    type Error = NetPulseError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let alert_type = AlertType::parse(&row.alert_type).ok_or_else(|| {
            NetPulseError::Storage(format!("unrecognized alert_type {:?} in alerts row {}", row.alert_type, row.id))
        })?;
        let severity = AlertSeverity::parse(&row.severity).ok_or_else(|| {
            NetPulseError::Storage(format!("unrecognized severity {:?} in alerts row {}", row.severity, row.id))
        })?;
        Ok(Alert {
            id: row.id,
            host_id: row.host_id,
            alert_type,
            severity,
            title: row.title,
            message: row.message,
            timestamp: time::from_sql(&row.timestamp),
            acknowledged: row.acknowledged,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PortScanRow {
    id: i64,
    target_address: String,
    port: i64,
    state: String,
    service_name: String,
    scan_timestamp: String,
}

impl From<PortScanRow> for PortScanResult {
    fn from(row: PortScanRow) -> Self {
        PortScanResult {
            id: row.id,
            target_address: row.target_address,
            port: row.port as u16,
            state: PortState::parse(&row.state),
            service_name: row.service_name,
            scan_timestamp: time::from_sql(&row.scan_timestamp),
        }
    }
}
