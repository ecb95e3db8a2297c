//! Retention (spec.md §4.13).
//!
//! Deletes rows older than `retentionDays * 24h` from every time-series
//! table once at startup, then (if `autoCleanup` is set) once a day
//! thereafter. SNMP OID values cascade off `snmp_results` via the schema's
//! `ON DELETE CASCADE` (migrations.rs v4), so `Retention` never touches
//! `snmp_oid_values` directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::{info, instrument};

use crate::error::NetPulseResult;
use crate::runtime::{Cancellation, Runtime};
use crate::storage::{MetricsRepository, ScheduledScanRepository, SnmpRepository};

const DAILY: Duration = Duration::from_secs(24 * 60 * 60);

/// Tally of rows removed by one cleanup pass, for logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetentionReport {
    pub ping_results: u64,
    pub alerts: u64,
    pub port_scan_results: u64,
    pub port_scan_diffs: u64,
    pub snmp_results: u64,
}

impl RetentionReport {
    fn total(&self) -> u64 {
        self.ping_results + self.alerts + self.port_scan_results + self.port_scan_diffs + self.snmp_results
    }
}

/// Runs the startup sweep plus an optional daily timer (spec.md §4.13).
pub struct Retention {
    runtime: Runtime,
    metrics: MetricsRepository,
    scans: ScheduledScanRepository,
    snmp: SnmpRepository,
    timer: tokio::sync::Mutex<Option<Cancellation>>,
}

impl Retention {
    pub fn new(
        runtime: Runtime,
        metrics: MetricsRepository,
        scans: ScheduledScanRepository,
        snmp: SnmpRepository,
    ) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            metrics,
            scans,
            snmp,
            timer: tokio::sync::Mutex::new(None),
        })
    }

    /// Runs one cleanup pass immediately, then installs a daily timer if
    /// `auto_cleanup` is set.
    #[instrument(skip(self), fields(retention_days))]
    pub async fn start(self: &Arc<Self>, retention_days: u32, auto_cleanup: bool) -> NetPulseResult<RetentionReport> {
        let report = self.run_once(retention_days).await?;
        info!(
            total = report.total(),
            ping_results = report.ping_results,
            alerts = report.alerts,
            port_scan_results = report.port_scan_results,
            port_scan_diffs = report.port_scan_diffs,
            snmp_results = report.snmp_results,
            "retention cleanup complete"
        );

        if auto_cleanup {
            self.reschedule(retention_days);
        }

        Ok(report)
    }

    fn reschedule(self: &Arc<Self>, retention_days: u32) {
        let retention = self.clone();
        let timer = self.runtime.schedule_after(DAILY, async move {
            if let Err(e) = retention.run_once(retention_days).await {
                tracing::warn!(error = %e, "scheduled retention cleanup failed");
            }
            retention.reschedule(retention_days);
        });
        // Fire-and-forget: `start`'s own reschedule races this method being
        // re-entered from the timer body itself, so only the caller's first
        // invocation needs the handle for `stop()`.
        if let Ok(mut guard) = self.timer.try_lock() {
            *guard = Some(timer);
        } else {
            timer.cancel();
        }
    }

    async fn run_once(&self, retention_days: u32) -> NetPulseResult<RetentionReport> {
        let max_age = ChronoDuration::days(retention_days as i64);
        Ok(RetentionReport {
            ping_results: self.metrics.cleanup_ping_results_older_than(max_age).await?,
            alerts: self.metrics.cleanup_alerts_older_than(max_age).await?,
            port_scan_results: self.metrics.cleanup_port_scan_results_older_than(max_age).await?,
            port_scan_diffs: self.scans.cleanup_diffs_older_than(max_age).await?,
            snmp_results: self.snmp.cleanup_results_older_than(max_age).await?,
        })
    }

    pub async fn stop(&self) {
        if let Some(timer) = self.timer.lock().await.take() {
            timer.cancel();
        }
    }
}
