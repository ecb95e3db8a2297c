//! Alert Engine (spec.md §4.9).
//!
//! Per-host consecutive-failure counters and a `hostWasDown` flag, owned
//! exclusively by this engine (spec.md §3 Ownership). Emission order is
//! fixed by spec.md §9 Open Questions: persist, then forward to the
//! Notification Dispatcher, then broadcast to subscribers.
//!
//! Every `PingResult` is checked for `HighLatency`/`HostDown`/
//! `HostRecovered` per §4.9's state machine, then for rolling `PacketLoss`
//! against `AlertThresholds` (§3). `ScanComplete` is emitted separately by
//! `emit_scan_complete`, called from the Scheduled Scan Engine's completion
//! path rather than from `process_ping_result`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tracing::instrument;

use crate::error::NetPulseResult;
use crate::storage::models::{
    Alert, AlertSeverity, AlertThresholds, AlertType, Host, HostStatus, PingResult, PortScanResult,
    PortState,
};
use crate::storage::{HostRepository, MetricsRepository};

type NotifierFn = Arc<dyn Fn(Alert) + Send + Sync>;

/// Window size for the rolling packet-loss check (spec.md §4.3 Statistics
/// computation, §4.9). Matches the sample count the statistics formula is
/// defined over, not the consecutive-failure streak the `HostDown` check
/// uses.
const PACKET_LOSS_SAMPLE_WINDOW: i64 = 20;

#[derive(Debug, Default, Clone, Copy)]
struct HostCounters {
    consecutive_failures: u32,
    host_was_down: bool,
}

/// Applies `AlertThresholds` to each `PingResult`, maintaining per-host
/// failure-streak state (spec.md §4.9).
pub struct AlertEngine {
    hosts: HostRepository,
    metrics: MetricsRepository,
    thresholds: Mutex<AlertThresholds>,
    counters: Mutex<HashMap<i64, HostCounters>>,
    notifier: Mutex<Option<NotifierFn>>,
    events: broadcast::Sender<Alert>,
}

impl AlertEngine {
    pub fn new(hosts: HostRepository, metrics: MetricsRepository) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            hosts,
            metrics,
            thresholds: Mutex::new(AlertThresholds::default()),
            counters: Mutex::new(HashMap::new()),
            notifier: Mutex::new(None),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.events.subscribe()
    }

    pub async fn set_thresholds(&self, thresholds: AlertThresholds) {
        *self.thresholds.lock().await = thresholds;
    }

    pub async fn thresholds(&self) -> AlertThresholds {
        *self.thresholds.lock().await
    }

    /// Registers the Notification Dispatcher's delivery entry point. The
    /// engine calls this synchronously but the dispatcher itself is
    /// fire-and-forget (spec.md §4.10).
    pub async fn set_notifier<F>(&self, notifier: F)
    where
        F: Fn(Alert) + Send + Sync + 'static,
    {
        *self.notifier.lock().await = Some(Arc::new(notifier));
    }

    /// Evaluates one ping outcome against the configured thresholds
    /// (spec.md §4.9). Persists every emitted alert via `MetricsRepository`.
    #[instrument(skip(self, result), fields(host_id = result.host_id))]
    pub async fn process_ping_result(&self, result: &PingResult) -> NetPulseResult<()> {
        let host = match self.hosts.find_by_id(result.host_id).await? {
            Some(host) => host,
            None => return Ok(()),
        };
        let thresholds = self.thresholds().await;

        let mut counters_guard = self.counters.lock().await;
        let counters = counters_guard.entry(result.host_id).or_default();

        if result.success {
            let latency_ms = result.latency_ms();
            if latency_ms >= thresholds.latency_critical_ms as f64 {
                self.emit(&host, AlertType::HighLatency, AlertSeverity::Critical, &latency_message(&host, latency_ms))
                    .await?;
            } else if latency_ms >= thresholds.latency_warning_ms as f64 {
                self.emit(&host, AlertType::HighLatency, AlertSeverity::Warning, &latency_message(&host, latency_ms))
                    .await?;
            }

            if counters.host_was_down {
                counters.host_was_down = false;
                counters.consecutive_failures = 0;
                drop(counters_guard);
                self.emit(
                    &host,
                    AlertType::HostRecovered,
                    AlertSeverity::Info,
                    &format!("{} is reachable again", host.name),
                )
                .await?;
                self.hosts.update_status(host.id, HostStatus::Up).await?;
            } else {
                counters.consecutive_failures = 0;
                self.hosts.update_status(host.id, HostStatus::Up).await?;
            }
        } else {
            counters.consecutive_failures += 1;
            let reached_down = counters.consecutive_failures >= thresholds.consecutive_failures_for_down
                && !counters.host_was_down;
            if reached_down {
                counters.host_was_down = true;
            }
            drop(counters_guard);

            if reached_down {
                self.emit(
                    &host,
                    AlertType::HostDown,
                    AlertSeverity::Critical,
                    &format!("{} has not responded to {} consecutive pings", host.name, thresholds.consecutive_failures_for_down),
                )
                .await?;
                self.hosts.update_status(host.id, HostStatus::Down).await?;
            } else {
                self.hosts.update_status(host.id, HostStatus::Warning).await?;
            }
        }

        self.check_packet_loss(&host, &thresholds).await?;

        self.hosts.update_last_checked(host.id).await?;
        Ok(())
    }

    /// Evaluates rolling packet loss over `PACKET_LOSS_SAMPLE_WINDOW` recent
    /// samples against `AlertThresholds.packet_loss_{warning,critical}_percent`
    /// (spec.md §3 `AlertThresholds`, §4.3 Statistics computation).
    async fn check_packet_loss(&self, host: &Host, thresholds: &AlertThresholds) -> NetPulseResult<()> {
        let stats = self.metrics.get_statistics(host.id, PACKET_LOSS_SAMPLE_WINDOW).await?;
        let loss = stats.packet_loss_percent;
        if loss >= thresholds.packet_loss_critical_percent {
            self.emit(host, AlertType::PacketLoss, AlertSeverity::Critical, &packet_loss_message(host, loss))
                .await?;
        } else if loss >= thresholds.packet_loss_warning_percent {
            self.emit(host, AlertType::PacketLoss, AlertSeverity::Warning, &packet_loss_message(host, loss))
                .await?;
        }
        Ok(())
    }

    /// Emits a `ScanComplete` alert for the host whose address matches a
    /// scheduled scan's target, if one is registered (spec.md §3 Alert type
    /// `ScanComplete`; a scan target with no matching `Host` row has no
    /// `hostId` to attach the alert to, so it is silently skipped).
    pub async fn emit_scan_complete(
        &self,
        target_address: &str,
        results: &[PortScanResult],
    ) -> NetPulseResult<()> {
        let Some(host) = self.hosts.find_by_address(target_address).await? else {
            return Ok(());
        };
        let open = results.iter().filter(|r| r.state == PortState::Open).count();
        let message = format!("scan of {target_address} complete: {open}/{} ports open", results.len());
        self.emit(&host, AlertType::ScanComplete, AlertSeverity::Info, &message).await
    }

    async fn emit(
        &self,
        host: &Host,
        alert_type: AlertType,
        severity: AlertSeverity,
        message: &str,
    ) -> NetPulseResult<()> {
        let alert = Alert {
            id: 0,
            host_id: host.id,
            alert_type,
            severity,
            title: format!("{}: {}", host.name, alert_type.as_str()),
            message: message.to_string(),
            timestamp: Utc::now(),
            acknowledged: false,
        };

        let id = self.metrics.insert_alert(&alert).await?;
        let alert = Alert { id, ..alert };

        if let Some(notifier) = self.notifier.lock().await.clone() {
            notifier(alert.clone());
        }

        let _ = self.events.send(alert);
        Ok(())
    }
}

fn latency_message(host: &Host, latency_ms: f64) -> String {
    format!("{} latency is {latency_ms:.1}ms", host.name)
}

fn packet_loss_message(host: &Host, loss_percent: f64) -> String {
    format!("{} packet loss is {loss_percent:.1}%", host.name)
}
