//! Scheduled Port-Scan Engine (spec.md §4.8).
//!
//! Maintains `scheduleId -> ScheduledItem{config, timer, lastResults,
//! activeFlag}`, reusing one shared `TcpPortScanner` the way the probe
//! scheduler reuses one ICMP code path: a tick skips itself (but still
//! reschedules) if that scanner is already busy, runs a scan, then diffs it
//! against the previous result set for the same schedule.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::probes::tcp_scan::{self, PortScanConfig, ScanCallbacks, TcpPortScanner};
use crate::runtime::{Cancellation, Runtime};
use crate::storage::models::{
    PortChange, PortChangeType, PortScanDiff, PortScanResult, PortState, ScheduledScanConfig,
};

type ScanCompleteCallback = Arc<dyn Fn(i64, Vec<PortScanResult>) + Send + Sync>;
type DiffCallback = Arc<dyn Fn(i64, PortScanDiff) + Send + Sync>;

struct ScheduledItem {
    active: Arc<AtomicBool>,
    timer: Mutex<Cancellation>,
    last_results: Mutex<Option<Vec<PortScanResult>>>,
}

/// Drives one shared `TcpPortScanner` across every enabled
/// `ScheduledScanConfig` (spec.md §4.8).
pub struct ScanEngine {
    runtime: Runtime,
    scanner: Arc<TcpPortScanner>,
    items: Mutex<HashMap<i64, Arc<ScheduledItem>>>,
    on_scan_complete: Mutex<Option<ScanCompleteCallback>>,
    on_diff: Mutex<Option<DiffCallback>>,
}

impl ScanEngine {
    pub fn new(runtime: Runtime) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            scanner: Arc::new(TcpPortScanner::new()),
            items: Mutex::new(HashMap::new()),
            on_scan_complete: Mutex::new(None),
            on_diff: Mutex::new(None),
        })
    }

    pub async fn set_scan_complete_callback<F>(&self, callback: F)
    where
        F: Fn(i64, Vec<PortScanResult>) + Send + Sync + 'static,
    {
        *self.on_scan_complete.lock().await = Some(Arc::new(callback));
    }

    pub async fn set_diff_callback<F>(&self, callback: F)
    where
        F: Fn(i64, PortScanDiff) + Send + Sync + 'static,
    {
        *self.on_diff.lock().await = Some(Arc::new(callback));
    }

    /// Installs timers for every enabled schedule (spec.md §4.8 `start()`).
    pub async fn start(self: &Arc<Self>, schedules: Vec<ScheduledScanConfig>) {
        for schedule in schedules.into_iter().filter(|s| s.enabled) {
            self.install(schedule).await;
        }
    }

    async fn install(self: &Arc<Self>, schedule: ScheduledScanConfig) {
        let schedule_id = schedule.id;
        self.remove_existing(schedule_id).await;

        let active = Arc::new(AtomicBool::new(true));
        let interval = Duration::from_secs((schedule.interval_minutes.max(1) as u64) * 60);
        let timer = self.runtime.schedule_after(
            interval,
            Self::tick(self.clone(), schedule, active.clone()),
        );

        self.items.lock().await.insert(
            schedule_id,
            Arc::new(ScheduledItem {
                active,
                timer: Mutex::new(timer),
                last_results: Mutex::new(None),
            }),
        );
    }

    async fn remove_existing(&self, schedule_id: i64) {
        if let Some(item) = self.items.lock().await.remove(&schedule_id) {
            item.active.store(false, Ordering::SeqCst);
            item.timer.lock().await.cancel();
        }
    }

    fn tick(
        engine: Arc<ScanEngine>,
        schedule: ScheduledScanConfig,
        active: Arc<AtomicBool>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            if !active.load(Ordering::SeqCst) {
                return;
            }

            if engine.scanner.is_scanning() {
                warn!(schedule_id = schedule.id, "shared scanner busy, skipping this tick");
            } else {
                engine.run_once(&schedule).await;
            }

            if !active.load(Ordering::SeqCst) {
                return;
            }

            let interval = Duration::from_secs((schedule.interval_minutes.max(1) as u64) * 60);
            let next_timer = engine.runtime.schedule_after(
                interval,
                Self::tick(engine.clone(), schedule.clone(), active.clone()),
            );

            let current_item = engine.items.lock().await.get(&schedule.id).cloned();
            match current_item {
                Some(item) => *item.timer.lock().await = next_timer,
                None => next_timer.cancel(),
            }
        })
    }

    async fn run_once(&self, schedule: &ScheduledScanConfig) {
        let config = PortScanConfig {
            target_address: schedule.target_address.clone(),
            port_range: schedule.port_range,
            custom_ports: schedule.custom_ports.clone(),
            max_concurrency: 100,
            timeout: Duration::from_secs(2),
        };

        let results = match self.scanner.scan(config, ScanCallbacks::default()).await {
            Ok(results) => results,
            Err(e) => {
                warn!(schedule_id = schedule.id, error = %e, "scheduled scan failed");
                return;
            }
        };

        if let Some(callback) = self.on_scan_complete.lock().await.clone() {
            callback(schedule.id, results.clone());
        }

        let Some(item) = self.items.lock().await.get(&schedule.id).cloned() else {
            return;
        };
        let previous = item.last_results.lock().await.replace(results.clone());

        if let Some(previous) = previous {
            let diff = compute_diff(&schedule.target_address, &previous, &results);
            if diff.has_changes()
                && let Some(callback) = self.on_diff.lock().await.clone()
            {
                callback(schedule.id, diff);
            }
        }
    }

    pub async fn stop(&self) {
        let mut items = self.items.lock().await;
        for (_, item) in items.drain() {
            item.active.store(false, Ordering::SeqCst);
            item.timer.lock().await.cancel();
        }
    }

    pub async fn stop_one(&self, schedule_id: i64) {
        self.remove_existing(schedule_id).await;
    }

    pub async fn is_running(&self, schedule_id: i64) -> bool {
        self.items.lock().await.contains_key(&schedule_id)
    }
}

/// Set-diff between two port-state snapshots (spec.md §4.8 Diff algorithm).
pub fn compute_diff(
    target_address: &str,
    previous: &[PortScanResult],
    current: &[PortScanResult],
) -> PortScanDiff {
    let previous_map = tcp_scan::as_state_map(previous);
    let current_map = tcp_scan::as_state_map(current);
    let current_services: HashMap<u16, &str> = current
        .iter()
        .map(|r| (r.port, r.service_name.as_str()))
        .collect();
    let previous_services: HashMap<u16, &str> = previous
        .iter()
        .map(|r| (r.port, r.service_name.as_str()))
        .collect();

    let mut changes = Vec::new();

    for (&port, &curr_state) in &current_map {
        match previous_map.get(&port) {
            None => {
                if curr_state == PortState::Open {
                    changes.push(PortChange {
                        port,
                        change_type: PortChangeType::NewOpen,
                        previous_state: PortState::Unknown,
                        current_state: curr_state,
                        service_name: current_services.get(&port).copied().unwrap_or("").to_string(),
                    });
                }
            }
            Some(&prev_state) if prev_state != curr_state => {
                let change_type = if curr_state == PortState::Open && prev_state != PortState::Open
                {
                    PortChangeType::NewOpen
                } else if prev_state == PortState::Open && curr_state != PortState::Open {
                    PortChangeType::NewClosed
                } else {
                    PortChangeType::StateChanged
                };
                changes.push(PortChange {
                    port,
                    change_type,
                    previous_state: prev_state,
                    current_state: curr_state,
                    service_name: current_services.get(&port).copied().unwrap_or("").to_string(),
                });
            }
            _ => {}
        }
    }

    for (&port, &prev_state) in &previous_map {
        if !current_map.contains_key(&port) && prev_state == PortState::Open {
            changes.push(PortChange {
                port,
                change_type: PortChangeType::NewClosed,
                previous_state: prev_state,
                current_state: PortState::Unknown,
                service_name: previous_services.get(&port).copied().unwrap_or("").to_string(),
            });
        }
    }

    changes.sort_by_key(|c| c.port);

    let open_before = previous.iter().filter(|r| r.state == PortState::Open).count() as i64;
    let open_after = current.iter().filter(|r| r.state == PortState::Open).count() as i64;

    PortScanDiff {
        id: 0,
        target_address: target_address.to_string(),
        previous_scan_time: previous.first().map(|r| r.scan_timestamp).unwrap_or_else(Utc::now),
        current_scan_time: current.first().map(|r| r.scan_timestamp).unwrap_or_else(Utc::now),
        changes,
        total_ports_scanned: current.len() as i64,
        open_ports_before: open_before,
        open_ports_after: open_after,
    }
}
