//! TCP Port Scanner (spec.md §4.5).
//!
//! Bounded-concurrency connect-scan: a counting semaphore gates admission,
//! each port races a `tokio::net::TcpStream::connect` against a
//! `tokio::time::timeout`, and a `CancellationToken` lets `cancel()` abort
//! in-flight work without blocking the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{NetPulseError, NetPulseResult};
use crate::storage::models::{PortRange, PortScanResult, PortState};

pub const COMMON_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 111, 119, 123, 135, 139, 143, 161, 179, 389, 443, 445, 465, 514,
    587, 636, 993, 995, 1723, 3389, 5900, 8080,
];
pub const WEB_PORTS: &[u16] = &[80, 443, 8080, 8443, 8000, 8888, 3000, 5000, 9000, 9090];
pub const DATABASE_PORTS: &[u16] = &[3306, 5432, 1433, 1521, 27017, 6379, 11211, 5984, 9200, 7474];

/// Returns the service name for a well-known port, or `""` if unknown.
pub fn service_name(port: u16) -> &'static str {
    match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "dns",
        80 => "http",
        110 => "pop3",
        111 => "rpcbind",
        119 => "nntp",
        123 => "ntp",
        135 => "msrpc",
        139 => "netbios-ssn",
        143 => "imap",
        161 => "snmp",
        179 => "bgp",
        389 => "ldap",
        443 => "https",
        445 => "microsoft-ds",
        465 => "smtps",
        514 => "syslog",
        587 => "submission",
        636 => "ldaps",
        993 => "imaps",
        995 => "pop3s",
        1433 => "mssql",
        1521 => "oracle",
        1723 => "pptp",
        3000 => "dev-http",
        3306 => "mysql",
        3389 => "rdp",
        5000 => "dev-http",
        5432 => "postgresql",
        5900 => "vnc",
        5984 => "couchdb",
        6379 => "redis",
        7474 => "neo4j",
        8000 | 8080 | 8888 | 9000 | 9090 => "http-alt",
        8443 => "https-alt",
        9200 => "elasticsearch",
        11211 => "memcached",
        27017 => "mongodb",
        _ => "",
    }
}

pub fn ports_for_range(range: PortRange, custom_ports: &[u16]) -> NetPulseResult<Vec<u16>> {
    match range {
        PortRange::Common => Ok(COMMON_PORTS.to_vec()),
        PortRange::Web => Ok(WEB_PORTS.to_vec()),
        PortRange::Database => Ok(DATABASE_PORTS.to_vec()),
        PortRange::All => Ok((1..=65535u32).map(|p| p as u16).collect()),
        PortRange::Custom => {
            if custom_ports.is_empty() {
                return Err(NetPulseError::validation(
                    "customPorts must be non-empty for a Custom port range",
                ));
            }
            Ok(custom_ports.to_vec())
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortScanConfig {
    pub target_address: String,
    pub port_range: PortRange,
    pub custom_ports: Vec<u16>,
    pub max_concurrency: usize,
    pub timeout: Duration,
}

pub struct ScanCallbacks {
    pub on_open_port: Option<Box<dyn Fn(&PortScanResult) + Send + Sync>>,
    pub on_progress: Option<Box<dyn Fn(usize, usize) + Send + Sync>>,
}

impl Default for ScanCallbacks {
    fn default() -> Self {
        Self {
            on_open_port: None,
            on_progress: None,
        }
    }
}

/// One scanner instance allows only one outstanding scan at a time (spec.md
/// §4.5 Concurrency); a second `scan` call while one is in flight is
/// rejected.
pub struct TcpPortScanner {
    scanning: Arc<AtomicBool>,
    cancel_token: Mutex<CancellationToken>,
}

impl Default for TcpPortScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpPortScanner {
    pub fn new() -> Self {
        Self {
            scanning: Arc::new(AtomicBool::new(false)),
            cancel_token: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Sets the cancellation flag; in-flight connects observe it before
    /// starting and are not force-aborted (best-effort, never blocks).
    pub async fn cancel(&self) {
        self.cancel_token.lock().await.cancel();
    }

    #[instrument(skip(self, config, callbacks), fields(target = %config.target_address))]
    pub async fn scan(
        &self,
        config: PortScanConfig,
        callbacks: ScanCallbacks,
    ) -> NetPulseResult<Vec<PortScanResult>> {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(NetPulseError::validation(
                "a scan is already in progress on this scanner instance",
            ));
        }

        let token = {
            let mut guard = self.cancel_token.lock().await;
            *guard = CancellationToken::new();
            guard.clone()
        };

        let result = self.run_scan(config, callbacks, token).await;
        self.scanning.store(false, Ordering::SeqCst);
        result
    }

    async fn run_scan(
        &self,
        config: PortScanConfig,
        callbacks: ScanCallbacks,
        token: CancellationToken,
    ) -> NetPulseResult<Vec<PortScanResult>> {
        let ports = ports_for_range(config.port_range, &config.custom_ports)?;
        let total = ports.len();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        let results: Arc<Mutex<Vec<PortScanResult>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let completed = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let on_open = Arc::new(callbacks.on_open_port);
        let on_progress = Arc::new(callbacks.on_progress);

        let mut tasks = Vec::with_capacity(total);
        for port in ports {
            let semaphore = semaphore.clone();
            let results = results.clone();
            let completed = completed.clone();
            let on_open = on_open.clone();
            let on_progress = on_progress.clone();
            let token = token.clone();
            let target = config.target_address.clone();
            let timeout = config.timeout;

            tasks.push(tokio::spawn(async move {
                if token.is_cancelled() {
                    return;
                }
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                if token.is_cancelled() {
                    return;
                }

                let state = probe_port(&target, port, timeout).await;
                let scan_result = PortScanResult {
                    id: 0,
                    target_address: target.clone(),
                    port,
                    state,
                    service_name: if state == PortState::Open {
                        service_name(port).to_string()
                    } else {
                        String::new()
                    },
                    scan_timestamp: Utc::now(),
                };

                {
                    let mut guard = results.lock().await;
                    guard.push(scan_result.clone());
                }

                if state == PortState::Open
                    && let Some(cb) = on_open.as_ref()
                {
                    cb(&scan_result);
                }

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(cb) = on_progress.as_ref() {
                    cb(done, total);
                }
            }));
        }

        for task in tasks {
            let _ = task.await;
        }

        let mut final_results = Arc::try_unwrap(results)
            .map(|m| m.into_inner())
            .unwrap_or_default();
        final_results.sort_by_key(|r| r.port);
        debug!(scanned = final_results.len(), "scan complete");
        Ok(final_results)
    }
}

/// Races a connect against `timeout`: success -> Open, refusal -> Closed,
/// timeout with connect still pending -> Filtered (spec.md §4.5 Per-port
/// procedure).
async fn probe_port(target: &str, port: u16, timeout: Duration) -> PortState {
    let addr = format!("{target}:{port}");
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            PortState::Open
        }
        Ok(Err(_)) => PortState::Closed,
        Err(_) => {
            warn!(port, "connect timed out, treating as filtered");
            PortState::Filtered
        }
    }
}

/// Builds a `port -> PortState` map for diffing (spec.md §4.8).
pub fn as_state_map(results: &[PortScanResult]) -> HashMap<u16, PortState> {
    results.iter().map(|r| (r.port, r.state)).collect()
}
