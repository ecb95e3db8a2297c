//! Notification Dispatcher (spec.md §4.10).
//!
//! Holds a set of webhook endpoints and fans out a JSON payload to each on
//! every alert. Delivery is fire-and-forget from the Alert Engine's
//! perspective (spec.md §9 Open Questions: dispatch happens after persist,
//! before the broadcast to subscribers) — `dispatch` spawns the actual HTTP
//! work and returns immediately, the way the teacher's `DiscordManager`
//! posts without blocking the caller on slow webhook endpoints.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::storage::models::{Alert, AlertSeverity, AlertType};
use crate::storage::HostRepository;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub id: i64,
    pub host_id: i64,
    pub host_name: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub acknowledged: bool,
}

impl AlertPayload {
    fn from_alert(alert: &Alert, host_name: String) -> Self {
        Self {
            id: alert.id,
            host_id: alert.host_id,
            host_name,
            alert_type: alert.alert_type,
            severity: alert.severity,
            title: alert.title.clone(),
            message: alert.message.clone(),
            timestamp: alert.timestamp,
            acknowledged: alert.acknowledged,
        }
    }
}

/// Fans alerts out to configured webhooks with bounded retry (spec.md
/// §4.10). A global `enabled` switch suppresses delivery without clearing
/// the endpoint list.
pub struct NotificationDispatcher {
    client: Client,
    hosts: HostRepository,
    endpoints: tokio::sync::Mutex<Vec<String>>,
    enabled: std::sync::atomic::AtomicBool,
}

impl NotificationDispatcher {
    pub fn new(hosts: HostRepository) -> Arc<Self> {
        Arc::new(Self {
            client: Client::new(),
            hosts,
            endpoints: tokio::sync::Mutex::new(Vec::new()),
            enabled: std::sync::atomic::AtomicBool::new(true),
        })
    }

    pub async fn set_endpoints(&self, endpoints: Vec<String>) {
        *self.endpoints.lock().await = endpoints;
    }

    pub async fn add_endpoint(&self, endpoint: String) {
        self.endpoints.lock().await.push(endpoint);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Suitable as the Alert Engine's notifier callback: spawns delivery
    /// and returns immediately.
    pub fn dispatch(self: &Arc<Self>, alert: Alert) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.deliver(alert).await;
        });
    }

    async fn deliver(&self, alert: Alert) {
        if !self.is_enabled() {
            return;
        }
        let endpoints = self.endpoints.lock().await.clone();
        if endpoints.is_empty() {
            return;
        }

        let host_name = match self.hosts.find_by_id(alert.host_id).await {
            Ok(Some(host)) => host.name,
            _ => "unknown".to_string(),
        };
        let payload = AlertPayload::from_alert(&alert, host_name);

        for endpoint in endpoints {
            self.send_with_retry(&endpoint, &payload).await;
        }
    }

    #[instrument(skip(self, payload), fields(endpoint = %endpoint))]
    async fn send_with_retry(&self, endpoint: &str, payload: &AlertPayload) {
        let mut backoff = INITIAL_BACKOFF;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.client.post(endpoint).json(payload).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(attempt, "webhook delivered");
                    return;
                }
                Ok(response) => {
                    warn!(attempt, status = %response.status(), "webhook returned non-2xx");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "webhook delivery failed");
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        error!(endpoint, "webhook delivery exhausted all retries");
    }
}
