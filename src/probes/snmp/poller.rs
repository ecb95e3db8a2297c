//! SNMP GET/GET-NEXT/WALK and per-device monitoring (spec.md §4.6).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::error::{NetPulseError, NetPulseResult};
use crate::storage::models::{
    SecurityLevel, SnmpCredentials, SnmpDeviceConfig, SnmpDeviceStats, SnmpResult, SnmpVarBind,
    SnmpVersion,
};

use super::ber;
use super::pdu;

const WALK_ITERATION_LIMIT: usize = 1000;

static REQUEST_ID: AtomicI32 = AtomicI32::new(1);

fn next_request_id() -> i32 {
    REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct SnmpRequestConfig {
    pub port: u16,
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for SnmpRequestConfig {
    fn default() -> Self {
        Self {
            port: 161,
            timeout: Duration::from_secs(3),
            retries: 1,
        }
    }
}

fn build_message(
    version: SnmpVersion,
    credentials: &SnmpCredentials,
    pdu_tag: u8,
    request_id: i32,
    oids: &[String],
) -> NetPulseResult<Vec<u8>> {
    let pdu_bytes = pdu::build_request_pdu(pdu_tag, request_id, oids)?;
    match credentials {
        SnmpCredentials::V2c { community } => {
            Ok(pdu::build_v1v2c_message(version, community, pdu_bytes))
        }
        SnmpCredentials::V3 {
            username,
            security_level,
            context_name,
            context_engine_id,
            ..
        } => {
            let flags = match security_level {
                SecurityLevel::NoAuthNoPriv => 0,
                SecurityLevel::AuthNoPriv => pdu::MSG_FLAG_AUTH,
                SecurityLevel::AuthPriv => pdu::MSG_FLAG_AUTH | pdu::MSG_FLAG_PRIV,
            };
            Ok(pdu::build_v3_message(
                request_id,
                flags,
                username,
                context_engine_id,
                context_name,
                pdu_bytes,
            ))
        }
    }
}

/// Sends `message` and waits for a reply, retrying up to `retries` times on
/// timeout or I/O failure (spec.md §4.6 getAsync/getNextAsync).
async fn send_and_receive(
    address: &str,
    port: u16,
    message: &[u8],
    timeout: Duration,
    retries: u32,
) -> NetPulseResult<(Vec<u8>, Duration)> {
    let remote = format!("{address}:{port}");
    let mut last_err = String::from("snmp request failed");

    for attempt in 0..=retries {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| NetPulseError::Protocol(format!("udp bind failed: {e}")))?;
        if let Err(e) = socket.connect(&remote).await {
            last_err = format!("udp connect failed: {e}");
            continue;
        }

        let start = Instant::now();
        if let Err(e) = socket.send(message).await {
            last_err = format!("send failed: {e}");
            continue;
        }

        let mut buf = vec![0u8; 4096];
        match tokio::time::timeout(timeout, socket.recv(&mut buf)).await {
            Ok(Ok(n)) => {
                buf.truncate(n);
                return Ok((buf, start.elapsed()));
            }
            Ok(Err(e)) => last_err = format!("recv failed: {e}"),
            Err(_) => {
                warn!(attempt, %address, "SNMP request timed out");
                last_err = "request timed out".to_string();
            }
        }
    }

    Err(NetPulseError::Protocol(last_err))
}

fn failed_result(version: SnmpVersion, message: &str) -> SnmpResult {
    SnmpResult {
        id: 0,
        host_id: 0,
        timestamp: Utc::now(),
        version,
        varbinds: Vec::new(),
        response_time_us: 0,
        success: false,
        error_message: message.to_string(),
        error_status: -1,
        error_index: 0,
    }
}

async fn request(
    address: &str,
    version: SnmpVersion,
    credentials: &SnmpCredentials,
    oids: &[String],
    pdu_tag: u8,
    config: &SnmpRequestConfig,
) -> SnmpResult {
    let request_id = next_request_id();
    let message = match build_message(version, credentials, pdu_tag, request_id, oids) {
        Ok(m) => m,
        Err(e) => return failed_result(version, &e.to_string()),
    };

    match send_and_receive(address, config.port, &message, config.timeout, config.retries).await {
        Ok((bytes, elapsed)) => match pdu::parse_message(&bytes) {
            Ok(parsed) => SnmpResult {
                id: 0,
                host_id: 0,
                timestamp: Utc::now(),
                version: parsed.version,
                varbinds: parsed.varbinds,
                response_time_us: elapsed.as_micros() as i64,
                success: parsed.error_status == 0,
                error_message: if parsed.error_status == 0 {
                    String::new()
                } else {
                    pdu::error_status_message(parsed.error_status).to_string()
                },
                error_status: parsed.error_status,
                error_index: parsed.error_index,
            },
            Err(e) => failed_result(version, &e.to_string()),
        },
        Err(e) => failed_result(version, &e.to_string()),
    }
}

#[instrument(skip(credentials, oids, config), fields(address = %address))]
pub async fn get_async(
    address: &str,
    version: SnmpVersion,
    credentials: &SnmpCredentials,
    oids: &[String],
    config: &SnmpRequestConfig,
) -> SnmpResult {
    request(address, version, credentials, oids, ber::TAG_GET_REQUEST, config).await
}

#[instrument(skip(credentials, oids, config), fields(address = %address))]
pub async fn get_next_async(
    address: &str,
    version: SnmpVersion,
    credentials: &SnmpCredentials,
    oids: &[String],
    config: &SnmpRequestConfig,
) -> SnmpResult {
    request(
        address,
        version,
        credentials,
        oids,
        ber::TAG_GET_NEXT_REQUEST,
        config,
    )
    .await
}

/// GET-NEXT in a loop, stopping at a walk-terminator type, a non-descendant
/// OID, or 1000 iterations (spec.md §4.6 Walk algorithm).
#[instrument(skip(credentials, config), fields(address = %address, root_oid = %root_oid))]
pub async fn walk_async(
    address: &str,
    version: SnmpVersion,
    credentials: &SnmpCredentials,
    root_oid: &str,
    config: &SnmpRequestConfig,
) -> NetPulseResult<Vec<SnmpVarBind>> {
    let mut current = root_oid.to_string();
    let mut out = Vec::new();

    for _ in 0..WALK_ITERATION_LIMIT {
        let result = get_next_async(address, version, credentials, &[current.clone()], config).await;
        if !result.success {
            return Err(NetPulseError::Protocol(result.error_message));
        }
        let Some(vb) = result.varbinds.into_iter().next() else {
            break;
        };
        if vb.data_type.is_walk_terminator() || !ber::is_prefix_descendant(&vb.oid, root_oid) {
            break;
        }
        current = vb.oid.clone();
        out.push(vb);
    }

    Ok(out)
}

fn update_stats(stats: &mut SnmpDeviceStats, result: &SnmpResult) {
    stats.total_polls += 1;
    if !result.success {
        return;
    }
    stats.successful_polls += 1;
    let rt = result.response_time_us;
    if stats.successful_polls == 1 {
        stats.min_response_time_us = rt;
        stats.max_response_time_us = rt;
        stats.avg_response_time_us = rt as f64;
    } else {
        stats.min_response_time_us = stats.min_response_time_us.min(rt);
        stats.max_response_time_us = stats.max_response_time_us.max(rt);
        let n = stats.successful_polls as f64;
        stats.avg_response_time_us += (rt as f64 - stats.avg_response_time_us) / n;
    }
    for vb in &result.varbinds {
        stats.last_values.insert(vb.oid.clone(), vb.value.clone());
    }
}

/// Per-device poll timers plus accumulated `SnmpDeviceStats` (spec.md §4.6
/// Monitoring). One `SnmpPoller` serves every monitored device.
pub struct SnmpPoller {
    monitors: Mutex<HashMap<i64, CancellationToken>>,
    stats: Mutex<HashMap<i64, SnmpDeviceStats>>,
}

impl Default for SnmpPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl SnmpPoller {
    pub fn new() -> Self {
        Self {
            monitors: Mutex::new(HashMap::new()),
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub async fn device_stats(&self, host_id: i64) -> Option<SnmpDeviceStats> {
        self.stats.lock().await.get(&host_id).cloned()
    }

    /// Replaces any existing timer for `device.host_id`, cancelling the
    /// previous one before installing the new one (spec.md §4.6 Monitoring).
    pub async fn start_monitoring<F>(self: &Arc<Self>, address: String, device: SnmpDeviceConfig, callback: F)
    where
        F: Fn(SnmpResult) + Send + Sync + 'static,
    {
        let token = CancellationToken::new();
        {
            let mut monitors = self.monitors.lock().await;
            if let Some(previous) = monitors.insert(device.host_id, token.clone()) {
                previous.cancel();
            }
        }
        self.stats.lock().await.entry(device.host_id).or_default();

        let poller = self.clone();
        let callback = Arc::new(callback);
        tokio::spawn(async move {
            let interval = Duration::from_secs(device.poll_interval_seconds.max(1) as u64);
            let request_config = SnmpRequestConfig {
                port: device.port,
                timeout: Duration::from_millis(device.timeout_ms.max(0) as u64),
                retries: device.retries.max(0) as u32,
            };

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if token.is_cancelled() {
                    break;
                }

                let mut result = get_async(
                    &address,
                    device.version,
                    &device.credentials,
                    &device.oids,
                    &request_config,
                )
                .await;
                result.host_id = device.host_id;

                {
                    let mut stats = poller.stats.lock().await;
                    let entry = stats.entry(device.host_id).or_default();
                    update_stats(entry, &result);
                }

                callback(result);
            }
        });
    }

    pub async fn stop_monitoring(&self, host_id: i64) {
        if let Some(token) = self.monitors.lock().await.remove(&host_id) {
            token.cancel();
        }
    }

    pub async fn stop_all_monitoring(&self) {
        let mut monitors = self.monitors.lock().await;
        for (_, token) in monitors.drain() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::SnmpDataType;

    fn v2c() -> SnmpCredentials {
        SnmpCredentials::V2c {
            community: "public".to_string(),
        }
    }

    /// Spins up a fake SNMP agent on a loopback UDP socket that always
    /// replies with a single `TimeTicks` varbind, exercising `get_async`
    /// end to end without a real device.
    async fn spawn_fake_agent() -> u16 {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let Ok((n, from)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let Ok(parsed) = {
                    let mut pos = 0;
                    let msg = &buf[..n];
                    ber::decode_tlv(msg, &mut pos).map(|(_, outer)| outer.to_vec())
                } else {
                    continue;
                };
                let mut outer_pos = 0;
                let (_, version_content) = ber::decode_tlv(&parsed, &mut outer_pos).unwrap();
                let version_value = ber::decode_integer(version_content).unwrap();
                let version = if version_value == 0 {
                    SnmpVersion::V1
                } else {
                    SnmpVersion::V2c
                };
                let (_, _community) = ber::decode_tlv(&parsed, &mut outer_pos).unwrap();
                let (_, req_pdu) = ber::decode_tlv(&parsed, &mut outer_pos).unwrap();
                let mut req_pos = 0;
                let (_, request_id_content) = ber::decode_tlv(req_pdu, &mut req_pos).unwrap();
                let request_id = ber::decode_integer(request_id_content).unwrap();

                let varbind_list = ber::encode_sequence(&[ber::encode_sequence(&[
                    ber::encode_oid("1.3.6.1.2.1.1.3.0").unwrap(),
                    ber::encode_unsigned_application(ber::TAG_TIME_TICKS, 42),
                ])]);
                let pdu_content: Vec<u8> = [
                    ber::encode_integer(request_id),
                    ber::encode_integer(0),
                    ber::encode_integer(0),
                    varbind_list,
                ]
                .concat();
                let pdu = ber::encode_tlv(ber::TAG_GET_RESPONSE, &pdu_content);
                let reply = pdu::build_v1v2c_message(version, "public", pdu);
                let _ = socket.send_to(&reply, from).await;
            }
        });
        port
    }

    #[tokio::test]
    async fn get_async_round_trips_against_fake_agent() {
        let port = spawn_fake_agent().await;
        let config = SnmpRequestConfig {
            port,
            timeout: Duration::from_millis(500),
            retries: 1,
        };
        let result = get_async(
            "127.0.0.1",
            SnmpVersion::V2c,
            &v2c(),
            &["1.3.6.1.2.1.1.3.0".to_string()],
            &config,
        )
        .await;

        assert!(result.success, "error: {}", result.error_message);
        assert_eq!(result.varbinds.len(), 1);
        assert_eq!(result.varbinds[0].data_type, SnmpDataType::TimeTicks);
        assert_eq!(result.varbinds[0].counter_value, Some(42));
    }

    #[tokio::test]
    async fn get_against_unreachable_host_fails_without_panicking() {
        let config = SnmpRequestConfig {
            port: 1, // nothing listens here
            timeout: Duration::from_millis(50),
            retries: 0,
        };
        let result = get_async(
            "127.0.0.1",
            SnmpVersion::V2c,
            &v2c(),
            &["1.3.6.1.2.1.1.3.0".to_string()],
            &config,
        )
        .await;
        assert!(!result.success);
    }

    #[test]
    fn stats_track_min_max_avg_and_last_values() {
        let mut stats = SnmpDeviceStats::default();
        let mk = |us: i64, oid: &str, val: &str| SnmpResult {
            id: 0,
            host_id: 1,
            timestamp: Utc::now(),
            version: SnmpVersion::V2c,
            varbinds: vec![SnmpVarBind {
                oid: oid.to_string(),
                data_type: SnmpDataType::TimeTicks,
                value: val.to_string(),
                int_value: None,
                counter_value: Some(val.parse().unwrap_or(0)),
            }],
            response_time_us: us,
            success: true,
            error_message: String::new(),
            error_status: 0,
            error_index: 0,
        };

        update_stats(&mut stats, &mk(100, "1.3.6.1.2.1.1.3.0", "10"));
        update_stats(&mut stats, &mk(300, "1.3.6.1.2.1.1.3.0", "20"));

        assert_eq!(stats.total_polls, 2);
        assert_eq!(stats.successful_polls, 2);
        assert_eq!(stats.min_response_time_us, 100);
        assert_eq!(stats.max_response_time_us, 300);
        assert_eq!(stats.avg_response_time_us, 200.0);
        assert_eq!(stats.last_values.get("1.3.6.1.2.1.1.3.0"), Some(&"20".to_string()));
    }

    #[tokio::test]
    async fn start_monitoring_replaces_previous_timer() {
        let poller = Arc::new(SnmpPoller::new());
        let device = SnmpDeviceConfig {
            id: 1,
            host_id: 1,
            version: SnmpVersion::V2c,
            credentials: v2c(),
            port: 1,
            timeout_ms: 50,
            retries: 0,
            poll_interval_seconds: 3600,
            oids: vec!["1.3.6.1.2.1.1.3.0".to_string()],
            enabled: true,
            created_at: Utc::now(),
            last_polled: None,
        };

        poller
            .start_monitoring("127.0.0.1".to_string(), device.clone(), |_| {})
            .await;
        let first_token = poller.monitors.lock().await.get(&1).unwrap().clone();

        poller
            .start_monitoring("127.0.0.1".to_string(), device, |_| {})
            .await;
        assert!(first_token.is_cancelled());

        poller.stop_all_monitoring().await;
    }
}
