//! ICMP Probe (spec.md §4.4).
//!
//! Sends an ICMPv4 echo request on a raw socket and waits for the matching
//! echo reply. Raw sockets require elevated capabilities on UNIX-like
//! systems; socket creation failure is recovered locally and surfaces as a
//! failed `PingResult`, never as a propagated error (spec.md §9 "Raw ICMP
//! privilege").
//!
//! The actual `sendto`/`recvfrom` pair is blocking, so it runs on a
//! `spawn_blocking` worker the way `socket2`-based probes in the retrieval
//! pack park a Tokio worker rather than require an async raw-socket crate.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use rand::Rng;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::{debug, instrument, warn};

use crate::storage::models::PingResult;

const PACKET_SIZE: usize = 64;
const ICMP_HEADER_SIZE: usize = 8;
const ICMP_ECHO_REQUEST: u8 = 8;
const ICMP_ECHO_REPLY: u8 = 0;

static SEQUENCE: AtomicU16 = AtomicU16::new(0);
static IDENTIFIER: OnceLock<u16> = OnceLock::new();

fn process_identifier() -> u16 {
    *IDENTIFIER.get_or_init(|| rand::thread_rng().gen::<u16>())
}

fn next_sequence() -> u16 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// RFC 1071 one's-complement 16-bit checksum over `data` with the checksum
/// field (bytes 2-3) assumed already zeroed by the caller.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

fn build_echo_request(id: u16, seq: u16) -> Vec<u8> {
    let mut packet = vec![0u8; PACKET_SIZE];
    packet[0] = ICMP_ECHO_REQUEST;
    packet[1] = 0; // code
    // packet[2..4] checksum placeholder, left zero for now
    packet[4..6].copy_from_slice(&id.to_be_bytes());
    packet[6..8].copy_from_slice(&seq.to_be_bytes());

    let now_nanos = Instant::now().elapsed().as_nanos() as u64;
    let payload_len = PACKET_SIZE - ICMP_HEADER_SIZE;
    let stamp = now_nanos.to_be_bytes();
    let copy_len = stamp.len().min(payload_len);
    packet[ICMP_HEADER_SIZE..ICMP_HEADER_SIZE + copy_len].copy_from_slice(&stamp[..copy_len]);

    let sum = checksum(&packet);
    packet[2..4].copy_from_slice(&sum.to_be_bytes());
    packet
}

struct ParsedReply {
    icmp_type: u8,
    id: u16,
    seq: u16,
    ttl: u8,
}

/// Parses a 20+ byte IPv4 header (header length from the low nibble of byte
/// 0, TTL at byte 8) followed by the ICMP header (spec.md §4.4 Reply
/// matching).
fn parse_reply(buf: &[u8]) -> Option<ParsedReply> {
    if buf.len() < 20 {
        return None;
    }
    let ihl = (buf[0] & 0x0F) as usize * 4;
    let ttl = buf[8];
    if buf.len() < ihl + ICMP_HEADER_SIZE {
        return None;
    }
    let icmp = &buf[ihl..];
    let icmp_type = icmp[0];
    let id = u16::from_be_bytes([icmp[4], icmp[5]]);
    let seq = u16::from_be_bytes([icmp[6], icmp[7]]);
    Some(ParsedReply {
        icmp_type,
        id,
        seq,
        ttl,
    })
}

/// Resolves `address` to an IPv4 socket address; tries a literal parse
/// first, falls back to DNS resolution once per call (spec.md §4.4).
async fn resolve_ipv4(address: &str) -> Option<Ipv4Addr> {
    if let Ok(addr) = address.parse::<Ipv4Addr>() {
        return Some(addr);
    }
    let lookup = format!("{address}:0");
    match tokio::net::lookup_host(lookup).await {
        Ok(mut addrs) => addrs.find_map(|a| match a.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        }),
        Err(_) => None,
    }
}

fn failed(host_address: &str, message: impl Into<String>) -> PingResult {
    PingResult {
        id: 0,
        host_id: 0,
        timestamp: chrono::Utc::now(),
        latency_us: 0,
        success: false,
        ttl: None,
        error_message: format!("{host_address}: {}", message.into()),
    }
}

/// Sends one ICMP echo request to `address` and waits up to `timeout` for
/// the matching reply. All failure modes (privilege, send, timeout,
/// malformed reply) are returned as `PingResult{success: false}` rather than
/// propagated (spec.md §4.4 Failure modes).
#[instrument(skip(address), fields(address = %address))]
pub async fn ping(address: &str, timeout: Duration) -> PingResult {
    let Some(target) = resolve_ipv4(address).await else {
        return failed(address, "could not resolve address");
    };

    let id = process_identifier();
    let seq = next_sequence();
    let address_owned = address.to_string();

    let join = tokio::task::spawn_blocking(move || ping_blocking(target, id, seq, timeout));

    match join.await {
        Ok(Ok((latency, ttl))) => PingResult {
            id: 0,
            host_id: 0,
            timestamp: chrono::Utc::now(),
            latency_us: latency.as_micros() as i64,
            success: true,
            ttl: Some(ttl as i32),
            error_message: String::new(),
        },
        Ok(Err(message)) => failed(&address_owned, message),
        Err(join_err) => failed(&address_owned, format!("probe task panicked: {join_err}")),
    }
}

fn ping_blocking(
    target: Ipv4Addr,
    id: u16,
    seq: u16,
    timeout: Duration,
) -> Result<(Duration, u8), String> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
        .map_err(|e| format!("raw socket creation failed (requires elevated privileges): {e}"))?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| format!("failed to set socket timeout: {e}"))?;

    let packet = build_echo_request(id, seq);
    let dest = SockAddr::from(SocketAddr::V4(SocketAddrV4::new(target, 0)));

    let send_start = Instant::now();
    socket
        .send_to(&packet, &dest)
        .map_err(|e| format!("send failed: {e}"))?;

    let mut buf = [std::mem::MaybeUninit::new(0u8); 1024];
    loop {
        let (n, _from) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                return Err("receive timed out".to_string());
            }
            Err(e) => return Err(format!("receive failed: {e}")),
        };
        let received: Vec<u8> = buf[..n]
            .iter()
            .map(|b| unsafe { b.assume_init() })
            .collect();

        let Some(reply) = parse_reply(&received) else {
            debug!("discarding malformed ICMP reply");
            continue;
        };
        if reply.icmp_type != ICMP_ECHO_REPLY || reply.id != id || reply.seq != seq {
            continue;
        }
        let rtt = send_start.elapsed();
        return Ok((rtt, reply.ttl));
    }
}

/// Issues repeated pings until `recv_timeout` is reached once; used by
/// callers that want a single synchronous 5s-bounded probe (spec.md §4.7
/// Probe Scheduler step 2).
pub async fn ping_with_default_timeout(address: &str) -> PingResult {
    ping(address, Duration::from_secs(5)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario S1 from spec.md §8.
    #[test]
    fn checksum_matches_scenario_s1() {
        let mut packet = vec![0u8; PACKET_SIZE];
        packet[0] = 8; // type
        packet[1] = 0; // code
        packet[4..6].copy_from_slice(&0x1234u16.to_be_bytes());
        packet[6..8].copy_from_slice(&0x0001u16.to_be_bytes());

        let sum = checksum(&packet);
        packet[2..4].copy_from_slice(&sum.to_be_bytes());

        // Recomputing the checksum over the emitted bytes (with the
        // checksum field populated) must fold to 0xFFFF (RFC 1071).
        assert_eq!(checksum(&packet), 0xFFFF);
    }

    #[test]
    fn build_echo_request_has_fixed_length_and_header() {
        let packet = build_echo_request(0x1234, 7);
        assert_eq!(packet.len(), PACKET_SIZE);
        assert_eq!(packet[0], ICMP_ECHO_REQUEST);
        assert_eq!(packet[1], 0);
        assert_eq!(u16::from_be_bytes([packet[4], packet[5]]), 0x1234);
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 7);
    }

    #[test]
    fn parse_reply_reads_ttl_and_icmp_fields() {
        let mut buf = vec![0u8; 20 + ICMP_HEADER_SIZE];
        buf[0] = 0x45; // IHL = 5 words = 20 bytes
        buf[8] = 64; // TTL
        buf[20] = ICMP_ECHO_REPLY;
        buf[24..26].copy_from_slice(&0xBEEFu16.to_be_bytes());
        buf[26..28].copy_from_slice(&42u16.to_be_bytes());

        let parsed = parse_reply(&buf).unwrap();
        assert_eq!(parsed.ttl, 64);
        assert_eq!(parsed.icmp_type, ICMP_ECHO_REPLY);
        assert_eq!(parsed.id, 0xBEEF);
        assert_eq!(parsed.seq, 42);
    }

    #[tokio::test]
    async fn resolve_ipv4_accepts_literal() {
        let addr = resolve_ipv4("127.0.0.1").await.unwrap();
        assert_eq!(addr, Ipv4Addr::LOCALHOST);
    }

    #[tokio::test]
    async fn ping_without_privilege_fails_gracefully() {
        // In sandboxed/unprivileged CI this exercises the "cannot open raw
        // socket" path; the important property is that it never panics.
        let result = ping("127.0.0.1", Duration::from_millis(50)).await;
        if !result.success {
            assert!(!result.error_message.is_empty());
        }
    }
}
