//! SNMP device-polling integration tests (spec.md §4.6): a minimal local
//! UDP "agent" replies with a real BER-encoded GetResponse, driving
//! `poller::get_async` and `SnmpPoller::start_monitoring` end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use netpulse::probes::snmp::ber;
use netpulse::probes::snmp::poller::{self, SnmpPoller, SnmpRequestConfig};
use netpulse::storage::models::{SnmpCredentials, SnmpDeviceConfig, SnmpVersion};
use tokio::net::UdpSocket;

/// Decodes a v1/v2c request message far enough to recover its request id,
/// then replies with a GetResponse carrying one OCTET STRING varbind.
async fn run_fake_agent_once(socket: &UdpSocket, reply_value: &'static str) {
    let mut buf = vec![0u8; 2048];
    let (n, peer) = socket.recv_from(&mut buf).await.expect("recv request");
    buf.truncate(n);

    let mut pos = 0;
    let (_seq_tag, message) = ber::decode_tlv(&buf, &mut pos).expect("outer SEQUENCE");
    let mut inner = 0;
    let (_version_tag, _version) = ber::decode_tlv(message, &mut inner).expect("version");
    let (_community_tag, _community) = ber::decode_tlv(message, &mut inner).expect("community");
    let (_pdu_tag, pdu) = ber::decode_tlv(message, &mut inner).expect("request pdu");

    let mut pdu_pos = 0;
    let (_id_tag, id_content) = ber::decode_tlv(pdu, &mut pdu_pos).expect("requestId");
    let request_id = ber::decode_integer(id_content).expect("decode requestId");
    let (_err_tag, _err) = ber::decode_tlv(pdu, &mut pdu_pos).expect("errorStatus");
    let (_eidx_tag, _eidx) = ber::decode_tlv(pdu, &mut pdu_pos).expect("errorIndex");
    let (_vb_tag, varbind_list) = ber::decode_tlv(pdu, &mut pdu_pos).expect("varbind list");

    let mut vb_pos = 0;
    let (_pair_tag, pair) = ber::decode_tlv(varbind_list, &mut vb_pos).expect("one varbind pair");
    let mut pair_pos = 0;
    let (_oid_tag, oid_content) = ber::decode_tlv(pair, &mut pair_pos).expect("oid");
    let oid = ber::decode_oid(oid_content).expect("decode oid");

    let reply_varbind = ber::encode_sequence(&[ber::encode_oid(&oid).unwrap(), ber::encode_octet_string(reply_value.as_bytes())]);
    let reply_varbinds = ber::encode_sequence(&[reply_varbind]);
    let reply_pdu_content: Vec<u8> = [
        ber::encode_integer(request_id),
        ber::encode_integer(0),
        ber::encode_integer(0),
        reply_varbinds,
    ]
    .concat();
    let reply_pdu = ber::encode_tlv(ber::TAG_GET_RESPONSE, &reply_pdu_content);
    let reply_message = ber::encode_sequence(&[
        ber::encode_integer(SnmpVersion::V2c.wire_value() as i64),
        ber::encode_octet_string(b"public"),
        reply_pdu,
    ]);

    socket.send_to(&reply_message, peer).await.expect("send reply");
}

#[tokio::test]
async fn get_async_round_trips_against_a_real_local_responder() {
    let agent_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let agent_port = agent_socket.local_addr().unwrap().port();

    let agent = tokio::spawn(async move {
        run_fake_agent_once(&agent_socket, "Linux test-host 6.1.0").await;
    });

    let credentials = SnmpCredentials::V2c { community: "public".to_string() };
    let config = SnmpRequestConfig { port: agent_port, timeout: Duration::from_secs(2), retries: 0 };

    let result = poller::get_async(
        "127.0.0.1",
        SnmpVersion::V2c,
        &credentials,
        &["1.3.6.1.2.1.1.1.0".to_string()],
        &config,
    )
    .await;

    agent.await.unwrap();

    assert!(result.success, "error: {}", result.error_message);
    assert_eq!(result.varbinds.len(), 1);
    assert_eq!(result.varbinds[0].value, "Linux test-host 6.1.0");
}

#[tokio::test]
async fn snmp_poller_device_monitoring_invokes_callback_and_tracks_stats() {
    let agent_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let agent_port = agent_socket.local_addr().unwrap().port();

    let agent = tokio::spawn(async move {
        loop {
            run_fake_agent_once(&agent_socket, "agent-reply").await;
        }
    });

    let poller = Arc::new(SnmpPoller::new());
    let device = SnmpDeviceConfig {
        id: 0,
        host_id: 42,
        version: SnmpVersion::V2c,
        credentials: SnmpCredentials::V2c { community: "public".to_string() },
        port: agent_port,
        timeout_ms: 1_000,
        retries: 0,
        poll_interval_seconds: 1,
        oids: vec!["1.3.6.1.2.1.1.1.0".to_string()],
        enabled: true,
        created_at: chrono::Utc::now(),
        last_polled: None,
    };

    let received = Arc::new(AtomicUsize::new(0));
    {
        let received = received.clone();
        poller
            .start_monitoring("127.0.0.1".to_string(), device, move |result| {
                if result.success {
                    received.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
    }

    tokio::time::sleep(Duration::from_millis(1300)).await;
    poller.stop_monitoring(42).await;
    agent.abort();

    assert!(received.load(Ordering::SeqCst) >= 1);
    let stats = poller.device_stats(42).await.expect("device stats recorded");
    assert!(stats.successful_polls >= 1);
}
