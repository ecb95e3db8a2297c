//! SNMP message framing (spec.md §4.6 v1/v2c message, v3 message, Parsing).

use crate::error::{NetPulseError, NetPulseResult};
use crate::storage::models::{SnmpDataType, SnmpVarBind, SnmpVersion};

use super::ber;

pub const MSG_FLAG_AUTH: u8 = 0x01;
pub const MSG_FLAG_PRIV: u8 = 0x02;
pub const MSG_FLAG_REPORTABLE: u8 = 0x04;

/// Builds a `SEQUENCE OF { oid, Null }` varbind list for a GET/GET-NEXT
/// request (spec.md §4.6 v1/v2c message).
fn build_request_varbinds(oids: &[String]) -> NetPulseResult<Vec<u8>> {
    let mut items = Vec::with_capacity(oids.len());
    for oid in oids {
        let pair = ber::encode_sequence(&[ber::encode_oid(oid)?, ber::encode_null()]);
        items.push(pair);
    }
    Ok(ber::encode_sequence(&items))
}

/// Builds a GetRequest/GetNextRequest PDU body: `{requestId, errorStatus=0,
/// errorIndex=0, varbindList}` wrapped in `pdu_tag`.
pub fn build_request_pdu(pdu_tag: u8, request_id: i32, oids: &[String]) -> NetPulseResult<Vec<u8>> {
    let varbinds = build_request_varbinds(oids)?;
    let content: Vec<u8> = [
        ber::encode_integer(request_id as i64),
        ber::encode_integer(0),
        ber::encode_integer(0),
        varbinds,
    ]
    .concat();
    Ok(ber::encode_tlv(pdu_tag, &content))
}

/// `SEQUENCE { version, community, PDU }` (spec.md §4.6 v1/v2c message).
pub fn build_v1v2c_message(version: SnmpVersion, community: &str, pdu: Vec<u8>) -> Vec<u8> {
    let items = vec![
        ber::encode_integer(version.wire_value() as i64),
        ber::encode_octet_string(community.as_bytes()),
        pdu,
    ];
    ber::encode_sequence(&items)
}

/// `SEQUENCE { version=3, msgGlobalData, msgSecurityParameters, scopedPDU }`
/// (spec.md §4.6 v3 message). Sets `reportable` and, when requested, the
/// `auth`/`priv` flag bits, but never computes a USM digest or applies
/// privacy (spec.md §9 Open Questions: v3 is best-effort/unauthenticated).
#[allow(clippy::too_many_arguments)]
pub fn build_v3_message(
    msg_id: i32,
    security_level_flags: u8,
    username: &str,
    context_engine_id: &str,
    context_name: &str,
    pdu: Vec<u8>,
) -> Vec<u8> {
    let flags = security_level_flags | MSG_FLAG_REPORTABLE;

    let msg_global_data = ber::encode_sequence(&[
        ber::encode_integer(msg_id as i64),
        ber::encode_integer(65507), // msgMaxSize
        ber::encode_octet_string(&[flags]),
        ber::encode_integer(3), // msgSecurityModel = USM
    ]);

    let usm_params = ber::encode_sequence(&[
        ber::encode_octet_string(&[]), // msgAuthoritativeEngineID
        ber::encode_integer(0),        // msgAuthoritativeEngineBoots
        ber::encode_integer(0),        // msgAuthoritativeEngineTime
        ber::encode_octet_string(username.as_bytes()),
        ber::encode_octet_string(&[]), // msgAuthenticationParameters (no auth applied)
        ber::encode_octet_string(&[]), // msgPrivacyParameters (no priv applied)
    ]);
    let msg_security_parameters = ber::encode_octet_string(&usm_params);

    let scoped_pdu = ber::encode_sequence(&[
        ber::encode_octet_string(context_engine_id.as_bytes()),
        ber::encode_octet_string(context_name.as_bytes()),
        pdu,
    ]);

    ber::encode_sequence(&[
        ber::encode_integer(SnmpVersion::V3.wire_value() as i64),
        msg_global_data,
        msg_security_parameters,
        scoped_pdu,
    ])
}

#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub version: SnmpVersion,
    pub error_status: i32,
    pub error_index: i32,
    pub varbinds: Vec<SnmpVarBind>,
}

/// Maps an SNMP `errorStatus` code to its RFC 1157 name.
pub fn error_status_message(status: i32) -> &'static str {
    match status {
        0 => "noError",
        1 => "tooBig",
        2 => "noSuchName",
        3 => "badValue",
        4 => "readOnly",
        5 => "genErr",
        _ => "unknown",
    }
}

/// Decodes a single varbind value into `(SnmpDataType, value string,
/// int_value, counter_value)` (spec.md §4.6 Parsing).
fn decode_value(tag: u8, content: &[u8]) -> (SnmpDataType, String, Option<i64>, Option<u64>) {
    match tag {
        ber::TAG_INTEGER => {
            let v = ber::decode_integer(content).unwrap_or(0);
            (SnmpDataType::Integer, v.to_string(), Some(v), None)
        }
        ber::TAG_OCTET_STRING => {
            let s = String::from_utf8_lossy(content).to_string();
            (SnmpDataType::OctetString, s, None, None)
        }
        ber::TAG_OID => {
            let s = ber::decode_oid(content).unwrap_or_default();
            (SnmpDataType::ObjectIdentifier, s, None, None)
        }
        ber::TAG_IP_ADDRESS => (
            SnmpDataType::IpAddress,
            ber::decode_ip_address(content),
            None,
            None,
        ),
        ber::TAG_COUNTER32 => {
            let v = ber::decode_unsigned(content);
            (SnmpDataType::Counter32, v.to_string(), None, Some(v))
        }
        ber::TAG_GAUGE32 => {
            let v = ber::decode_unsigned(content);
            (SnmpDataType::Gauge32, v.to_string(), None, Some(v))
        }
        ber::TAG_TIME_TICKS => {
            let v = ber::decode_unsigned(content);
            (SnmpDataType::TimeTicks, v.to_string(), None, Some(v))
        }
        ber::TAG_COUNTER64 => {
            let v = ber::decode_unsigned(content);
            (SnmpDataType::Counter64, v.to_string(), None, Some(v))
        }
        ber::TAG_NULL => (SnmpDataType::Null, String::new(), None, None),
        ber::TAG_NO_SUCH_OBJECT => (SnmpDataType::NoSuchObject, String::new(), None, None),
        ber::TAG_NO_SUCH_INSTANCE => (SnmpDataType::NoSuchInstance, String::new(), None, None),
        ber::TAG_END_OF_MIB_VIEW => (SnmpDataType::EndOfMibView, String::new(), None, None),
        _ => (SnmpDataType::Unknown, ber::hex_render(content), None, None),
    }
}

fn parse_pdu(pdu_content: &[u8]) -> NetPulseResult<ParsedResponse> {
    let mut pos = 0;
    let (_request_id_tag, _) = ber::decode_tlv(pdu_content, &mut pos)?;
    let (_, error_status_content) = ber::decode_tlv(pdu_content, &mut pos)?;
    let error_status = ber::decode_integer(error_status_content)? as i32;
    let (_, error_index_content) = ber::decode_tlv(pdu_content, &mut pos)?;
    let error_index = ber::decode_integer(error_index_content)? as i32;

    let mut varbinds = Vec::new();
    if error_status == 0 {
        let (_, varbind_list) = ber::decode_tlv(pdu_content, &mut pos)?;
        let mut vb_pos = 0;
        while vb_pos < varbind_list.len() {
            let (_, pair) = ber::decode_tlv(varbind_list, &mut vb_pos)?;
            let mut inner_pos = 0;
            let (oid_tag, oid_content) = ber::decode_tlv(pair, &mut inner_pos)?;
            if oid_tag != ber::TAG_OID {
                return Err(NetPulseError::Protocol("varbind missing OID".into()));
            }
            let oid = ber::decode_oid(oid_content)?;
            let (value_tag, value_content) = ber::decode_tlv(pair, &mut inner_pos)?;
            let (data_type, value, int_value, counter_value) =
                decode_value(value_tag, value_content);
            varbinds.push(SnmpVarBind {
                oid,
                data_type,
                value,
                int_value,
                counter_value,
            });
        }
    }

    Ok(ParsedResponse {
        version: SnmpVersion::V2c, // overwritten by caller once outer version is known
        error_status,
        error_index,
        varbinds,
    })
}

/// Decodes the outer SEQUENCE, branches on version, and parses the inner
/// GetResponse PDU (spec.md §4.6 Parsing). v3's `msgGlobalData` and
/// `msgSecurityParameters` contents are skipped (authentication/privacy are
/// not verified); `contextEngineID`/`contextName` are discarded.
pub fn parse_message(buf: &[u8]) -> NetPulseResult<ParsedResponse> {
    let mut pos = 0;
    let (tag, outer) = ber::decode_tlv(buf, &mut pos)?;
    if tag != ber::TAG_SEQUENCE {
        return Err(NetPulseError::Protocol("expected outer SEQUENCE".into()));
    }

    let mut outer_pos = 0;
    let (_, version_content) = ber::decode_tlv(outer, &mut outer_pos)?;
    let version_value = ber::decode_integer(version_content)?;

    let pdu_content = if version_value == SnmpVersion::V3.wire_value() as i64 {
        let (_, _msg_global_data) = ber::decode_tlv(outer, &mut outer_pos)?;
        let (_, _msg_security_parameters) = ber::decode_tlv(outer, &mut outer_pos)?;
        let (scoped_pdu_tag, scoped_pdu) = ber::decode_tlv(outer, &mut outer_pos)?;
        if scoped_pdu_tag != ber::TAG_SEQUENCE {
            return Err(NetPulseError::Protocol("expected scopedPDU SEQUENCE".into()));
        }
        let mut scoped_pos = 0;
        let (_, _context_engine_id) = ber::decode_tlv(scoped_pdu, &mut scoped_pos)?;
        let (_, _context_name) = ber::decode_tlv(scoped_pdu, &mut scoped_pos)?;
        let (pdu_tag, pdu_content) = ber::decode_tlv(scoped_pdu, &mut scoped_pos)?;
        if pdu_tag != ber::TAG_GET_RESPONSE {
            return Err(NetPulseError::Protocol(format!(
                "expected GetResponse PDU (0xA2), got {pdu_tag:#04x}"
            )));
        }
        pdu_content
    } else {
        let (_, _community) = ber::decode_tlv(outer, &mut outer_pos)?;
        let (pdu_tag, pdu_content) = ber::decode_tlv(outer, &mut outer_pos)?;
        if pdu_tag != ber::TAG_GET_RESPONSE {
            return Err(NetPulseError::Protocol(format!(
                "expected GetResponse PDU (0xA2), got {pdu_tag:#04x}"
            )));
        }
        pdu_content
    };

    let mut parsed = parse_pdu(pdu_content)?;
    parsed.version = if version_value == SnmpVersion::V3.wire_value() as i64 {
        SnmpVersion::V3
    } else if version_value == SnmpVersion::V1.wire_value() as i64 {
        SnmpVersion::V1
    } else {
        SnmpVersion::V2c
    };
    Ok(parsed)
}
