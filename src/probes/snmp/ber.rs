//! BER/ASN.1 encoder and decoder (spec.md §4.6 Wire format).
//!
//! Supports INTEGER, OCTET STRING, NULL, OID, SEQUENCE, the SNMP
//! application tags (Counter32/Gauge32/TimeTicks/Counter64/IpAddress), and
//! the three PDU tags used by this implementation (GetRequest/
//! GetNextRequest/GetResponse). Pure functions over `&[u8]`/`Vec<u8>`; no
//! I/O, so these are exercised directly by `proptest` round-trip tests.

use crate::error::{NetPulseError, NetPulseResult};

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;

pub const TAG_IP_ADDRESS: u8 = 0x40;
pub const TAG_COUNTER32: u8 = 0x41;
pub const TAG_GAUGE32: u8 = 0x42;
pub const TAG_TIME_TICKS: u8 = 0x43;
pub const TAG_COUNTER64: u8 = 0x46;

pub const TAG_NO_SUCH_OBJECT: u8 = 0x80;
pub const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
pub const TAG_END_OF_MIB_VIEW: u8 = 0x82;

pub const TAG_GET_REQUEST: u8 = 0xA0;
pub const TAG_GET_NEXT_REQUEST: u8 = 0xA1;
pub const TAG_GET_RESPONSE: u8 = 0xA2;

/// Length encoding: short form for `<128`, long form (1+n bytes) otherwise.
pub fn encode_length(len: usize) -> Vec<u8> {
    if len < 128 {
        vec![len as u8]
    } else {
        let bytes = len.to_be_bytes();
        let significant: Vec<u8> = bytes
            .iter()
            .copied()
            .skip_while(|&b| b == 0)
            .collect();
        let mut out = vec![0x80 | significant.len() as u8];
        out.extend(significant);
        out
    }
}

/// Decodes a BER length starting at `buf[*pos]`, advancing `*pos` past it.
pub fn decode_length(buf: &[u8], pos: &mut usize) -> NetPulseResult<usize> {
    let first = *buf
        .get(*pos)
        .ok_or_else(|| NetPulseError::Protocol("truncated BER length".into()))?;
    *pos += 1;
    if first & 0x80 == 0 {
        return Ok(first as usize);
    }
    let n = (first & 0x7F) as usize;
    if n == 0 || n > 8 {
        return Err(NetPulseError::Protocol(format!(
            "unsupported long-form length octet count: {n}"
        )));
    }
    if *pos + n > buf.len() {
        return Err(NetPulseError::Protocol("truncated long-form BER length".into()));
    }
    let mut value: u64 = 0;
    for &b in &buf[*pos..*pos + n] {
        value = (value << 8) | b as u64;
    }
    *pos += n;
    Ok(value as usize)
}

/// Wraps `content` in a tag + length header.
pub fn encode_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(encode_length(content.len()));
    out.extend_from_slice(content);
    out
}

/// Reads one TLV starting at `buf[*pos]`; returns `(tag, content_slice)` and
/// advances `*pos` past the value.
pub fn decode_tlv<'a>(buf: &'a [u8], pos: &mut usize) -> NetPulseResult<(u8, &'a [u8])> {
    let tag = *buf
        .get(*pos)
        .ok_or_else(|| NetPulseError::Protocol("truncated BER tag".into()))?;
    *pos += 1;
    let len = decode_length(buf, pos)?;
    if *pos + len > buf.len() {
        return Err(NetPulseError::Protocol("truncated BER value".into()));
    }
    let content = &buf[*pos..*pos + len];
    *pos += len;
    Ok((tag, content))
}

fn encode_signed_magnitude(value: i64) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }
    let bytes = value.to_be_bytes();
    let mut trimmed: Vec<u8> = bytes.to_vec();
    // Drop redundant leading sign-extension bytes while keeping the sign bit correct.
    while trimmed.len() > 1 {
        let (first, second) = (trimmed[0], trimmed[1]);
        let redundant = (first == 0x00 && second & 0x80 == 0) || (first == 0xFF && second & 0x80 != 0);
        if redundant {
            trimmed.remove(0);
        } else {
            break;
        }
    }
    trimmed
}

pub fn encode_integer(value: i64) -> Vec<u8> {
    encode_tlv(TAG_INTEGER, &encode_signed_magnitude(value))
}

pub fn decode_integer(content: &[u8]) -> NetPulseResult<i64> {
    if content.is_empty() {
        return Err(NetPulseError::Protocol("empty INTEGER content".into()));
    }
    let negative = content[0] & 0x80 != 0;
    let mut value: i64 = if negative { -1 } else { 0 };
    for &b in content {
        value = (value << 8) | b as i64;
    }
    Ok(value)
}

/// Unsigned big-endian decode used for Counter32/Gauge32/TimeTicks/Counter64
/// (spec.md §4.6 Parsing).
pub fn decode_unsigned(content: &[u8]) -> u64 {
    content.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

pub fn encode_unsigned_application(tag: u8, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut trimmed: &[u8] = &bytes;
    while trimmed.len() > 1 && trimmed[0] == 0 {
        trimmed = &trimmed[1..];
    }
    // Leading bit set would be read as negative by some decoders; SNMP
    // counters are unsigned so a leading 0x00 pad is added when needed.
    let mut content = trimmed.to_vec();
    if content[0] & 0x80 != 0 {
        content.insert(0, 0);
    }
    encode_tlv(tag, &content)
}

pub fn encode_octet_string(bytes: &[u8]) -> Vec<u8> {
    encode_tlv(TAG_OCTET_STRING, bytes)
}

pub fn encode_null() -> Vec<u8> {
    encode_tlv(TAG_NULL, &[])
}

pub fn encode_sequence(items: &[Vec<u8>]) -> Vec<u8> {
    let content: Vec<u8> = items.iter().flatten().copied().collect();
    encode_tlv(TAG_SEQUENCE, &content)
}

pub fn encode_ip_address(octets: [u8; 4]) -> Vec<u8> {
    encode_tlv(TAG_IP_ADDRESS, &octets)
}

pub fn decode_ip_address(content: &[u8]) -> String {
    if content.len() != 4 {
        return hex_render(content);
    }
    format!("{}.{}.{}.{}", content[0], content[1], content[2], content[3])
}

pub fn hex_render(content: &[u8]) -> String {
    content.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
}

/// Packs an OID: the first two sub-identifiers as `40*a + b`, the rest as
/// base-128 varints with the continuation bit set on all but the last byte
/// of each sub-identifier (spec.md §4.6 OID encoding).
pub fn encode_oid(dotted: &str) -> NetPulseResult<Vec<u8>> {
    let parts: Vec<u32> = dotted
        .split('.')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| NetPulseError::Protocol(format!("invalid OID: {dotted}")))?;

    if parts.len() < 2 {
        return Err(NetPulseError::Protocol(format!(
            "OID must have at least 2 components: {dotted}"
        )));
    }
    if parts[0] > 2 {
        return Err(NetPulseError::Protocol(format!(
            "OID first component must be <= 2: {dotted}"
        )));
    }

    let mut content = Vec::new();
    content.extend(encode_base128(40 * parts[0] + parts[1]));
    for &sub in &parts[2..] {
        content.extend(encode_base128(sub));
    }
    Ok(encode_tlv(TAG_OID, &content))
}

fn encode_base128(mut value: u32) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push((value & 0x7F) as u8);
        value >>= 7;
    }
    digits.reverse();
    let last = digits.len() - 1;
    for (i, d) in digits.iter_mut().enumerate() {
        if i != last {
            *d |= 0x80;
        }
    }
    digits
}

/// Decodes OID content bytes (without the tag/length header) back to a
/// dotted-decimal string.
pub fn decode_oid(content: &[u8]) -> NetPulseResult<String> {
    if content.is_empty() {
        return Err(NetPulseError::Protocol("empty OID content".into()));
    }
    let first = content[0];
    let a = (first / 40).min(2);
    let b = first as u32 - a as u32 * 40;
    let mut parts = vec![a as u32, b];

    let mut value: u32 = 0;
    for &byte in &content[1..] {
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            parts.push(value);
            value = 0;
        }
    }

    Ok(parts
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("."))
}

/// True when `oid` is a prefix-descendant of `root` on a dot boundary
/// (spec.md §4.6 Walk algorithm / §8 S7).
pub fn is_prefix_descendant(oid: &str, root: &str) -> bool {
    let prefix = format!("{root}.");
    oid.starts_with(&prefix) && oid != root
}
