//! Probe implementations (spec.md §4.4-§4.6): ICMP echo, TCP connect-scan,
//! and SNMP BER/poller. Each probe recovers its own transport failures
//! locally and expresses them as a failed result rather than propagating an
//! exception (spec.md §7 ProbeError).

pub mod icmp;
pub mod snmp;
pub mod tcp_scan;
