//! SNMP Probe (spec.md §4.6): BER/ASN.1 codec (`ber`), PDU/message framing
//! (`pdu`), and the async GET/GET-NEXT/WALK/monitoring surface (`poller`).

pub mod ber;
pub mod pdu;
pub mod poller;

pub use poller::SnmpPoller;
