//! Property-based tests for invariants that must hold for every input
//! (spec.md §8), not just the handful of concrete cases covered by unit
//! tests elsewhere.

use chrono::Utc;
use netpulse::scan_engine::compute_diff;
use netpulse::storage::models::{PingResult, PortScanResult, PortState};
use netpulse::storage::{HostRepository, MetricsRepository, Storage};
use proptest::prelude::*;
use std::collections::HashSet;

fn arb_port_state() -> impl Strategy<Value = PortState> {
    prop_oneof![
        Just(PortState::Unknown),
        Just(PortState::Open),
        Just(PortState::Closed),
        Just(PortState::Filtered),
    ]
}

fn arb_scan_result(port: u16) -> impl Strategy<Value = PortScanResult> {
    arb_port_state().prop_map(move |state| PortScanResult {
        id: 0,
        target_address: "10.0.0.1".to_string(),
        port,
        state,
        service_name: String::new(),
        scan_timestamp: Utc::now(),
    })
}

fn arb_scan_snapshot() -> impl Strategy<Value = Vec<PortScanResult>> {
    let ports: Vec<u16> = (1..=8).collect();
    proptest::collection::vec(
        proptest::sample::select(ports).prop_flat_map(arb_scan_result),
        0..8,
    )
    .prop_map(|mut results| {
        // A scan snapshot has at most one row per port.
        let mut seen = HashSet::new();
        results.retain(|r| seen.insert(r.port));
        results
    })
}

proptest! {
    /// Every change `compute_diff` reports is consistent with the two
    /// snapshots it was computed from: at most one entry per port, and its
    /// `current_state` either matches the port's row in `current`, or the
    /// port vanished entirely and `current_state` is `Unknown` (spec.md
    /// §4.8 Diff algorithm).
    #[test]
    fn prop_diff_changes_are_keyed_to_current_snapshot_ports(
        previous in arb_scan_snapshot(),
        current in arb_scan_snapshot(),
    ) {
        let diff = compute_diff("10.0.0.1", &previous, &current);

        let current_by_port: std::collections::HashMap<u16, PortState> =
            current.iter().map(|r| (r.port, r.state)).collect();

        let mut seen_ports = HashSet::new();
        for change in &diff.changes {
            prop_assert!(seen_ports.insert(change.port), "a port must not appear twice in one diff");
            match current_by_port.get(&change.port) {
                Some(&state) => prop_assert_eq!(change.current_state, state),
                None => prop_assert_eq!(change.current_state, PortState::Unknown),
            }
        }

        prop_assert_eq!(diff.total_ports_scanned, current.len() as i64);
    }

    /// `openPortsBefore`/`openPortsAfter` always match a direct count of
    /// `Open` rows in their respective snapshot, independent of `changes`.
    #[test]
    fn prop_diff_open_counts_match_snapshot_counts(
        previous in arb_scan_snapshot(),
        current in arb_scan_snapshot(),
    ) {
        let diff = compute_diff("10.0.0.1", &previous, &current);
        let expected_before = previous.iter().filter(|r| r.state == PortState::Open).count() as i64;
        let expected_after = current.iter().filter(|r| r.state == PortState::Open).count() as i64;
        prop_assert_eq!(diff.open_ports_before, expected_before);
        prop_assert_eq!(diff.open_ports_after, expected_after);
    }
}

proptest! {
    /// `PingStatistics::packet_loss_percent` is always a valid percentage
    /// and exactly reflects the successful/total ratio of whatever was
    /// inserted (spec.md §8 statistics invariant).
    #[test]
    fn prop_packet_loss_percent_matches_inserted_successes(
        outcomes in proptest::collection::vec(any::<bool>(), 1..40),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let storage = Storage::open_in_memory().await.unwrap();
            let hosts = HostRepository::new(storage.clone());
            let metrics = MetricsRepository::new(storage);

            let host_id = hosts
                .insert(&netpulse::storage::models::Host {
                    id: 0,
                    name: "prop-host".to_string(),
                    address: "10.0.0.9".to_string(),
                    ping_interval_seconds: 30,
                    warning_threshold_ms: 100,
                    critical_threshold_ms: 500,
                    status: netpulse::storage::models::HostStatus::Unknown,
                    enabled: true,
                    group_id: None,
                    created_at: Utc::now(),
                    last_checked: None,
                })
                .await
                .unwrap();

            let total = outcomes.len() as i64;
            let successful = outcomes.iter().filter(|&&ok| ok).count() as i64;

            for success in &outcomes {
                metrics
                    .insert_ping_result(&PingResult {
                        id: 0,
                        host_id,
                        timestamp: Utc::now(),
                        latency_us: if *success { 1_000 } else { 0 },
                        success: *success,
                        ttl: if *success { Some(64) } else { None },
                        error_message: String::new(),
                    })
                    .await
                    .unwrap();
            }

            let stats = metrics.get_statistics(host_id, total).await.unwrap();
            prop_assert_eq!(stats.total_pings, total);
            prop_assert_eq!(stats.successful_pings, successful);
            prop_assert!((0.0..=100.0).contains(&stats.packet_loss_percent));

            let expected_loss = (total - successful) as f64 / total as f64 * 100.0;
            prop_assert!((stats.packet_loss_percent - expected_loss).abs() < 0.001);
            Ok(())
        })?;
    }
}
