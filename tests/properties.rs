//! Property invariants from spec §8, checked with `proptest` over
//! arbitrary inputs rather than the fixed examples covered by the inline
//! unit tests.

use proptest::prelude::*;

use pairsync_core::config::Config;
use pairsync_core::pattern::PatternEpoch;
use pairsync_core::role::{elect, Role};
use pairsync_core::sync::SyncFilter;
use pairsync_core::wire::crc::crc16_ccitt;
use pairsync_core::wire::Beacon;

proptest! {
    /// Role election is symmetric for every `(battery_a, battery_b, id_a, id_b)`
    /// with distinct identities: if A elects itself Leader against B, B must
    /// elect itself Follower against A.
    #[test]
    fn election_is_symmetric(
        battery_a in 0u8..=100,
        battery_b in 0u8..=100,
        id_a in any::<[u8; 6]>(),
        id_b in any::<[u8; 6]>(),
    ) {
        prop_assume!(battery_a != battery_b || id_a != id_b);
        let role_a = elect(battery_a, battery_b, id_a, id_b);
        let role_b = elect(battery_b, battery_a, id_b, id_a);
        prop_assert_ne!(role_a, role_b);
    }

    /// The filter's smoothed estimate is always a convex combination of the
    /// raw samples it has accepted so far — it never overshoots the
    /// min/max of what it has actually seen.
    #[test]
    fn filter_estimate_is_convex_combination(
        bootstrap in -5_000i64..5_000,
        samples in prop::collection::vec(-10_000i64..10_000, 1..20),
    ) {
        let cfg = Config::default();
        let mut filter = SyncFilter::new();
        filter.bootstrap(bootstrap);

        let mut accepted = vec![bootstrap];
        for raw in samples {
            if filter.update(raw, &cfg) {
                accepted.push(raw);
            }
            let est = filter.estimate_us().unwrap();
            let lo = *accepted.iter().min().unwrap();
            let hi = *accepted.iter().max().unwrap();
            prop_assert!(est >= lo && est <= hi);
        }
    }

    /// CRC over a beacon's 23 covered bytes rejects every single-byte
    /// mutation, for arbitrary beacon field values.
    #[test]
    fn beacon_crc_detects_any_single_byte_mutation(
        leader_time_us in any::<u64>(),
        epoch_us in any::<u64>(),
        period_ms in any::<u32>(),
        duty_percent in any::<u8>(),
        mode_id in any::<u8>(),
        sequence in any::<u8>(),
        mutate_byte in 0usize..23,
    ) {
        let b = Beacon::new_with_crc(leader_time_us, epoch_us, period_ms, duty_percent, mode_id, sequence);
        let mut buf = [0u8; pairsync_core::wire::BEACON_WIRE_LEN];
        b.encode(&mut buf);
        buf[mutate_byte] ^= 0xFF;
        let recomputed = crc16_ccitt(&buf[0..23]);
        prop_assert_ne!(recomputed, b.crc16_ccitt);
    }

    /// Leader and Follower ACTIVE intervals never overlap across an
    /// arbitrary valid `(period, duty)` pair, for any cycle within a
    /// multi-cycle session.
    #[test]
    fn leader_follower_never_overlap(
        period_ms in 100u32..=60_000,
        duty_percent in 1u8..=100,
        cycle in 0i64..20,
        offset_within_cycle in 0u32..1000,
    ) {
        let epoch = PatternEpoch {
            epoch_us: 0,
            period_ms,
            duty_percent,
            mode_id: 0,
        };
        let period_us = (period_ms as i64) * 1000;
        let t = cycle * period_us + (offset_within_cycle as i64) * (period_us / 1000).max(1);

        let leader_pos = cycle_position(t, &epoch, Role::Leader);
        let follower_pos = cycle_position(t, &epoch, Role::Follower);
        let threshold = (period_us / 2) * (duty_percent as i64) / 100;

        let leader_active = leader_pos < threshold;
        let follower_active = follower_pos < threshold;
        prop_assert!(!(leader_active && follower_active));
    }
}

/// Mirrors `pattern::cycle_position_us` (private to the crate) for the
/// property test above — the formula is part of the tested contract, not
/// an implementation detail worth exposing publicly.
fn cycle_position(t_sync_us: i64, epoch: &PatternEpoch, role: Role) -> i64 {
    let period_us = (epoch.period_ms as i64) * 1000;
    let role_phase = if role == Role::Follower { period_us / 2 } else { 0 };
    let raw = t_sync_us - epoch.epoch_us - role_phase;
    ((raw % period_us) + period_us) % period_us
}
