//! Sync Engine (§4.2): two-phase handshake bootstrap followed by periodic
//! one-way beacons, fed into an EMA filter with outlier rejection and
//! dual-alpha convergence.

use crate::config::Config;
use crate::error::SyncError;
use crate::log::{debug, info, warn};
use crate::pattern::PatternEpoch;
use crate::wire::{Beacon, TimeResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    FastAttack,
    SteadyState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Init,
    Connected,
    Synced,
    DriftDetected,
    Disconnected,
}

/// EMA filter with outlier rejection and dual-alpha convergence (§4.2).
/// Ring-buffers the last `SAMPLE_HISTORY_LEN` raw samples for diagnostics.
pub struct SyncFilter {
    history: [i64; crate::config::SAMPLE_HISTORY_LEN],
    history_len: usize,
    history_cursor: usize,
    filtered_us: Option<i64>,
    mode: FilterMode,
    accepted_count: u32,
    consecutive_stable: u32,
    pub outlier_count: u32,
}

impl SyncFilter {
    pub fn new() -> Self {
        Self {
            history: [0; crate::config::SAMPLE_HISTORY_LEN],
            history_len: 0,
            history_cursor: 0,
            filtered_us: None,
            mode: FilterMode::FastAttack,
            accepted_count: 0,
            consecutive_stable: 0,
            outlier_count: 0,
        }
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn estimate_us(&self) -> Option<i64> {
        self.filtered_us
    }

    /// Bootstraps the filter with a directly computed offset (handshake
    /// result) and marks it as the current estimate without going through
    /// outlier rejection (there is nothing to compare it against yet).
    pub fn bootstrap(&mut self, offset_us: i64) {
        self.filtered_us = Some(offset_us);
    }

    /// Resets to fast-attack, keeping the current estimate, restarting
    /// the convergence counters. Used on boot and on mode change.
    pub fn reset_fast_attack(&mut self) {
        self.mode = FilterMode::FastAttack;
        self.accepted_count = 0;
        self.consecutive_stable = 0;
    }

    fn push_history(&mut self, raw_us: i64) {
        self.history[self.history_cursor] = raw_us;
        self.history_cursor = (self.history_cursor + 1) % self.history.len();
        if self.history_len < self.history.len() {
            self.history_len += 1;
        }
    }

    /// Feeds one raw sample (`local_rx_time - leader_time`). Returns
    /// `true` if accepted, `false` if rejected as an outlier.
    pub fn update(&mut self, raw_us: i64, cfg: &Config) -> bool {
        let threshold = match self.mode {
            FilterMode::FastAttack => cfg.outlier_fast_us,
            FilterMode::SteadyState => cfg.outlier_steady_us,
        };

        if let Some(filtered) = self.filtered_us {
            if (raw_us - filtered).abs() > threshold {
                self.outlier_count += 1;
                debug!("sync sample rejected as outlier: raw={} filtered={}", raw_us, filtered);
                return false;
            }
        }

        self.push_history(raw_us);

        let alpha = match self.mode {
            FilterMode::FastAttack => cfg.alpha_fast,
            FilterMode::SteadyState => cfg.alpha_steady,
        };
        let prev = self.filtered_us.unwrap_or(raw_us);
        let new_estimate = (alpha as f64) * (raw_us as f64) + (1.0 - alpha as f64) * (prev as f64);
        // `f64::round` pulls in libm on no_std targets; round-half-away-from-zero
        // by hand instead since `as i64` already truncates toward zero.
        let new_estimate = if new_estimate >= 0.0 {
            new_estimate + 0.5
        } else {
            new_estimate - 0.5
        } as i64;
        self.filtered_us = Some(new_estimate);
        self.accepted_count += 1;

        if (raw_us - new_estimate).abs() <= cfg.steady_state_stability_us {
            self.consecutive_stable += 1;
        } else {
            self.consecutive_stable = 0;
        }

        if self.mode == FilterMode::FastAttack
            && (self.accepted_count >= cfg.steady_state_sample_count
                || self.consecutive_stable >= cfg.steady_state_stability_count)
        {
            info!("sync filter entering steady state after {} accepted samples", self.accepted_count);
            self.mode = FilterMode::SteadyState;
        }

        true
    }

    /// Bounded by (min, max) of accepted raw samples currently retained,
    /// matching the "filtered estimate is a convex combination" invariant.
    #[cfg(test)]
    pub fn history_bounds(&self) -> Option<(i64, i64)> {
        if self.history_len == 0 {
            return None;
        }
        let slice = &self.history[..self.history_len];
        Some((*slice.iter().min().unwrap(), *slice.iter().max().unwrap()))
    }
}

impl Default for SyncFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Adaptive beacon-send pacing state, owned by the Leader side.
pub struct BeaconPacer {
    interval_ms: u32,
    last_send_us: i64,
    good_streak: u32,
}

impl BeaconPacer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            interval_ms: cfg.beacon_interval_min_ms,
            last_send_us: i64::MIN,
            good_streak: 0,
        }
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn should_send(&self, now_us: i64) -> bool {
        if self.last_send_us == i64::MIN {
            return true;
        }
        now_us.saturating_sub(self.last_send_us) >= (self.interval_ms as i64) * 1_000
    }

    pub fn record_send(&mut self, now_us: i64) {
        self.last_send_us = now_us;
    }

    /// Reports a prediction error sample (ms) observed via an
    /// `ActivationReport`; doubles the interval after a good streak,
    /// resets to the minimum on any poor sample.
    pub fn record_prediction_error(&mut self, error_ms: i64, cfg: &Config) {
        if error_ms > cfg.beacon_poor_error_ms {
            self.interval_ms = cfg.beacon_interval_min_ms;
            self.good_streak = 0;
            return;
        }
        if error_ms < cfg.beacon_good_error_ms {
            self.good_streak += 1;
            if self.good_streak >= cfg.beacon_good_streak {
                self.interval_ms = (self.interval_ms * 2).min(cfg.beacon_interval_max_ms);
                self.good_streak = 0;
            }
        } else {
            self.good_streak = 0;
        }
    }

    pub fn reset_to_minimum(&mut self, cfg: &Config) {
        self.interval_ms = cfg.beacon_interval_min_ms;
        self.good_streak = 0;
    }
}

/// Result of a handshake round, computed from the four NTP-style
/// timestamps (§4.2, Phase 1). `epoch_us`/`period_ms` are the leader's
/// current pattern parameters at the time of the response, mirrored here
/// so the Follower can install its Pattern Epoch without waiting a full
/// beacon interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeResult {
    pub offset_us: i64,
    pub rtt_us: i64,
    pub epoch_us: i64,
    pub period_ms: u32,
}

/// Computes `rtt := (T4-T1)-(T3-T2)`, rejecting implausible RTTs per the
/// configured bounds, and an `offset_us` in the same `local - leader`
/// convention as a beacon's raw sample (`local_rx_time - leader_time`):
/// the textbook two-timestamp-pair formula `((T2-T1)+(T3-T4))/2` computes
/// `leader - local`, so it's negated here before being handed to the
/// filter, which always operates on `local - leader` regardless of
/// whether the sample came from the handshake or a beacon.
pub fn compute_handshake(
    t1_us: i64,
    resp: &TimeResponse,
    t4_us: i64,
    cfg: &Config,
) -> Result<HandshakeResult, SyncError> {
    let t2 = resp.t2_us as i64;
    let t3 = resp.t3_us as i64;
    let offset_us = -(((t2 - t1_us) + (t3 - t4_us)) / 2);
    let rtt_us = (t4_us - t1_us) - (t3 - t2);

    if rtt_us < cfg.handshake_min_rtt_us || rtt_us > cfg.handshake_max_rtt_us {
        return Err(SyncError::ImplausibleRtt { rtt_us });
    }

    Ok(HandshakeResult {
        offset_us,
        rtt_us,
        epoch_us: resp.epoch_us as i64,
        period_ms: resp.period_ms,
    })
}

pub struct SyncEngine {
    pub state: SyncState,
    pub filter: SyncFilter,
    pub pacer: BeaconPacer,
    pub handshake_retries: u8,
    pub handshake_complete: bool,
    pub last_beacon_rx_us: Option<i64>,
    pub last_sequence: Option<u8>,
    pub sync_failures: u32,
    mirrored_epoch: Option<PatternEpoch>,
}

impl SyncEngine {
    pub fn new(cfg: &Config) -> Self {
        Self {
            state: SyncState::Init,
            filter: SyncFilter::new(),
            pacer: BeaconPacer::new(cfg),
            handshake_retries: 0,
            handshake_complete: false,
            last_beacon_rx_us: None,
            last_sequence: None,
            sync_failures: 0,
            mirrored_epoch: None,
        }
    }

    /// The Pattern Epoch last mirrored from the leader, via the handshake
    /// or a beacon (§3: "mirrored to Follower via beacon/handshake"). The
    /// caller installs this into the Pattern Scheduler; `None` until the
    /// first epoch-bearing message arrives.
    pub fn mirrored_epoch(&self) -> Option<PatternEpoch> {
        self.mirrored_epoch
    }

    /// Follower: computes `local_clock - filtered_offset`, clamped to 0
    /// to guard against a boot-race negative result. Leader callers
    /// should bypass this and just use their own local clock.
    pub fn follower_sync_time(&self, local_clock_us: i64) -> i64 {
        match self.filter.estimate_us() {
            Some(offset) => (local_clock_us - offset).max(0),
            None => 0,
        }
    }

    /// Accepts the handshake result: bootstraps the filter, marks the
    /// handshake complete, resets the retry counter, and — per §4.2 Phase
    /// 1 — installs the mirrored Pattern Epoch immediately if the leader
    /// already has one, rather than waiting a full beacon interval. The
    /// handshake response carries no duty/mode (§6 wire format), so those
    /// mirror in as quiescent placeholders until the first beacon fills
    /// them in.
    pub fn on_handshake_accepted(&mut self, result: HandshakeResult) {
        self.filter.bootstrap(result.offset_us);
        self.handshake_complete = true;
        self.handshake_retries = 0;
        self.state = SyncState::Connected;
        if result.epoch_us > 0 {
            self.mirrored_epoch = Some(PatternEpoch {
                epoch_us: result.epoch_us,
                period_ms: result.period_ms,
                duty_percent: 0,
                mode_id: 0,
            });
        }
        info!("handshake accepted: offset_us={} rtt_us={}", result.offset_us, result.rtt_us);
    }

    /// Call on a rejected handshake attempt; returns `Err` once retries
    /// are exhausted.
    pub fn on_handshake_rejected(&mut self, cfg: &Config) -> Result<(), SyncError> {
        self.handshake_retries += 1;
        if self.handshake_retries >= cfg.handshake_max_retries {
            warn!("handshake retries exhausted");
            return Err(SyncError::HandshakeExhausted);
        }
        Ok(())
    }

    /// Follower: processes a received, CRC-valid beacon. Drops duplicates
    /// (same sequence as last-processed) without touching filter state.
    /// Returns `true` if the sample was applied (accepted or rejected as
    /// an outlier both count as "applied"; only duplicates are silently
    /// dropped). Every applied beacon re-mirrors the Pattern Epoch (§3),
    /// independent of whether the clock sample itself was an outlier —
    /// the epoch/period/duty/mode fields are the leader's authoritative
    /// state regardless of transport jitter on this particular sample.
    pub fn on_beacon(&mut self, beacon: &Beacon, local_rx_time_us: i64, cfg: &Config) -> bool {
        if !beacon.crc_valid() {
            self.sync_failures += 1;
            warn!("beacon crc mismatch, dropping sample");
            return false;
        }

        if self.last_sequence == Some(beacon.sequence) {
            debug!("duplicate beacon sequence {} dropped", beacon.sequence);
            return false;
        }
        self.last_sequence = Some(beacon.sequence);

        self.mirrored_epoch = Some(PatternEpoch {
            epoch_us: beacon.epoch_us as i64,
            period_ms: beacon.period_ms,
            duty_percent: beacon.duty_percent,
            mode_id: beacon.mode_id,
        });

        let raw_us = local_rx_time_us - beacon.leader_time_us as i64;
        self.filter.update(raw_us, cfg);
        self.last_beacon_rx_us = Some(local_rx_time_us);
        self.state = SyncState::Synced;
        true
    }

    /// Follower: call once per coordination-loop tick to detect a long
    /// inter-beacon gap implying excessive crystal drift, forcing a
    /// resync by resetting the beacon interval to its minimum.
    pub fn check_drift(&mut self, now_us: i64, drift_rate_ppm: f64, cfg: &Config) {
        if let Some(last_rx) = self.last_beacon_rx_us {
            let elapsed_us = now_us.saturating_sub(last_rx);
            let expected_drift_ms = (elapsed_us as f64) * drift_rate_ppm / 1000.0;
            // `f64::abs` is a `std`-only inherent method; no_std builds go
            // through the same hand-rolled path as `SyncFilter::update`'s
            // rounding above.
            let expected_drift_ms_abs = if expected_drift_ms < 0.0 {
                -expected_drift_ms
            } else {
                expected_drift_ms
            };
            if expected_drift_ms_abs > cfg.drift_detect_threshold_ms as f64 {
                if self.state != SyncState::DriftDetected {
                    warn!("drift detected: expected {} ms over {} us", expected_drift_ms, elapsed_us);
                }
                self.state = SyncState::DriftDetected;
                self.pacer.reset_to_minimum(cfg);
            }
        }
    }

    /// `true` when handshake is complete, filter is steady-state, and the
    /// last beacon arrived within the staleness bound — the predicate
    /// Pattern Scheduler waits on before starting actuation (§4.3).
    pub fn antiphase_lock(&self, now_us: i64, cfg: &Config) -> bool {
        if !self.handshake_complete || self.filter.mode() != FilterMode::SteadyState {
            return false;
        }
        match self.last_beacon_rx_us {
            Some(last_rx) => {
                let staleness_bound_us =
                    (self.pacer.interval_ms() as i64) * 1_000 * cfg.antiphase_lock_staleness_factor as i64;
                now_us.saturating_sub(last_rx) <= staleness_bound_us
            }
            None => false,
        }
    }

    pub fn on_disconnected(&mut self) {
        self.state = SyncState::Disconnected;
    }

    pub fn on_reconnected(&mut self, cfg: &Config) {
        self.handshake_complete = false;
        self.handshake_retries = 0;
        self.filter.reset_fast_attack();
        self.pacer.reset_to_minimum(cfg);
        self.state = SyncState::Connected;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::TimeResponse;

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn handshake_rejects_negative_rtt() {
        // T4 - T1 < T3 - T2 => negative rtt
        let resp = TimeResponse {
            t1_us: 1000,
            t2_us: 1010,
            t3_us: 1020,
            epoch_us: 0,
            period_ms: 0,
        };
        let result = compute_handshake(1000, &resp, 1005, &cfg());
        assert!(matches!(result, Err(SyncError::ImplausibleRtt { .. })));
    }

    #[test]
    fn handshake_accepts_plausible_round_trip() {
        // Simulated: t1=0 (follower send), t2=10_000 (leader rx), t3=10_020 (leader send),
        // t4=20_040 (follower rx) -> rtt = (20040-0)-(10020-10000) = 20020
        let resp = TimeResponse {
            t1_us: 0,
            t2_us: 10_000,
            t3_us: 10_020,
            epoch_us: 5_000_000,
            period_ms: 2000,
        };
        let result = compute_handshake(0, &resp, 20_040, &cfg()).unwrap();
        assert_eq!(result.rtt_us, 20_020);
    }

    #[test]
    fn filter_estimate_bounded_by_accepted_samples() {
        let mut filter = SyncFilter::new();
        let c = cfg();
        filter.bootstrap(1000);
        for raw in [1010, 990, 1005, 1000, 1002, 998] {
            filter.update(raw, &c);
        }
        let (lo, hi) = filter.history_bounds().unwrap();
        let est = filter.estimate_us().unwrap();
        assert!(est >= lo && est <= hi);
    }

    #[test]
    fn filter_rejects_outlier_without_updating_estimate() {
        let mut filter = SyncFilter::new();
        let c = cfg();
        filter.bootstrap(0);
        let before = filter.estimate_us();
        let accepted = filter.update(1_000_000, &c); // way beyond 50ms fast-attack threshold
        assert!(!accepted);
        assert_eq!(filter.estimate_us(), before);
        assert_eq!(filter.outlier_count, 1);
    }

    #[test]
    fn filter_transitions_to_steady_state_after_enough_samples() {
        let mut filter = SyncFilter::new();
        let c = cfg();
        filter.bootstrap(0);
        for _ in 0..12 {
            filter.update(0, &c);
        }
        assert_eq!(filter.mode(), FilterMode::SteadyState);
    }

    #[test]
    fn duplicate_beacon_sequence_dropped() {
        let mut engine = SyncEngine::new(&cfg());
        let c = cfg();
        let b = Beacon::new_with_crc(1_000_000, 0, 2000, 25, 0, 7);
        assert!(engine.on_beacon(&b, 1_000_100, &c));
        let estimate_after_first = engine.filter.estimate_us();
        // second delivery 50ms later via a different transport, same sequence
        assert!(!engine.on_beacon(&b, 1_050_100, &c));
        assert_eq!(engine.filter.estimate_us(), estimate_after_first);
    }

    #[test]
    fn corrupt_beacon_rejected_by_crc() {
        let mut engine = SyncEngine::new(&cfg());
        let c = cfg();
        let mut b = Beacon::new_with_crc(1_000_000, 0, 2000, 25, 0, 1);
        b.duty_percent ^= 0xFF; // mutate without recomputing crc
        assert!(!engine.on_beacon(&b, 1_000_100, &c));
        assert_eq!(engine.sync_failures, 1);
    }
}
