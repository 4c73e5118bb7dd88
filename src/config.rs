//! Tunable constants for the synchronization and coordination core.
//!
//! Every knob named in the spec (filter alphas, outlier thresholds, beacon
//! interval bounds, safety windows, queue depths) lives here rather than as
//! scattered literals, so tests can run the whole state machine on an
//! accelerated clock by overriding a handful of fields.

/// Ring buffer depth for retained raw sync samples (diagnostics only).
pub const SAMPLE_HISTORY_LEN: usize = 8;

/// Max simultaneous queued messages per cross-thread direction.
pub const QUEUE_DEPTH: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// EMA weight applied to a new sample while fast-attack.
    pub alpha_fast: f32,
    /// EMA weight applied to a new sample once steady-state.
    pub alpha_steady: f32,

    /// Outlier rejection threshold while fast-attack, in microseconds.
    pub outlier_fast_us: i64,
    /// Outlier rejection threshold once steady-state, in microseconds.
    pub outlier_steady_us: i64,

    /// Accepted-sample count that promotes fast-attack to steady-state.
    pub steady_state_sample_count: u32,
    /// Consecutive-sample stability window (microseconds) that also
    /// promotes fast-attack to steady-state.
    pub steady_state_stability_us: i64,
    /// Number of consecutive stable samples required for the above.
    pub steady_state_stability_count: u32,

    /// Minimum and maximum beacon send interval, in milliseconds.
    pub beacon_interval_min_ms: u32,
    pub beacon_interval_max_ms: u32,
    /// Prediction error below which a streak counts as "good" (ms).
    pub beacon_good_error_ms: i64,
    /// Consecutive good samples required before doubling the interval.
    pub beacon_good_streak: u32,
    /// Prediction error above which a sample is "poor" (ms), resetting interval.
    pub beacon_poor_error_ms: i64,

    /// Expected crystal drift bound used for DriftDetected (ms).
    pub drift_detect_threshold_ms: i64,

    /// Handshake RTT bounds, in microseconds.
    pub handshake_min_rtt_us: i64,
    pub handshake_max_rtt_us: i64,
    /// Bounded handshake retry count.
    pub handshake_max_retries: u8,

    /// Disconnect safety window before the epoch is invalidated (seconds).
    pub disconnect_timeout_s: u64,

    /// Mode-commit safety margin added to `now_sync` for the leader's
    /// effective time (microseconds).
    pub mode_commit_safety_margin_us: i64,
    /// Tolerance for validating alignment of a proposal's effective time
    /// with the current epoch (microseconds).
    pub mode_commit_alignment_tolerance_us: i64,

    /// Bounded wait for antiphase lock before giving up (milliseconds).
    pub antiphase_lock_wait_ms: u32,
    /// Beacon-staleness multiple (of the adaptive interval) past which
    /// lock is considered lost.
    pub antiphase_lock_staleness_factor: u32,

    /// Upper bound on a pattern period (milliseconds).
    pub max_period_ms: u32,

    /// Cross-thread accessor lock timeout (microseconds).
    pub lock_timeout_us: u64,

    /// Pattern scheduler tick cadence (milliseconds).
    pub tick_interval_ms: u32,

    /// Coordination loop message-queue wait bound (milliseconds).
    pub coord_poll_timeout_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alpha_fast: 0.30,
            alpha_steady: 0.10,

            outlier_fast_us: 50_000,
            outlier_steady_us: 100_000,

            steady_state_sample_count: 12,
            steady_state_stability_us: 50,
            steady_state_stability_count: 4,

            beacon_interval_min_ms: 1_000,
            beacon_interval_max_ms: 60_000,
            beacon_good_error_ms: 5,
            beacon_good_streak: 3,
            beacon_poor_error_ms: 15,

            drift_detect_threshold_ms: 50,

            handshake_min_rtt_us: 0,
            handshake_max_rtt_us: 10_000_000,
            handshake_max_retries: 3,

            disconnect_timeout_s: 120,

            mode_commit_safety_margin_us: 2_000_000,
            mode_commit_alignment_tolerance_us: 1_000,

            antiphase_lock_wait_ms: 5_000,
            antiphase_lock_staleness_factor: 2,

            max_period_ms: 60_000,

            lock_timeout_us: 100,

            tick_interval_ms: 10,

            coord_poll_timeout_ms: 100,
        }
    }
}
