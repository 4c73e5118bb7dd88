//! Pattern Scheduler (§4.3): drives actuator activation on both nodes from
//! a single shared `(epoch, period, duty)` without direct cycle-by-cycle
//! coordination — the "sheet music" model.

use crate::actuator::{Actuator, ActuatorState, Direction};
use crate::config::Config;
use crate::log::{debug, warn};
use crate::role::Role;

/// `(epoch_time, period, duty, mode_id)` — the shared reference both
/// nodes compute their own activation times from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternEpoch {
    pub epoch_us: i64,
    pub period_ms: u32,
    pub duty_percent: u8,
    pub mode_id: u8,
}

impl PatternEpoch {
    pub fn is_valid(&self, max_period_ms: u32) -> bool {
        self.period_ms > 0 && self.period_ms <= max_period_ms
    }
}

fn role_phase_us(role: Role, period_us: i64) -> i64 {
    match role {
        Role::Follower => period_us / 2,
        _ => 0,
    }
}

/// `pos = ((t_sync - e - role_phase) mod p + p) mod p`
fn cycle_position_us(t_sync_us: i64, epoch: &PatternEpoch, role: Role) -> i64 {
    let period_us = (epoch.period_ms as i64) * 1000;
    let phase = role_phase_us(role, period_us);
    let raw = t_sync_us - epoch.epoch_us - phase;
    ((raw % period_us) + period_us) % period_us
}

fn active_threshold_us(epoch: &PatternEpoch) -> i64 {
    let period_us = (epoch.period_ms as i64) * 1000;
    (period_us / 2) * (epoch.duty_percent as i64) / 100
}

pub fn cycle_index(t_sync_us: i64, epoch: &PatternEpoch) -> i64 {
    let period_us = (epoch.period_ms as i64) * 1000;
    (t_sync_us - epoch.epoch_us).div_euclid(period_us)
}

/// An armed future parameter change, mirrored between Leader and Follower
/// and applied atomically by the scheduler when `get_sync_time()` crosses
/// `effective_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedChange {
    pub new_mode: u8,
    pub new_period_ms: u32,
    pub new_duty_percent: u8,
    pub effective_us: i64,
}

pub struct PatternScheduler {
    pub epoch: Option<PatternEpoch>,
    pub armed: Option<ArmedChange>,
    state: ActuatorState,
    last_cycle: Option<i64>,
    lock_wait_start_us: Option<i64>,
    locked: bool,
}

pub enum TickOutcome {
    NoChange,
    Transitioned { state: ActuatorState, cycle: i64 },
    ModeCommitted,
    LockTimedOut,
}

impl PatternScheduler {
    pub fn new() -> Self {
        Self {
            epoch: None,
            armed: None,
            state: ActuatorState::Inactive,
            last_cycle: None,
            lock_wait_start_us: None,
            locked: false,
        }
    }

    pub fn install_epoch(&mut self, epoch: PatternEpoch) {
        self.epoch = Some(epoch);
        self.state = ActuatorState::Inactive;
        self.last_cycle = None;
    }

    /// Role Elector flags a role swap; the scheduler halts and drops its
    /// epoch entirely.
    pub fn invalidate_epoch(&mut self) {
        self.epoch = None;
        self.armed = None;
        self.state = ActuatorState::Inactive;
        self.last_cycle = None;
        self.locked = false;
        self.lock_wait_start_us = None;
    }

    pub fn arm(&mut self, change: ArmedChange) {
        self.armed = Some(change);
    }

    /// Follower only: refuses to actuate until antiphase lock, bounded by
    /// `antiphase_lock_wait_ms`. Call every tick with the Sync Engine's
    /// `antiphase_lock()` predicate; returns `false` once the wait is
    /// exhausted without ever locking (fail gracefully — quiescent, not
    /// panicking).
    pub fn await_lock(&mut self, now_us: i64, have_lock: bool, cfg: &Config) -> bool {
        if have_lock {
            self.locked = true;
            self.lock_wait_start_us = None;
            return true;
        }
        if self.locked {
            // Lock was acquired before and has since gone stale; scheduler
            // keeps running on the existing epoch (extrapolation), it's up
            // to the caller to decide whether to keep actuating.
            return true;
        }
        let start = *self.lock_wait_start_us.get_or_insert(now_us);
        if now_us.saturating_sub(start) > (cfg.antiphase_lock_wait_ms as i64) * 1000 {
            warn!("antiphase lock never acquired within bound, giving up");
            return false;
        }
        false
    }

    /// Applies an armed change atomically once `t_sync_us` has crossed its
    /// effective time. At no point is `(new_period, old_epoch)` ever
    /// observable: the epoch field is replaced in the same assignment as
    /// the period.
    fn apply_armed_if_due(&mut self, t_sync_us: i64) -> bool {
        if let Some(change) = self.armed {
            if t_sync_us >= change.effective_us {
                self.epoch = Some(PatternEpoch {
                    epoch_us: change.effective_us,
                    period_ms: change.new_period_ms,
                    duty_percent: change.new_duty_percent,
                    mode_id: change.new_mode,
                });
                self.armed = None;
                self.last_cycle = None;
                return true;
            }
        }
        false
    }

    /// Evaluates one tick: applies any due armed change, computes cycle
    /// position, and commands the actuator on an ACTIVE/INACTIVE edge.
    pub fn tick<A: Actuator>(&mut self, t_sync_us: i64, role: Role, actuator: &mut A) -> TickOutcome {
        let committed = self.apply_armed_if_due(t_sync_us);

        let epoch = match self.epoch {
            Some(e) => e,
            None => return TickOutcome::NoChange,
        };

        let pos = cycle_position_us(t_sync_us, &epoch, role);
        let threshold = active_threshold_us(&epoch);
        let new_state = if pos < threshold {
            ActuatorState::Active
        } else {
            ActuatorState::Inactive
        };

        if committed {
            debug!("mode commit applied: period={}ms duty={}%", epoch.period_ms, epoch.duty_percent);
        }

        if new_state != self.state {
            self.state = new_state;
            let cycle = cycle_index(t_sync_us, &epoch);
            if new_state == ActuatorState::Active {
                self.last_cycle = Some(cycle);
                let direction = if cycle % 2 == 0 {
                    Direction::Forward
                } else {
                    Direction::Reverse
                };
                actuator.command(ActuatorState::Active, direction, epoch.duty_percent);
            } else {
                actuator.command(ActuatorState::Inactive, Direction::Forward, 0);
            }
            if committed {
                return TickOutcome::ModeCommitted;
            }
            return TickOutcome::Transitioned { state: new_state, cycle };
        }

        if committed {
            TickOutcome::ModeCommitted
        } else {
            TickOutcome::NoChange
        }
    }

    pub fn actuator_state(&self) -> ActuatorState {
        self.state
    }

    pub fn current_cycle(&self) -> Option<i64> {
        self.last_cycle
    }
}

impl Default for PatternScheduler {
    fn default() -> Self {
        Self::new()
    }
}
