//! Mode Commit (§4.4): two-phase commit of cycle/active parameter changes
//! to a future shared moment, without desynchronization.

use crate::config::Config;
use crate::error::CommitError;
use crate::pattern::{ArmedChange, PatternEpoch};
use crate::wire::ModeProposal;

/// Leader-side: computes the proposal for a requested mode change.
pub fn propose(
    now_sync_us: i64,
    current_epoch: &PatternEpoch,
    new_mode: u8,
    new_period_ms: u32,
    new_active_ms: u32,
    cfg: &Config,
) -> Result<ModeProposal, CommitError> {
    if new_period_ms == 0 || new_period_ms > cfg.max_period_ms {
        return Err(CommitError::PeriodOutOfRange(new_period_ms));
    }
    // Round up to the next boundary aligned with the current epoch so the
    // proposal always passes the alignment check in `validate`.
    let earliest_us = now_sync_us + cfg.mode_commit_safety_margin_us;
    let period_us = (current_epoch.period_ms as i64) * 1000;
    let since_epoch = earliest_us - current_epoch.epoch_us;
    let periods_elapsed = (since_epoch + period_us - 1).div_euclid(period_us);
    let leader_effective_us = current_epoch.epoch_us + periods_elapsed * period_us;
    let follower_effective_us = leader_effective_us + (new_period_ms as i64) * 1000 / 2;

    Ok(ModeProposal {
        new_mode,
        new_period_ms,
        new_active_ms,
        leader_effective_us: leader_effective_us as u64,
        follower_effective_us: follower_effective_us as u64,
    })
}

/// Follower-side validation (§4.4 step 3): both effective times must be
/// in the future, and `leader_effective` must align with the current
/// epoch to within tolerance (an integer multiple of the old period from
/// the old epoch).
pub fn validate(
    proposal: &ModeProposal,
    now_sync_us: i64,
    current_epoch: &PatternEpoch,
    cfg: &Config,
) -> Result<(), CommitError> {
    if proposal.leader_effective_us as i64 <= now_sync_us
        || proposal.follower_effective_us as i64 <= now_sync_us
    {
        return Err(CommitError::StaleEffectiveTime);
    }

    let period_us = (current_epoch.period_ms as i64) * 1000;
    let delta = proposal.leader_effective_us as i64 - current_epoch.epoch_us;
    let remainder = delta.rem_euclid(period_us);
    let distance_to_multiple = remainder.min(period_us - remainder);
    if distance_to_multiple > cfg.mode_commit_alignment_tolerance_us {
        return Err(CommitError::Misaligned);
    }

    Ok(())
}

pub fn to_leader_armed(proposal: &ModeProposal) -> ArmedChange {
    ArmedChange {
        new_mode: proposal.new_mode,
        new_period_ms: proposal.new_period_ms,
        new_duty_percent: duty_from_active_ms(proposal.new_active_ms, proposal.new_period_ms),
        effective_us: proposal.leader_effective_us as i64,
    }
}

/// The Follower installs the new epoch at the same moment as the Leader
/// (`leader_effective_us`): antiphase is preserved by `cycle_position_us`'s
/// role offset against that shared epoch, not by installing a second,
/// separately-timed epoch. `follower_effective_us` exists for validation
/// only (§4.4 step 3 sanity check that the antiphase math is consistent).
pub fn to_follower_armed(proposal: &ModeProposal) -> ArmedChange {
    ArmedChange {
        new_mode: proposal.new_mode,
        new_period_ms: proposal.new_period_ms,
        new_duty_percent: duty_from_active_ms(proposal.new_active_ms, proposal.new_period_ms),
        effective_us: proposal.leader_effective_us as i64,
    }
}

fn duty_from_active_ms(active_ms: u32, period_ms: u32) -> u8 {
    if period_ms == 0 {
        return 0;
    }
    // active_ms is the active half-cycle length; duty is expressed against
    // the half period per the scheduler's `(p/2) * (duty/100)` formula.
    let half_period_ms = period_ms / 2;
    if half_period_ms == 0 {
        return 0;
    }
    ((active_ms as u64 * 100) / half_period_ms as u64).min(100) as u8
}
