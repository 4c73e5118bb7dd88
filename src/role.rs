//! Role Elector (§4.1): battery-based leader/follower assignment with a
//! deterministic tiebreak, plus connection-lifecycle tracking.

use crate::log::warn;
use crate::wire::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Unassigned,
    Leader,
    Follower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected { since_us: i64 },
}

/// Deterministic both-sides-agree leader/follower election: higher battery
/// wins; ties broken by the higher 6-byte node id (lexicographic compare).
pub fn elect(local_battery_pct: u8, peer_battery_pct: u8, local_id: NodeId, peer_id: NodeId) -> Role {
    let local_wins = match local_battery_pct.cmp(&peer_battery_pct) {
        core::cmp::Ordering::Greater => true,
        core::cmp::Ordering::Less => false,
        core::cmp::Ordering::Equal => local_id > peer_id,
    };
    if local_wins {
        Role::Leader
    } else {
        Role::Follower
    }
}

pub struct RoleElector {
    role: Role,
    connection: ConnectionState,
    /// Set by `on_connected` when a role swap invalidates the Pattern
    /// Epoch; the coordinator consumes and clears this.
    epoch_invalidated: bool,
}

impl RoleElector {
    pub fn new() -> Self {
        Self {
            role: Role::Unassigned,
            connection: ConnectionState::Idle,
            epoch_invalidated: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// `true` exactly once after a role swap, until consumed by the caller.
    pub fn take_epoch_invalidated(&mut self) -> bool {
        core::mem::replace(&mut self.epoch_invalidated, false)
    }

    /// Accepts a freshly (re-)established connection's elected role. If a
    /// prior session held the opposite role, flags the epoch for
    /// invalidation: a role swap means stale follower state from a
    /// previous leader is no longer authoritative.
    pub fn on_connected(&mut self, new_role: Role) {
        let swapped = !matches!(self.role, Role::Unassigned) && self.role != new_role;
        if swapped {
            warn!("role swap detected: was {:?}, now {:?}", self.role, new_role);
            self.epoch_invalidated = true;
        }
        self.role = new_role;
        self.connection = ConnectionState::Connected;
    }

    /// Transitions to Disconnected, recording the timestamp. Pattern
    /// Epoch, Clock Offset, and the filter estimate are deliberately left
    /// untouched here — they're owned by Sync Engine / Mode Commit and
    /// survive a disconnect until the safety timeout elapses.
    pub fn on_disconnected(&mut self, now_us: i64) {
        self.connection = ConnectionState::Disconnected { since_us: now_us };
    }

    /// `true` once `disconnect_timeout_s` has elapsed since disconnection;
    /// the caller is responsible for invalidating the Pattern Epoch and
    /// halting activation when this flips.
    pub fn disconnect_expired(&self, now_us: i64, timeout_s: u64) -> bool {
        match self.connection {
            ConnectionState::Disconnected { since_us } => {
                let elapsed_us = now_us.saturating_sub(since_us);
                elapsed_us >= (timeout_s as i64).saturating_mul(1_000_000)
            }
            _ => false,
        }
    }
}

impl Default for RoleElector {
    fn default() -> Self {
        Self::new()
    }
}
