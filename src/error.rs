//! Error kinds and disposition, one enum per fallible subsystem so each
//! component's failure domain stays legible at the call site. None of
//! these carry an allocation, so the crate stays usable without `std`.

use core::fmt;

#[cfg(feature = "std")]
use crate::transport::TransportError;

/// Failures from the Sync Engine: handshake rejection, beacon validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// Handshake RTT was negative or exceeded the plausibility bound.
    ImplausibleRtt { rtt_us: i64 },
    /// Beacon CRC did not match its payload.
    CrcMismatch,
    /// Handshake retries exhausted without an accepted response.
    HandshakeExhausted,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::ImplausibleRtt { rtt_us } => {
                write!(f, "implausible handshake rtt: {} us", rtt_us)
            }
            SyncError::CrcMismatch => write!(f, "beacon crc mismatch"),
            SyncError::HandshakeExhausted => write!(f, "handshake retries exhausted"),
        }
    }
}

/// Failures from the Coordination Router: framing and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterError {
    /// Type tag did not match any known message type.
    UnknownType(u8),
    /// Declared/received length did not match the type's fixed length.
    LengthMismatch { expected: usize, actual: usize },
    /// Sequence number already processed for this message class; dropped.
    Duplicate { sequence: u8 },
    /// Early-arrival buffer slot was already occupied by another message
    /// of the same kind.
    BufferFull,
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::UnknownType(t) => write!(f, "unknown message type tag {}", t),
            RouterError::LengthMismatch { expected, actual } => {
                write!(f, "length mismatch: expected {}, got {}", expected, actual)
            }
            RouterError::Duplicate { sequence } => write!(f, "duplicate sequence {}", sequence),
            RouterError::BufferFull => write!(f, "early-arrival buffer slot occupied"),
        }
    }
}

/// Failures from Mode Commit proposal validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitError {
    /// A proposed effective time already lies in the past.
    StaleEffectiveTime,
    /// leader_effective was not an integer multiple of the current period
    /// from the current epoch, within tolerance.
    Misaligned,
    /// new_period was zero or exceeded the configured maximum.
    PeriodOutOfRange(u32),
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitError::StaleEffectiveTime => write!(f, "proposal effective time already past"),
            CommitError::Misaligned => write!(f, "proposal not aligned with current epoch"),
            CommitError::PeriodOutOfRange(p) => write!(f, "period {} ms out of range", p),
        }
    }
}

/// Failures from the Coordinator's message dispatch (§2, §4.5), layering
/// the per-subsystem enums above plus one condition unique to fan-out
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    Router(RouterError),
    Sync(SyncError),
    Commit(CommitError),
    /// A `TimeResponse` arrived with no outstanding `TimeRequest` to
    /// match it against.
    UnexpectedTimeResponse,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Router(e) => write!(f, "{}", e),
            DispatchError::Sync(e) => write!(f, "{}", e),
            DispatchError::Commit(e) => write!(f, "{}", e),
            DispatchError::UnexpectedTimeResponse => write!(f, "time response with no pending request"),
        }
    }
}

impl From<RouterError> for DispatchError {
    fn from(e: RouterError) -> Self {
        DispatchError::Router(e)
    }
}

impl From<SyncError> for DispatchError {
    fn from(e: SyncError) -> Self {
        DispatchError::Sync(e)
    }
}

impl From<CommitError> for DispatchError {
    fn from(e: CommitError) -> Self {
        DispatchError::Commit(e)
    }
}

/// A cross-thread accessor that could not take its lock within the
/// configured timeout returns this instead of blocking or panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeout;

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "possible contention: lock not acquired within timeout")
    }
}

/// Unifying error for the `std`-only CLI harness and integration tests.
#[cfg(feature = "std")]
#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    #[error("sync engine error: {0}")]
    Sync(SyncError),
    #[error("router error: {0}")]
    Router(RouterError),
    #[error("mode commit error: {0}")]
    Commit(CommitError),
    #[error("dispatch error: {0}")]
    Dispatch(DispatchError),
    #[error("{0}")]
    Lock(LockTimeout),
    #[error("transport not connected")]
    NotConnected,
}

#[cfg(feature = "std")]
impl From<SyncError> for CoordError {
    fn from(e: SyncError) -> Self {
        CoordError::Sync(e)
    }
}

#[cfg(feature = "std")]
impl From<RouterError> for CoordError {
    fn from(e: RouterError) -> Self {
        CoordError::Router(e)
    }
}

#[cfg(feature = "std")]
impl From<CommitError> for CoordError {
    fn from(e: CommitError) -> Self {
        CoordError::Commit(e)
    }
}

#[cfg(feature = "std")]
impl From<DispatchError> for CoordError {
    fn from(e: DispatchError) -> Self {
        CoordError::Dispatch(e)
    }
}

#[cfg(feature = "std")]
impl From<LockTimeout> for CoordError {
    fn from(e: LockTimeout) -> Self {
        CoordError::Lock(e)
    }
}

#[cfg(feature = "std")]
impl From<TransportError> for CoordError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NotConnected => CoordError::NotConnected,
        }
    }
}
