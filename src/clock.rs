//! Monotonic clock abstraction (external interface `local_clock()`).
//!
//! All methods are monotonic and relative to the same unknown epoch on a
//! single node. Cross-node comparisons only ever go through the Sync
//! Engine's offset estimate, never directly.

pub trait Clock {
    /// Microsecond ticks since some unknown epoch.
    fn now_us(&self) -> i64;
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use core::sync::atomic::{AtomicI64, Ordering};

    /// A clock driven entirely by test code, for deterministic simulation.
    pub struct MockClock(pub AtomicI64);

    impl MockClock {
        pub fn new(start_us: i64) -> Self {
            Self(AtomicI64::new(start_us))
        }

        pub fn advance_us(&self, delta_us: i64) {
            self.0.fetch_add(delta_us, Ordering::SeqCst);
        }

        pub fn set_us(&self, value_us: i64) {
            self.0.store(value_us, Ordering::SeqCst);
        }
    }

    impl super::Clock for MockClock {
        fn now_us(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod test {
    use super::mock::MockClock;
    use super::Clock;

    #[test]
    fn advances_monotonically() {
        let c = MockClock::new(1_000);
        assert_eq!(c.now_us(), 1_000);
        c.advance_us(500);
        assert_eq!(c.now_us(), 1_500);
    }
}
