//! The clock capability: current time in nanoseconds since the epoch.
//!
//! The storage layer never calls `SystemTime::now()` directly so that TTL
//! and expiration logic can be driven by a fake clock in tests.

use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current wall-clock time, in nanoseconds since the Unix
/// epoch -- the unit the on-disk `expiration` field is stored in.
pub trait Clock: Send + Sync + 'static {
    /// Current time, in nanoseconds since the Unix epoch.
    fn now_nanos(&self) -> u64;
}

/// The real, OS-backed clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_nanos() as u64
    }
}

/// A controllable clock for deterministic TTL and expiration tests.
///
/// Exposed outside `#[cfg(test)]` so downstream crates (the storage
/// engine's own test suite) can depend on it without duplicating it.
pub mod test_util {
    use super::Clock;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// A clock whose value is set and advanced explicitly by the caller.
    #[derive(Default)]
    pub struct FakeClock(AtomicU64);

    impl FakeClock {
        /// Creates a fake clock starting at `start_nanos`.
        #[must_use]
        pub fn new(start_nanos: u64) -> Self {
            Self(AtomicU64::new(start_nanos))
        }

        /// Advances the clock by `nanos`.
        pub fn advance(&self, nanos: u64) {
            self.0.fetch_add(nanos, Ordering::SeqCst);
        }
    }

    impl Clock for FakeClock {
        fn now_nanos(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}
