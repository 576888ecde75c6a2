//! Clock abstraction.
//!
//! Every deadline check in this crate (escrow expiry, coordinator timers,
//! eviction sweeps) goes through a [`Clock`] rather than calling
//! `SystemTime::now()` directly, so scenario tests (E1-E6, boundary timing
//! from §8) can advance time deterministically instead of sleeping in
//! real time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current unix time, in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time via `SystemTime`. Used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs()
    }
}

/// A settable clock for tests. Starts at an arbitrary fixed instant so tests
/// don't depend on the wall clock at all.
#[derive(Debug)]
pub struct TestClock {
    secs: AtomicU64,
}

impl TestClock {
    pub fn new(start_secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(start_secs),
        }
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_secs: u64) {
        self.secs.fetch_add(delta_secs, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let clock = TestClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now(), 1_500);
        clock.set(42);
        assert_eq!(clock.now(), 42);
    }

    #[test]
    fn system_clock_is_plausible() {
        // Sanity: should be after 2020-01-01 and before year 2100.
        let now = SystemClock.now();
        assert!(now > 1_577_836_800);
        assert!(now < 4_102_444_800);
    }
}
