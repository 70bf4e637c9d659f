//! [`Clock`] implementations: a real monotonic one and a deterministic
//! test double.

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::traits::Clock;

/// A [`Clock`] backed by [`std::time::Instant`], truncated to
/// milliseconds modulo `u32::MAX` to match the wire-level tick width.
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    /// A clock whose epoch is the moment of construction.
    #[must_use]
    pub fn new() -> Self {
        SystemClock {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn ticks_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    fn delay_ms(&self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// A [`Clock`] whose tick counter only advances when told to, for
/// deterministic RTO/timeout tests. `delay_ms` advances the counter by
/// the requested amount instead of sleeping.
#[derive(Debug, Default)]
pub struct TestClock {
    ticks: AtomicU32,
}

impl TestClock {
    /// A test clock starting at tick `0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starting at an explicit tick value, useful for exercising the
    /// `u32` wraparound boundary.
    #[must_use]
    pub fn starting_at(ticks: u32) -> Self {
        TestClock {
            ticks: AtomicU32::new(ticks),
        }
    }

    /// Advance the clock without sleeping.
    pub fn advance(&self, ms: u32) {
        self.ticks.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn ticks_ms(&self) -> u32 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn delay_ms(&self, ms: u32) {
        self.advance(ms);
    }
}
