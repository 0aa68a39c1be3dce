//! Millisecond clock abstraction
//!
//! Every time-dependent component (learning debounce and timeout, retry
//! backoff, verification windows, record timestamps) reads time and waits
//! through [`Clock`]. On hardware this is a free-running millisecond counter
//! plus a busy-wait delay; in tests it is a [`ManualClock`] whose `delay`
//! simply advances the counter.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic millisecond time source with a blocking delay
pub trait Clock {
    /// Milliseconds since an arbitrary epoch (boot)
    fn now_millis(&self) -> u64;

    /// Block for `ms` milliseconds
    fn delay_ms(&self, ms: u64);

    /// Milliseconds elapsed since `since`
    fn elapsed_since(&self, since: u64) -> u64 {
        self.now_millis().saturating_sub(since)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }

    fn delay_ms(&self, ms: u64) {
        (**self).delay_ms(ms)
    }
}

impl<T: Clock + ?Sized> Clock for Rc<T> {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }

    fn delay_ms(&self, ms: u64) {
        (**self).delay_ms(ms)
    }
}

/// Wall-clock implementation backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
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
    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn delay_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// Manually driven clock for tests and simulation.
///
/// `delay_ms` advances time instead of sleeping, so bounded wait loops
/// terminate instantly while still observing their timeouts.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at `ms`
    pub fn starting_at(ms: u64) -> Self {
        Self { now: Cell::new(ms) }
    }

    /// Move time forward by `ms`
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    /// Jump to an absolute time
    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.get()
    }

    fn delay_ms(&self, ms: u64) {
        self.advance(ms);
    }
}
