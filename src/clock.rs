//! Time source for bounded waits.
//!
//! Every delay in the wake cycle goes through a [`Clock`], which keeps the
//! worst-case wake time auditable and lets tests run retry loops without
//! actually sleeping.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Milliseconds-since-wake clock with blocking sleep.
pub trait Clock {
    /// Milliseconds elapsed since the device woke.
    fn now_ms(&self) -> u64;

    /// Sleep for a fixed delay.
    fn sleep(&self, duration: Duration);

    /// Give the network stack a chance to service pending I/O.
    fn yield_now(&self) {}
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    wake: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { wake: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.wake.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    sleeps: Vec<Duration>,
    yields: u32,
}

/// Virtual clock: sleeping advances time instantly and is recorded.
///
/// Clones share the same timeline, so one handle can be given to the code
/// under test while another inspects it afterwards.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    state: Rc<RefCell<ManualState>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock that starts at a non-zero wake offset.
    pub fn starting_at(ms: u64) -> Self {
        let clock = Self::new();
        clock.advance(Duration::from_millis(ms));
        clock
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        self.state.borrow_mut().now += duration;
    }

    /// Number of sleeps performed so far.
    pub fn sleep_count(&self) -> usize {
        self.state.borrow().sleeps.len()
    }

    /// Every sleep performed, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.borrow().sleeps.clone()
    }

    /// Total time spent sleeping.
    pub fn total_slept(&self) -> Duration {
        self.state.borrow().sleeps.iter().sum()
    }

    pub fn yield_count(&self) -> u32 {
        self.state.borrow().yields
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.state.borrow().now.as_millis() as u64
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state.borrow_mut();
        state.now += duration;
        state.sleeps.push(duration);
    }

    fn yield_now(&self) {
        self.state.borrow_mut().yields += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shares_timeline() {
        let clock = ManualClock::starting_at(5);
        let handle = clock.clone();

        clock.sleep(Duration::from_millis(10));
        clock.sleep(Duration::from_millis(20));
        clock.yield_now();

        assert_eq!(handle.now_ms(), 35);
        assert_eq!(handle.sleep_count(), 2);
        assert_eq!(handle.total_slept(), Duration::from_millis(30));
        assert_eq!(handle.yield_count(), 1);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let before = clock.now_ms();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.now_ms() >= before + 1);
    }
}
