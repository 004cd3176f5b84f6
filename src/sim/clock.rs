//! Millisecond time source for timers and routines.
//!
//! The controller reads the clock once per frame. Tests swap in a
//! [`ManualClock`] to step time deterministically.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

pub trait Clock: std::fmt::Debug {
    fn now_ms(&self) -> u64;
}

/// Monotonic wall clock. Starts at 1 so that 0 can mean "unset".
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64 + 1
    }
}

/// Shared, hand-driven clock. Clones observe the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        ManualClock {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(100);
        let view = clock.clone();
        clock.advance(50);
        assert_eq!(view.now_ms(), 150);
        view.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn system_clock_never_reports_zero() {
        assert!(SystemClock::new().now_ms() >= 1);
    }
}
