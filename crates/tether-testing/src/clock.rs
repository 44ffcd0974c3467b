//! Deterministic time sources for idle-budget tests.

use std::cell::Cell;

use tether_core::{Clock, IdleDeadline};

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_millis: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, millis: u64) {
        self.now_millis.set(self.now_millis.get() + millis);
    }

    pub fn now_millis(&self) -> u64 {
        self.now_millis.get()
    }
}

impl Clock for ManualClock {
    type Instant = u64;

    fn now(&self) -> u64 {
        self.now_millis.get()
    }

    fn elapsed_millis(&self, since: u64) -> u64 {
        self.now_millis.get().saturating_sub(since)
    }
}

/// Deadline that grants a fixed number of work units, one per check.
#[derive(Debug)]
pub struct StepDeadline {
    remaining: Cell<usize>,
    checks: Cell<usize>,
}

impl StepDeadline {
    pub fn new(steps: usize) -> Self {
        Self {
            remaining: Cell::new(steps),
            checks: Cell::new(0),
        }
    }

    /// Deadline that is already over.
    pub fn expired() -> Self {
        Self::new(0)
    }

    /// How many times the deadline has been consulted.
    pub fn checks(&self) -> usize {
        self.checks.get()
    }

    pub fn remaining(&self) -> usize {
        self.remaining.get()
    }
}

impl IdleDeadline for StepDeadline {
    fn has_time_remaining(&self) -> bool {
        self.checks.set(self.checks.get() + 1);
        let remaining = self.remaining.get();
        if remaining == 0 {
            return false;
        }
        self.remaining.set(remaining - 1);
        true
    }
}
