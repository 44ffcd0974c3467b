//! Platform abstraction traits for idle-time scheduling.
//!
//! The lifecycle runtime never reads the wall clock itself. Hosts hand it an
//! [`IdleDeadline`] when the UI thread has spare time, and the runtime checks
//! that deadline between units of deferred work.

/// Provides timing information for the runtime.
pub trait Clock {
    /// Instant type produced by this clock implementation.
    type Instant: Copy;

    /// Returns the current instant.
    fn now(&self) -> Self::Instant;

    /// Returns the number of milliseconds elapsed since `since`.
    fn elapsed_millis(&self, since: Self::Instant) -> u64;
}

/// A bounded idle opportunity.
///
/// Implementations are consulted before every unit of idle work. Returning
/// `false` makes the caller stop and keep the remaining work for the next
/// opportunity.
pub trait IdleDeadline {
    fn has_time_remaining(&self) -> bool;
}

impl<D: IdleDeadline + ?Sized> IdleDeadline for &D {
    fn has_time_remaining(&self) -> bool {
        (**self).has_time_remaining()
    }
}

/// Deadline that never expires. Used by eager flushes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unbounded;

impl IdleDeadline for Unbounded {
    fn has_time_remaining(&self) -> bool {
        true
    }
}

/// An [`IdleDeadline`] measured against a [`Clock`] with a millisecond budget.
pub struct ClockDeadline<'a, C: Clock> {
    clock: &'a C,
    started: C::Instant,
    budget_millis: u64,
}

impl<'a, C: Clock> ClockDeadline<'a, C> {
    /// Starts a budget of `budget_millis` from the clock's current instant.
    pub fn start(clock: &'a C, budget_millis: u64) -> Self {
        Self {
            clock,
            started: clock.now(),
            budget_millis,
        }
    }

    pub fn budget_millis(&self) -> u64 {
        self.budget_millis
    }

    pub fn remaining_millis(&self) -> u64 {
        self.budget_millis
            .saturating_sub(self.clock.elapsed_millis(self.started))
    }
}

impl<C: Clock> IdleDeadline for ClockDeadline<'_, C> {
    fn has_time_remaining(&self) -> bool {
        self.clock.elapsed_millis(self.started) < self.budget_millis
    }
}

impl<C: Clock> std::fmt::Debug for ClockDeadline<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockDeadline")
            .field("budget_millis", &self.budget_millis)
            .finish()
    }
}
