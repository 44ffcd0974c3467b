//! Standard runtime services for `tether-core`.
//!
//! Provides a wall clock for idle-time budgets and a [`StdRuntime`] that
//! pairs it with a [`Runtime`], so hosts can hand spare frame time to the
//! lifecycle machinery with a single call.

use std::fmt;

use tether_core::{Clock, IdleReport, Runtime, RuntimeConfig, RuntimeHandle};
use web_time::{Duration, Instant};

/// Clock implementation backed by [`web_time`], which is [`std::time`] on
/// native targets and `performance.now()` on the web.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn elapsed_millis(&self, since: Self::Instant) -> u64 {
        since.elapsed().as_millis() as u64
    }
}

impl StdClock {
    /// Returns the elapsed time as a [`Duration`] for convenience.
    pub fn elapsed(&self, since: Instant) -> Duration {
        since.elapsed()
    }
}

/// A [`Runtime`] driven by the wall clock.
#[derive(Clone)]
pub struct StdRuntime {
    clock: StdClock,
    runtime: Runtime,
}

impl StdRuntime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            clock: StdClock,
            runtime: Runtime::with_config(config),
        }
    }

    /// Wraps an already configured runtime.
    pub fn from_runtime(runtime: Runtime) -> Self {
        Self {
            clock: StdClock,
            runtime,
        }
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime.clone()
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn clock(&self) -> StdClock {
        self.clock
    }

    /// Spends at most the configured idle budget on deferred cleanup.
    pub fn run_idle(&self) -> IdleReport {
        let report = self.runtime.run_idle_for(&self.clock);
        if !report.flush.errors.is_empty() {
            log::warn!(
                "{} cleanup failures during idle flush",
                report.flush.errors.len()
            );
        }
        report
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("clock", &self.clock)
            .field("runtime", &self.runtime)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/std_runtime_tests.rs"]
mod tests;
