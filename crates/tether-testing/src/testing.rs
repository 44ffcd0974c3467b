use std::rc::Rc;

use tether_core::{
    CleanupError, ElementId, FlushReport, IdleOutcome, IdleReport, ObjectKey, Runtime,
    RuntimeConfig, Subscriber, Tracked, Unbounded,
};

use crate::clock::{ManualClock, StepDeadline};
use crate::doubles::{RecordingGraph, RecordingView, TestSubscriber};

/// Routes `log` output through the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Headless harness for exercising the lifecycle runtime in tests.
///
/// `LifecycleTestRule` owns a [`Runtime`] whose dependency graph is a
/// [`RecordingGraph`], plus a [`ManualClock`] for idle budgets. It exposes
/// helpers for the common moves of a test: tracking objects, registering
/// subscribers and owning views, reporting destroyed elements, and driving
/// render passes or idle time.
pub struct LifecycleTestRule {
    runtime: Runtime,
    graph: Rc<RecordingGraph>,
    clock: ManualClock,
}

impl LifecycleTestRule {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        init_logging();
        let graph = Rc::new(RecordingGraph::new());
        let runtime = Runtime::builder()
            .config(config)
            .dependency_graph(graph.clone())
            .build();
        Self {
            runtime,
            graph,
            clock: ManualClock::new(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn graph(&self) -> &RecordingGraph {
        &self.graph
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Wraps `value` and registers it with the reference pool.
    pub fn track<T: 'static>(&self, value: T) -> (Tracked<T>, ObjectKey) {
        let tracked = Tracked::new(value);
        match self.runtime.reference_pool().get_or_create(&tracked) {
            Some(weak) => {
                let key = weak.key();
                (tracked, key)
            }
            None => panic!("a fresh object cannot belong to another pool"),
        }
    }

    /// Creates a subscriber with a fresh id and registers it.
    pub fn subscriber(&self) -> Rc<TestSubscriber> {
        let registry = self.runtime.identity_registry();
        let subscriber = Rc::new(TestSubscriber::new(registry.make_id()));
        let added = registry.add(&subscriber);
        assert!(added, "fresh id {} was already registered", subscriber.id());
        subscriber
    }

    /// Creates a view that owns `ids`.
    pub fn view_owning(&self, ids: &[ElementId]) -> Rc<RecordingView> {
        let view = Rc::new(RecordingView::new());
        view.knows(ids);
        for &id in ids {
            self.runtime.owners().register_owner(id, &view);
        }
        view
    }

    pub fn report_deleted(&self, ids: &[ElementId]) {
        self.runtime.deleted_nodes().report(ids);
    }

    pub fn render_pass(&self) -> FlushReport {
        self.runtime.begin_render_pass()
    }

    /// One idle opportunity that allows `steps` units of work.
    pub fn idle_steps(&self, steps: usize) -> IdleReport {
        self.runtime.run_idle_tasks(&StepDeadline::new(steps))
    }

    /// One idle opportunity measured on the rule's manual clock.
    pub fn idle_on_clock(&self) -> IdleReport {
        self.runtime.run_idle_for(&self.clock)
    }

    /// Runs unbounded idle passes until every idle step completes.
    pub fn pump_until_idle(&self) -> IdleReport {
        for _ in 0..100 {
            let report = self.runtime.run_idle_tasks(&Unbounded);
            if report.outcome == IdleOutcome::Completed {
                return report;
            }
        }
        panic!("pump_until_idle looped too many times!");
    }

    pub fn take_cleanup_errors(&self) -> Vec<CleanupError> {
        self.runtime.reference_pool().take_cleanup_errors()
    }

    #[track_caller]
    pub fn assert_no_cleanup_errors(&self) {
        let errors = self.take_cleanup_errors();
        assert!(errors.is_empty(), "unexpected cleanup errors: {errors:?}");
    }
}

impl Default for LifecycleTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `LifecycleTestRule`.
pub fn run_lifecycle_test<R>(f: impl FnOnce(&LifecycleTestRule) -> R) -> R {
    let rule = LifecycleTestRule::new();
    f(&rule)
}

#[cfg(test)]
#[path = "tests/testing_tests.rs"]
mod tests;
