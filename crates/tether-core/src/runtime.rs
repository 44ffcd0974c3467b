use std::fmt;
use std::rc::{Rc, Weak};

use crate::bindings::{BindingGraph, DependencyGraph};
use crate::config::RuntimeConfig;
use crate::deleted_nodes::{DeletedNodeCollector, FlushReport};
use crate::identity::{IdAllocator, IdentityRegistry, MonotonicIdAllocator};
use crate::owners::{OwnerRegistry, OwnerResolver};
use crate::platform::{Clock, ClockDeadline, IdleDeadline};
use crate::recycle::{RecyclePool, ReusableComponent};
use crate::reference_pool::ReferencePool;
use crate::ElementId;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IdleOutcome {
    /// Every idle step ran to completion.
    Completed,
    /// The deadline ran out; leftover work waits for the next opportunity.
    Yielded,
}

/// What one idle opportunity achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleReport {
    pub outcome: IdleOutcome,
    pub flush: FlushReport,
    /// Cleanup records updated from pending binding syncs.
    pub synced: usize,
    /// Registry entries of dropped subscribers removed.
    pub swept: usize,
}

struct RuntimeInner {
    config: RuntimeConfig,
    graph: Rc<dyn DependencyGraph>,
    owners: Rc<OwnerRegistry>,
    references: ReferencePool,
    identities: IdentityRegistry,
    collector: DeletedNodeCollector,
}

/// The lifecycle context shared by everything running on one UI thread.
///
/// Cloning is cheap and yields another handle to the same state. Closures
/// stored inside the runtime (tag callbacks, for instance) should capture a
/// [`RuntimeHandle`] instead, so they don't keep the runtime alive.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("references", &self.inner.references)
            .field("identities", &self.inner.identities)
            .field("collector", &self.inner.collector)
            .field("owners", &self.inner.owners)
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn reference_pool(&self) -> &ReferencePool {
        &self.inner.references
    }

    pub fn identity_registry(&self) -> &IdentityRegistry {
        &self.inner.identities
    }

    pub fn deleted_nodes(&self) -> &DeletedNodeCollector {
        &self.inner.collector
    }

    /// The element → owning view map. It is the collector's resolver unless
    /// the runtime was built with a custom one.
    pub fn owners(&self) -> &OwnerRegistry {
        &self.inner.owners
    }

    pub fn dependency_graph(&self) -> Rc<dyn DependencyGraph> {
        Rc::clone(&self.inner.graph)
    }

    /// Eager cleanup before a render pass: every reported element is
    /// unregistered and, unless disabled, pending binding syncs are merged.
    pub fn begin_render_pass(&self) -> FlushReport {
        let report = self.inner.collector.flush_now();
        if self.inner.config.sync_on_render_pass {
            self.inner.references.drain_pending_syncs();
        }
        report
    }

    /// Runs deferred maintenance until `deadline` runs out: deleted element
    /// flushing first, then pending binding syncs, then the registry sweep.
    pub fn run_idle_tasks(&self, deadline: &dyn IdleDeadline) -> IdleReport {
        let mut report = IdleReport {
            outcome: IdleOutcome::Yielded,
            flush: self.inner.collector.run_idle_tasks(deadline),
            synced: 0,
            swept: 0,
        };
        if !report.flush.is_complete() {
            return report;
        }

        if self.inner.references.has_pending_syncs() {
            if !deadline.has_time_remaining() {
                return report;
            }
            report.synced = self.inner.references.drain_pending_syncs();
        }

        if self.inner.config.sweep_registry_on_idle {
            if !deadline.has_time_remaining() {
                return report;
            }
            report.swept = self.inner.identities.sweep_expired();
        }

        report.outcome = IdleOutcome::Completed;
        report
    }

    /// [`run_idle_tasks`](Self::run_idle_tasks) with the configured budget
    /// measured on `clock`.
    pub fn run_idle_for<C: Clock>(&self, clock: &C) -> IdleReport {
        let deadline = ClockDeadline::start(clock, self.inner.config.idle_budget_millis);
        self.run_idle_tasks(&deadline)
    }

    /// Pulls a retired instance back into the live tree under `new_id`.
    ///
    /// Records the old ↔ new remap in `pool` and moves the instance's
    /// registry entry. The instance is expected to adopt `new_id` itself.
    ///
    /// Returns `None`, leaving the instance pooled, when another live
    /// subscriber already holds `new_id`.
    pub fn acquire_recycled<C: ?Sized + ReusableComponent>(
        &self,
        pool: &mut RecyclePool<C>,
        reuse_key: &str,
        new_id: ElementId,
    ) -> Option<Rc<C>> {
        let instance = pool.acquire(reuse_key)?;
        let old_id = instance.element_id();
        if old_id != new_id {
            if self.inner.identities.has(new_id) {
                log::warn!(
                    "cannot reuse '{reuse_key}' as {new_id}: the id is held by a live subscriber"
                );
                pool.retire(reuse_key, instance);
                return None;
            }
            pool.remap_id(old_id, new_id);
            if !self.inner.identities.update_id(old_id, new_id) {
                log::debug!("recycled element {old_id} had no live registry entry");
            }
        }
        Some(instance)
    }

    /// Drops remap entries of `pool` whose new id has no live subscriber.
    pub fn sweep_recycle_remaps<C: ?Sized + ReusableComponent>(
        &self,
        pool: &mut RecyclePool<C>,
    ) -> usize {
        let identities = &self.inner.identities;
        pool.sweep_stale_remaps(|id| identities.has(id))
    }
}

/// Weak handle to a [`Runtime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Weak<RuntimeInner>,
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl RuntimeHandle {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.inner.upgrade().map(|inner| Runtime { inner })
    }

    /// Forwards destroyed element ids to the collector. Returns `false` if
    /// the runtime is gone.
    pub fn report_deleted(&self, ids: &[ElementId]) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                inner.collector.report(ids);
                true
            }
            None => false,
        }
    }
}

/// Builder for a [`Runtime`] with custom collaborators.
#[derive(Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    graph: Option<Rc<dyn DependencyGraph>>,
    resolver: Option<Rc<dyn OwnerResolver>>,
    allocator: Option<Rc<dyn IdAllocator>>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dependency_graph(mut self, graph: Rc<dyn DependencyGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn owner_resolver(mut self, resolver: Rc<dyn OwnerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn id_allocator(mut self, allocator: Rc<dyn IdAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn build(self) -> Runtime {
        let RuntimeBuilder {
            config,
            graph,
            resolver,
            allocator,
        } = self;
        let graph: Rc<dyn DependencyGraph> = match graph {
            Some(graph) => graph,
            None => Rc::new(BindingGraph::new()),
        };
        let owners = Rc::new(OwnerRegistry::new());
        let resolver: Rc<dyn OwnerResolver> = match resolver {
            Some(resolver) => resolver,
            None => owners.clone(),
        };
        let allocator: Rc<dyn IdAllocator> = match allocator {
            Some(allocator) => allocator,
            None => Rc::new(MonotonicIdAllocator::starting_at(config.first_element_id)),
        };

        Runtime {
            inner: Rc::new(RuntimeInner {
                references: ReferencePool::new(Rc::clone(&graph)),
                identities: IdentityRegistry::new(allocator),
                collector: DeletedNodeCollector::new(resolver, Rc::clone(&graph)),
                owners,
                graph,
                config,
            }),
        }
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
