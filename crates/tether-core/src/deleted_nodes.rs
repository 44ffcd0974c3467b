//! Deferred unregistration of elements destroyed by the render layer.
//!
//! The render layer reports destroyed element ids in batches. Nothing happens
//! to their bindings until the collector is flushed, either eagerly before the
//! next render pass or in bounded idle time. A flush resolves each id's
//! owning view, asks it to purge the id, and clears the id's bindings from
//! the dependency graph.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::bindings::DependencyGraph;
use crate::error::{call_guarded, CleanupError};
use crate::owners::OwnerResolver;
use crate::platform::{IdleDeadline, Unbounded};
use crate::ElementId;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Collecting,
    Flushing,
}

/// What a flush did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Ids whose bindings were cleared.
    pub processed: usize,
    /// Ids an owning view acknowledged purging.
    pub purged: usize,
    /// Ids without a live owning view.
    pub missing_owner: usize,
    /// Ids left pending because the deadline ran out.
    pub remaining: usize,
    pub errors: Vec<CleanupError>,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// Leaves `Flushing` on drop, even if a collaborator panicked mid-flush.
struct FlushGuard<'a> {
    collector: &'a DeletedNodeCollector,
}

impl<'a> FlushGuard<'a> {
    fn enter(collector: &'a DeletedNodeCollector) -> Self {
        collector.state.set(CollectorState::Flushing);
        Self { collector }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        let state = if self.collector.pending.borrow().is_empty() {
            CollectorState::Idle
        } else {
            CollectorState::Collecting
        };
        self.collector.state.set(state);
    }
}

/// Batches destroyed element ids and unregisters them lazily.
pub struct DeletedNodeCollector {
    pending: RefCell<VecDeque<ElementId>>,
    state: Cell<CollectorState>,
    resolver: Rc<dyn OwnerResolver>,
    graph: Rc<dyn DependencyGraph>,
}

impl fmt::Debug for DeletedNodeCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeletedNodeCollector")
            .field("state", &self.state.get())
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

impl DeletedNodeCollector {
    pub fn new(resolver: Rc<dyn OwnerResolver>, graph: Rc<dyn DependencyGraph>) -> Self {
        Self {
            pending: RefCell::new(VecDeque::new()),
            state: Cell::new(CollectorState::Idle),
            resolver,
            graph,
        }
    }

    pub fn state(&self) -> CollectorState {
        self.state.get()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Snapshot of the ids waiting to be flushed, oldest first.
    pub fn pending_ids(&self) -> Vec<ElementId> {
        self.pending.borrow().iter().copied().collect()
    }

    /// Queues destroyed element ids. Bindings are untouched until a flush.
    pub fn report(&self, ids: &[ElementId]) {
        if ids.is_empty() {
            return;
        }
        self.pending.borrow_mut().extend(ids.iter().copied());
        if self.state.get() == CollectorState::Idle {
            self.state.set(CollectorState::Collecting);
        }
        log::trace!("{} destroyed element ids reported", ids.len());
    }

    /// Processes every pending id, including ids reported while flushing.
    pub fn flush_now(&self) -> FlushReport {
        self.flush(&Unbounded)
    }

    /// Processes pending ids until `deadline` runs out. Unprocessed ids stay
    /// queued, in order, for the next opportunity.
    pub fn run_idle_tasks(&self, deadline: &dyn IdleDeadline) -> FlushReport {
        self.flush(deadline)
    }

    fn flush(&self, deadline: &dyn IdleDeadline) -> FlushReport {
        if self.state.get() == CollectorState::Flushing {
            log::debug!("flush requested while already flushing; ignored");
            return FlushReport {
                remaining: self.pending_len(),
                ..FlushReport::default()
            };
        }
        let mut report = FlushReport::default();
        if self.pending.borrow().is_empty() {
            self.state.set(CollectorState::Idle);
            return report;
        }

        let _guard = FlushGuard::enter(self);
        while deadline.has_time_remaining() {
            // Popped only once processed, so an unwinding collaborator leaves it queued.
            let next = self.pending.borrow().front().copied();
            let Some(id) = next else {
                break;
            };
            self.process(id, &mut report);
            self.pending.borrow_mut().pop_front();
        }
        report.remaining = self.pending_len();

        if report.remaining > 0 {
            log::trace!(
                "idle flush yielded: {} processed, {} remaining",
                report.processed,
                report.remaining
            );
        }
        report
    }

    fn process(&self, id: ElementId, report: &mut FlushReport) {
        match self.resolver.resolve_owner(id) {
            Some(view) => {
                match call_guarded(|| view.purge_deleted_id(id)) {
                    Ok(true) => report.purged += 1,
                    Ok(false) => log::debug!("owning view did not know element {id}"),
                    Err(message) => {
                        let error = CleanupError::OwnerPurgePanicked { id, message };
                        log::error!("{error}");
                        report.errors.push(error);
                    }
                }
                self.resolver.release_owner(id);
            }
            None => {
                report.missing_owner += 1;
                log::debug!("element {id} has no owning view; clearing bindings only");
            }
        }
        if let Err(message) = call_guarded(|| self.graph.clear_binding(id)) {
            let error = CleanupError::BindingReleasePanicked { id, message };
            log::error!("{error}");
            report.errors.push(error);
        }
        report.processed += 1;
    }
}

#[cfg(test)]
#[path = "tests/deleted_nodes_tests.rs"]
mod tests;
