//! Dependency graph between bindings and the tracked properties they read.
//!
//! A binding is anything identified by an [`ElementId`] that re-runs when a
//! property it read changes: an element's update function, a computed value,
//! or a monitor. The lifecycle runtime only ever *removes* bindings from the
//! graph; recording them belongs to the dependency-tracking layer.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;

use crate::collections::map::{HashMap, HashSet};
use crate::{ElementId, ObjectKey};

/// The removal side of the global dependency graph.
pub trait DependencyGraph {
    /// Drops every dependency recorded for `id`.
    fn clear_binding(&self, id: ElementId);

    /// Retires a computed binding along with its dependencies.
    fn release_computed(&self, id: ElementId);

    /// Retires a monitor binding along with its dependencies.
    fn release_monitor(&self, id: ElementId);
}

/// One observed property of a tracked object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyTarget {
    pub object: ObjectKey,
    pub property: Cow<'static, str>,
}

impl DependencyTarget {
    pub fn new(object: ObjectKey, property: impl Into<Cow<'static, str>>) -> Self {
        Self {
            object,
            property: property.into(),
        }
    }
}

#[derive(Default)]
struct GraphInner {
    targets_by_binding: HashMap<ElementId, HashSet<DependencyTarget>>,
    bindings_by_target: HashMap<DependencyTarget, HashSet<ElementId>>,
    computed: HashSet<ElementId>,
    monitors: HashSet<ElementId>,
}

impl GraphInner {
    fn clear(&mut self, id: ElementId) -> bool {
        let Some(targets) = self.targets_by_binding.remove(&id) else {
            return false;
        };
        for target in targets {
            if let Some(bindings) = self.bindings_by_target.get_mut(&target) {
                bindings.remove(&id);
                if bindings.is_empty() {
                    self.bindings_by_target.remove(&target);
                }
            }
        }
        true
    }
}

/// In-memory [`DependencyGraph`] used by the default runtime.
///
/// Bindings are indexed in both directions so clearing a binding is
/// proportional to the number of properties it read, not to the size of the
/// graph.
#[derive(Default)]
pub struct BindingGraph {
    inner: RefCell<GraphInner>,
}

impl fmt::Debug for BindingGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("BindingGraph")
            .field("bindings", &inner.targets_by_binding.len())
            .field("targets", &inner.bindings_by_target.len())
            .field("computed", &inner.computed.len())
            .field("monitors", &inner.monitors.len())
            .finish()
    }
}

impl BindingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_computed(&self, id: ElementId) {
        self.inner.borrow_mut().computed.insert(id);
    }

    pub fn register_monitor(&self, id: ElementId) {
        self.inner.borrow_mut().monitors.insert(id);
    }

    /// Records that `binding` read `target`.
    pub fn record_dependency(&self, binding: ElementId, target: DependencyTarget) {
        let mut inner = self.inner.borrow_mut();
        inner
            .bindings_by_target
            .entry(target.clone())
            .or_default()
            .insert(binding);
        inner
            .targets_by_binding
            .entry(binding)
            .or_default()
            .insert(target);
    }

    /// Bindings that read `target`, in ascending id order.
    pub fn dependents_of(&self, target: &DependencyTarget) -> Vec<ElementId> {
        let inner = self.inner.borrow();
        let mut ids: Vec<ElementId> = inner
            .bindings_by_target
            .get(target)
            .map(|bindings| bindings.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Whether `id` still has at least one recorded dependency.
    pub fn has_binding(&self, id: ElementId) -> bool {
        self.inner.borrow().targets_by_binding.contains_key(&id)
    }

    pub fn is_computed_live(&self, id: ElementId) -> bool {
        self.inner.borrow().computed.contains(&id)
    }

    pub fn is_monitor_live(&self, id: ElementId) -> bool {
        self.inner.borrow().monitors.contains(&id)
    }

    pub fn binding_count(&self) -> usize {
        self.inner.borrow().targets_by_binding.len()
    }
}

impl DependencyGraph for BindingGraph {
    fn clear_binding(&self, id: ElementId) {
        if !self.inner.borrow_mut().clear(id) {
            log::trace!("clear_binding({id}): no recorded dependencies");
        }
    }

    fn release_computed(&self, id: ElementId) {
        let mut inner = self.inner.borrow_mut();
        inner.computed.remove(&id);
        inner.clear(id);
    }

    fn release_monitor(&self, id: ElementId) {
        let mut inner = self.inner.borrow_mut();
        inner.monitors.remove(&id);
        inner.clear(id);
    }
}

/// Graph that records nothing. Useful for hosts that track dependencies
/// elsewhere and only need the lifecycle bookkeeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDependencyGraph;

impl DependencyGraph for NoopDependencyGraph {
    fn clear_binding(&self, _id: ElementId) {}

    fn release_computed(&self, _id: ElementId) {}

    fn release_monitor(&self, _id: ElementId) {}
}

#[cfg(test)]
#[path = "tests/bindings_tests.rs"]
mod tests;
