//! Recording stand-ins for the collaborators of the lifecycle runtime.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use tether_core::{
    BindingGraph, DependencyGraph, ElementId, OwningView, ReusableComponent, Subscriber,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    Cleared(ElementId),
    ComputedReleased(ElementId),
    MonitorReleased(ElementId),
}

/// A [`BindingGraph`] that also logs every removal it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingGraph {
    bindings: BindingGraph,
    events: RefCell<Vec<GraphEvent>>,
}

impl RecordingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying graph, for recording dependencies.
    pub fn bindings(&self) -> &BindingGraph {
        &self.bindings
    }

    pub fn events(&self) -> Vec<GraphEvent> {
        self.events.borrow().clone()
    }

    pub fn take_events(&self) -> Vec<GraphEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Ids passed to `clear_binding`, in call order.
    pub fn cleared(&self) -> Vec<ElementId> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                GraphEvent::Cleared(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn released_computed(&self) -> Vec<ElementId> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                GraphEvent::ComputedReleased(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn released_monitors(&self) -> Vec<ElementId> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                GraphEvent::MonitorReleased(id) => Some(*id),
                _ => None,
            })
            .collect()
    }
}

impl DependencyGraph for RecordingGraph {
    fn clear_binding(&self, id: ElementId) {
        self.events.borrow_mut().push(GraphEvent::Cleared(id));
        self.bindings.clear_binding(id);
    }

    fn release_computed(&self, id: ElementId) {
        self.events.borrow_mut().push(GraphEvent::ComputedReleased(id));
        self.bindings.release_computed(id);
    }

    fn release_monitor(&self, id: ElementId) {
        self.events.borrow_mut().push(GraphEvent::MonitorReleased(id));
        self.bindings.release_monitor(id);
    }
}

/// Owning view that remembers which element ids it was asked to purge.
#[derive(Debug, Default)]
pub struct RecordingView {
    known: RefCell<BTreeSet<ElementId>>,
    purged: RefCell<Vec<ElementId>>,
    panic_on: Cell<Option<ElementId>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `ids` as elements this view created.
    pub fn knows(&self, ids: &[ElementId]) {
        self.known.borrow_mut().extend(ids.iter().copied());
    }

    /// Makes the purge of `id` panic.
    pub fn panic_on(&self, id: ElementId) {
        self.panic_on.set(Some(id));
    }

    pub fn purged(&self) -> Vec<ElementId> {
        self.purged.borrow().clone()
    }

    pub fn still_knows(&self, id: ElementId) -> bool {
        self.known.borrow().contains(&id)
    }
}

impl OwningView for RecordingView {
    fn purge_deleted_id(&self, id: ElementId) -> bool {
        if self.panic_on.get() == Some(id) {
            panic!("view refused to purge element {id}");
        }
        self.purged.borrow_mut().push(id);
        self.known.borrow_mut().remove(&id)
    }
}

/// Reusable component that counts detachments.
#[derive(Debug)]
pub struct TestComponent {
    reuse_key: String,
    element_id: Cell<ElementId>,
    resets: Cell<usize>,
}

impl TestComponent {
    pub fn new(reuse_key: impl Into<String>, element_id: ElementId) -> Self {
        Self {
            reuse_key: reuse_key.into(),
            element_id: Cell::new(element_id),
            resets: Cell::new(0),
        }
    }

    pub fn set_element_id(&self, id: ElementId) {
        self.element_id.set(id);
    }

    pub fn reset_count(&self) -> usize {
        self.resets.get()
    }
}

impl ReusableComponent for TestComponent {
    fn reuse_key(&self) -> &str {
        &self.reuse_key
    }

    fn element_id(&self) -> ElementId {
        self.element_id.get()
    }

    fn reset_attachment(&self) {
        self.resets.set(self.resets.get() + 1);
    }
}

impl Subscriber for TestComponent {
    fn id(&self) -> ElementId {
        self.element_id.get()
    }
}

/// Subscriber that logs the property names it is notified about.
#[derive(Debug)]
pub struct TestSubscriber {
    id: ElementId,
    notifications: RefCell<Vec<String>>,
}

impl TestSubscriber {
    pub fn new(id: ElementId) -> Self {
        Self {
            id,
            notifications: RefCell::new(Vec::new()),
        }
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.borrow().clone()
    }
}

impl Subscriber for TestSubscriber {
    fn id(&self) -> ElementId {
        self.id
    }

    fn on_property_changed(&self, property: &str) {
        self.notifications.borrow_mut().push(property.to_string());
    }
}
