//! Registry of subscribers keyed by element id.
//!
//! The registry only ever stores `Weak` references, so registering a
//! subscriber never extends its lifetime. A subscriber that has been dropped
//! is treated exactly like one that was never registered; its entry lingers
//! until it is deleted, replaced by a new registration, or swept.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::collections::map::HashMap;
use crate::reference_pool::Tracked;
use crate::ElementId;

/// Participant in dependency tracking.
///
/// Subscribers receive property-change notifications for the objects they
/// observe. Batched notifications default to one call per property.
pub trait Subscriber {
    fn id(&self) -> ElementId;

    fn on_property_changed(&self, _property: &str) {}

    fn on_properties_changed(&self, properties: &[&str]) {
        for property in properties {
            self.on_property_changed(property);
        }
    }
}

/// Allocator results [`IdentityRegistry::make_id`] tries before giving up on
/// the allocator.
pub const MAX_ALLOCATOR_ATTEMPTS: usize = 64;

/// Source of process-unique element ids.
pub trait IdAllocator {
    fn make_unique_id(&self) -> ElementId;
}

/// Allocator handing out increasing ids starting at a configurable seed.
#[derive(Debug)]
pub struct MonotonicIdAllocator {
    next: Cell<ElementId>,
}

impl MonotonicIdAllocator {
    pub fn starting_at(first: ElementId) -> Self {
        Self {
            next: Cell::new(first),
        }
    }
}

impl Default for MonotonicIdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdAllocator for MonotonicIdAllocator {
    fn make_unique_id(&self) -> ElementId {
        let id = self.next.get();
        self.next.set(id.wrapping_add(1));
        id
    }
}

/// Maps element ids to weakly held subscribers.
pub struct IdentityRegistry {
    allocator: Rc<dyn IdAllocator>,
    entries: RefCell<HashMap<ElementId, Weak<dyn Subscriber>>>,
}

impl fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("entries", &self.entries.borrow().len())
            .finish()
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new(Rc::new(MonotonicIdAllocator::default()))
    }
}

impl IdentityRegistry {
    pub fn new(allocator: Rc<dyn IdAllocator>) -> Self {
        Self {
            allocator,
            entries: RefCell::new(HashMap::default()),
        }
    }

    /// Issues a fresh id. Ids still held by an entry are skipped.
    ///
    /// After [`MAX_ALLOCATOR_ATTEMPTS`] registered ids in a row the allocator
    /// is abandoned for this call and the id past the largest entry is used.
    pub fn make_id(&self) -> ElementId {
        for _ in 0..MAX_ALLOCATOR_ATTEMPTS {
            let id = self.allocator.make_unique_id();
            if !self.entries.borrow().contains_key(&id) {
                return id;
            }
            log::warn!("id allocator returned {id}, which is still registered; skipping");
        }

        let entries = self.entries.borrow();
        let mut id = entries.keys().max().map_or(0, |max| max.wrapping_add(1));
        while entries.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        log::error!("id allocator kept returning registered ids; falling back to {id}");
        id
    }

    /// Registers `subscriber` under its own id.
    ///
    /// Fails without side effects if a live subscriber already holds the id.
    pub fn add<S: Subscriber + 'static>(&self, subscriber: &Rc<S>) -> bool {
        let subscriber: Rc<dyn Subscriber> = subscriber.clone();
        self.insert(subscriber.id(), Rc::downgrade(&subscriber))
    }

    /// Registers a tracked subscriber. Its entry expires with the last
    /// [`Tracked`] handle.
    pub fn add_tracked<S: Subscriber + 'static>(&self, subscriber: &Tracked<S>) -> bool {
        let cell: Rc<dyn Subscriber> = subscriber.cell().clone();
        self.insert(cell.id(), Rc::downgrade(&cell))
    }

    fn insert(&self, id: ElementId, weak: Weak<dyn Subscriber>) -> bool {
        let mut entries = self.entries.borrow_mut();
        if let Some(existing) = entries.get(&id) {
            if existing.strong_count() > 0 {
                log::warn!("subscriber id {id} is already registered");
                return false;
            }
        }
        entries.insert(id, weak);
        true
    }

    /// Looks up a live subscriber.
    pub fn find(&self, id: ElementId) -> Option<Rc<dyn Subscriber>> {
        let weak = self.entries.borrow().get(&id).cloned()?;
        weak.upgrade()
    }

    pub fn has(&self, id: ElementId) -> bool {
        self.entries
            .borrow()
            .get(&id)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Removes the entry for `id`, live or not.
    pub fn delete(&self, id: ElementId) -> bool {
        let removed = self.entries.borrow_mut().remove(&id);
        if removed.is_none() {
            log::debug!("delete({id}): not registered");
        }
        removed.is_some()
    }

    /// Moves a live entry from `old_id` to `new_id`.
    ///
    /// Fails if `old_id` has no live subscriber or if `new_id` is held by a
    /// different live subscriber.
    pub fn update_id(&self, old_id: ElementId, new_id: ElementId) -> bool {
        if old_id == new_id {
            return self.has(old_id);
        }
        let mut entries = self.entries.borrow_mut();
        let Some(weak) = entries.get(&old_id) else {
            log::debug!("update_id({old_id} -> {new_id}): {old_id} not registered");
            return false;
        };
        if weak.strong_count() == 0 {
            log::debug!("update_id({old_id} -> {new_id}): subscriber already dropped");
            return false;
        }
        if entries
            .get(&new_id)
            .is_some_and(|existing| existing.strong_count() > 0)
        {
            log::warn!("update_id({old_id} -> {new_id}): {new_id} is held by another subscriber");
            return false;
        }
        if let Some(weak) = entries.remove(&old_id) {
            entries.insert(new_id, weak);
        }
        true
    }

    /// Delivers a single property change. Returns `false` if no live
    /// subscriber holds `id`.
    pub fn notify_property_changed(&self, id: ElementId, property: &str) -> bool {
        match self.find(id) {
            Some(subscriber) => {
                subscriber.on_property_changed(property);
                true
            }
            None => false,
        }
    }

    pub fn notify_properties_changed(&self, id: ElementId, properties: &[&str]) -> bool {
        match self.find(id) {
            Some(subscriber) => {
                subscriber.on_properties_changed(properties);
                true
            }
            None => false,
        }
    }

    /// Removes entries whose subscriber has been dropped. Returns how many
    /// were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, weak| weak.strong_count() > 0);
        let swept = before - entries.len();
        if swept > 0 {
            log::trace!("swept {swept} expired subscriber entries");
        }
        swept
    }

    /// Number of entries, including ones whose subscriber was dropped.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;
