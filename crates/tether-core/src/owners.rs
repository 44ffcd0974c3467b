//! Element id to owning view resolution.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::collections::map::HashMap;
use crate::ElementId;

/// A view that owns the update bookkeeping of the elements it created.
pub trait OwningView {
    /// Drops the dirty-render and update-function bookkeeping of a deleted
    /// element. Returns `false` if the view did not know `id`.
    fn purge_deleted_id(&self, id: ElementId) -> bool;
}

/// Finds the view that owns an element.
pub trait OwnerResolver {
    fn resolve_owner(&self, id: ElementId) -> Option<Rc<dyn OwningView>>;

    /// Forgets the owner of `id` once its deletion has been processed.
    fn release_owner(&self, _id: ElementId) {}
}

/// Default [`OwnerResolver`]: a map from element id to a weakly held view.
#[derive(Default)]
pub struct OwnerRegistry {
    owners: RefCell<HashMap<ElementId, Weak<dyn OwningView>>>,
}

impl fmt::Debug for OwnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerRegistry")
            .field("owners", &self.owners.borrow().len())
            .finish()
    }
}

impl OwnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `view` as the owner of `id`, replacing any previous owner.
    pub fn register_owner<V: OwningView + 'static>(&self, id: ElementId, view: &Rc<V>) {
        let view: Rc<dyn OwningView> = view.clone();
        let previous = self.owners.borrow_mut().insert(id, Rc::downgrade(&view));
        if previous.is_some_and(|previous| previous.strong_count() > 0) {
            log::debug!("element {id} changed owning view");
        }
    }

    pub fn unregister_owner(&self, id: ElementId) -> bool {
        self.owners.borrow_mut().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.owners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.borrow().is_empty()
    }
}

impl OwnerResolver for OwnerRegistry {
    fn resolve_owner(&self, id: ElementId) -> Option<Rc<dyn OwningView>> {
        let weak = self.owners.borrow().get(&id).cloned()?;
        weak.upgrade()
    }

    fn release_owner(&self, id: ElementId) {
        self.owners.borrow_mut().remove(&id);
    }
}
