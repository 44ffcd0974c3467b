//! Pool of retired component instances kept for reuse.
//!
//! Retired instances are stacked per reuse key and handed back
//! most-recently-retired first. When an instance re-enters the live tree
//! under a new element id, the pool remembers the old ↔ new association
//! until the remap has been consumed, so late lookups of the old id still
//! land on the instance.

use std::fmt;
use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::error::{run_guarded, CleanupError};
use crate::ElementId;

/// A component instance that can be parked and reattached later.
pub trait ReusableComponent {
    fn reuse_key(&self) -> &str;

    /// The element id the instance is currently registered under.
    fn element_id(&self) -> ElementId;

    /// Detaches the instance from whatever tree it was attached to.
    fn reset_attachment(&self);
}

/// Bidirectional old-id ↔ new-id table. The new id is the canonical side.
#[derive(Debug, Default, Clone)]
pub struct IdRemapTable {
    old_to_new: HashMap<ElementId, ElementId>,
    new_to_old: HashMap<ElementId, ElementId>,
}

impl IdRemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `old ↔ new` after evicting every entry that mentions either id.
    pub fn insert(&mut self, old: ElementId, new: ElementId) {
        self.evict(old);
        self.evict(new);
        self.old_to_new.insert(old, new);
        self.new_to_old.insert(new, old);
    }

    fn evict(&mut self, id: ElementId) {
        if let Some(new) = self.old_to_new.remove(&id) {
            self.new_to_old.remove(&new);
        }
        if let Some(old) = self.new_to_old.remove(&id) {
            self.old_to_new.remove(&old);
        }
    }

    /// The canonical id for `id`: the new id if `id` is either side of an
    /// entry, `id` itself otherwise.
    pub fn resolve(&self, id: ElementId) -> ElementId {
        self.old_to_new.get(&id).copied().unwrap_or(id)
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.old_to_new.contains_key(&id) || self.new_to_old.contains_key(&id)
    }

    /// Removes the entry mentioning `id`, returning it as `(old, new)`.
    pub fn remove(&mut self, id: ElementId) -> Option<(ElementId, ElementId)> {
        if let Some(new) = self.old_to_new.remove(&id) {
            self.new_to_old.remove(&new);
            return Some((id, new));
        }
        let old = self.new_to_old.remove(&id)?;
        self.old_to_new.remove(&old);
        Some((old, id))
    }

    /// Drops entries whose new id is no longer live.
    pub fn retain_live(&mut self, mut is_live: impl FnMut(ElementId) -> bool) -> usize {
        let before = self.old_to_new.len();
        let new_to_old = &mut self.new_to_old;
        self.old_to_new.retain(|_, new| {
            if is_live(*new) {
                true
            } else {
                new_to_old.remove(new);
                false
            }
        });
        before - self.old_to_new.len()
    }

    pub fn len(&self) -> usize {
        self.old_to_new.len()
    }

    pub fn is_empty(&self) -> bool {
        self.old_to_new.is_empty()
    }
}

/// What [`RecyclePool::purge_all`] did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub reset: usize,
    pub errors: Vec<CleanupError>,
}

/// Per-subtree pool of retired component instances.
///
/// Only [`retire`](Self::retire) and [`acquire`](Self::acquire) move
/// instances in and out, so an instance is never both live and pooled.
pub struct RecyclePool<C: ?Sized + ReusableComponent = dyn ReusableComponent> {
    stacks: HashMap<String, Vec<Rc<C>>>,
    remaps: IdRemapTable,
    capacity_per_key: Option<usize>,
    eviction_errors: Vec<CleanupError>,
}

impl<C: ?Sized + ReusableComponent> fmt::Debug for RecyclePool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stacks: Vec<(&str, usize)> = self
            .stacks
            .iter()
            .map(|(key, stack)| (key.as_str(), stack.len()))
            .collect();
        stacks.sort_unstable();
        f.debug_struct("RecyclePool")
            .field("stacks", &stacks)
            .field("remaps", &self.remaps.len())
            .field("capacity_per_key", &self.capacity_per_key)
            .field("eviction_errors", &self.eviction_errors.len())
            .finish()
    }
}

impl<C: ?Sized + ReusableComponent> Default for RecyclePool<C> {
    fn default() -> Self {
        Self {
            stacks: HashMap::default(),
            remaps: IdRemapTable::default(),
            capacity_per_key: None,
            eviction_errors: Vec::new(),
        }
    }
}

fn reset_guarded<C: ?Sized + ReusableComponent>(
    instance: &C,
    errors: &mut Vec<CleanupError>,
) -> bool {
    match run_guarded(|| instance.reset_attachment()) {
        Ok(()) => true,
        Err(message) => {
            let error = CleanupError::ResetAttachmentPanicked {
                reuse_key: instance.reuse_key().to_string(),
                message,
            };
            log::error!("{error}");
            errors.push(error);
            false
        }
    }
}

impl<C: ?Sized + ReusableComponent> RecyclePool<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool that keeps at most `capacity` instances per reuse key. Retiring
    /// past the limit detaches and drops the oldest instance of that key.
    pub fn with_capacity_per_key(capacity: usize) -> Self {
        Self {
            capacity_per_key: Some(capacity),
            ..Self::default()
        }
    }

    fn is_pooled(&self, instance: &Rc<C>) -> bool {
        self.stacks
            .values()
            .any(|stack| stack.iter().any(|pooled| Rc::ptr_eq(pooled, instance)))
    }

    /// Parks `instance` under `reuse_key`. Returns `false` if the instance
    /// is already pooled.
    ///
    /// Failures to detach instances evicted by the capacity limit are kept
    /// for [`take_eviction_errors`](Self::take_eviction_errors).
    pub fn retire(&mut self, reuse_key: &str, instance: Rc<C>) -> bool {
        if self.is_pooled(&instance) {
            log::warn!("instance for '{reuse_key}' is already retired");
            return false;
        }
        let stack = self.stacks.entry(reuse_key.to_string()).or_default();
        stack.push(instance);

        let overflow = match self.capacity_per_key {
            Some(capacity) if stack.len() > capacity => stack.len() - capacity,
            _ => 0,
        };
        let evicted: Vec<Rc<C>> = stack.drain(..overflow).collect();
        for instance in &evicted {
            log::debug!("recycle pool for '{reuse_key}' is full; evicting oldest instance");
            reset_guarded(&**instance, &mut self.eviction_errors);
        }
        true
    }

    /// Drains the detach failures of evicted instances.
    pub fn take_eviction_errors(&mut self) -> Vec<CleanupError> {
        std::mem::take(&mut self.eviction_errors)
    }

    /// Takes the most recently retired instance for `reuse_key`.
    pub fn acquire(&mut self, reuse_key: &str) -> Option<Rc<C>> {
        let stack = self.stacks.get_mut(reuse_key)?;
        let instance = stack.pop();
        if stack.is_empty() {
            self.stacks.remove(reuse_key);
        }
        instance
    }

    pub fn remap_id(&mut self, old_id: ElementId, new_id: ElementId) {
        self.remaps.insert(old_id, new_id);
    }

    pub fn resolve_id(&self, id: ElementId) -> ElementId {
        self.remaps.resolve(id)
    }

    /// Removes the remap entry mentioning `id` once the caller has acted on it.
    pub fn consume_remap(&mut self, id: ElementId) -> Option<(ElementId, ElementId)> {
        self.remaps.remove(id)
    }

    /// Drops remap entries whose new id is no longer live.
    pub fn sweep_stale_remaps(&mut self, is_live: impl FnMut(ElementId) -> bool) -> usize {
        self.remaps.retain_live(is_live)
    }

    /// Detaches every retired instance and empties the pool. The report
    /// also carries eviction errors not yet taken.
    pub fn purge_all(&mut self) -> PurgeReport {
        let mut stacks: Vec<(String, Vec<Rc<C>>)> =
            std::mem::take(&mut self.stacks).into_iter().collect();
        stacks.sort_by(|(a, _), (b, _)| a.cmp(b));
        self.remaps = IdRemapTable::default();

        let mut report = PurgeReport {
            errors: self.take_eviction_errors(),
            ..PurgeReport::default()
        };
        for (_, stack) in &stacks {
            for instance in stack.iter().rev() {
                if reset_guarded(&**instance, &mut report.errors) {
                    report.reset += 1;
                }
            }
        }
        report
    }

    /// Total number of retired instances.
    pub fn len(&self) -> usize {
        self.stacks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn len_for(&self, reuse_key: &str) -> usize {
        self.stacks.get(reuse_key).map_or(0, Vec::len)
    }

    /// Reuse keys with at least one retired instance, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.stacks.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn remap_len(&self) -> usize {
        self.remaps.len()
    }
}

#[cfg(test)]
#[path = "tests/recycle_tests.rs"]
mod tests;
