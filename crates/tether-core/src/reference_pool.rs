//! Canonical weak references and per-object cleanup records.
//!
//! Every object handed to the [`ReferencePool`] gets exactly one arena slot,
//! addressed by a generation-checked [`ObjectKey`], and exactly one
//! [`CleanupRecord`] in that slot. The record collects the computed and
//! monitor bindings created against the object plus arbitrary tagged cleanup
//! callbacks.
//!
//! The owning handle of a tracked object is [`Tracked<T>`]. When its last
//! clone is dropped the pool receives a collection notification for the key:
//! the bindings are released from the [`DependencyGraph`] and every tagged
//! callback runs once. The notification only ever sees the key; the object
//! itself is already gone.
//!
//! Slots are freed on collection and reused with a bumped generation, so a
//! stale key can never address the record of a newer object.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use crate::bindings::DependencyGraph;
use crate::collections::map::{HashMap, HashSet};
use crate::collections::IdList;
use crate::error::{run_guarded, CleanupError};
use crate::identity::Subscriber;
use crate::ElementId;

/// Stable handle of a tracked object inside its [`ReferencePool`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    index: u32,
    generation: u32,
}

impl ObjectKey {
    #[cfg(test)]
    pub(crate) fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}v{}", self.index, self.generation)
    }
}

/// Objects that know which computed and monitor bindings currently depend
/// on them. Consulted by [`ReferencePool::sync_computed_and_monitor_ids`].
pub trait BindingSource {
    fn computed_ids(&self) -> IdList;

    fn monitor_ids(&self) -> IdList;
}

type TagCallback = Box<dyn FnOnce() + 'static>;

/// Cleanup bookkeeping for one tracked object.
#[derive(Default)]
pub struct CleanupRecord {
    computed_ids: HashSet<ElementId>,
    monitor_ids: HashSet<ElementId>,
    tag_callbacks: HashMap<String, TagCallback>,
}

impl fmt::Debug for CleanupRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupRecord")
            .field("computed_ids", &self.computed_ids)
            .field("monitor_ids", &self.monitor_ids)
            .field("tags", &self.tag_callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn sorted(ids: &HashSet<ElementId>) -> Vec<ElementId> {
    let mut ids: Vec<ElementId> = ids.iter().copied().collect();
    ids.sort_unstable();
    ids
}

struct PoolSlot {
    generation: u32,
    record: Option<CleanupRecord>,
}

type IdReader = Box<dyn Fn() -> Option<(IdList, IdList)>>;

struct PendingSync {
    key: ObjectKey,
    read_ids: IdReader,
}

pub(crate) struct PoolInner {
    slots: RefCell<Vec<PoolSlot>>,
    free: RefCell<Vec<u32>>,
    pending_syncs: RefCell<Vec<PendingSync>>,
    graph: Rc<dyn DependencyGraph>,
    collected: Cell<u64>,
    errors: RefCell<Vec<CleanupError>>,
}

impl PoolInner {
    fn allocate(&self) -> ObjectKey {
        let mut slots = self.slots.borrow_mut();
        if let Some(index) = self.free.borrow_mut().pop() {
            let slot = &mut slots[index as usize];
            slot.record = Some(CleanupRecord::default());
            return ObjectKey {
                index,
                generation: slot.generation,
            };
        }
        let index = slots.len() as u32;
        slots.push(PoolSlot {
            generation: 0,
            record: Some(CleanupRecord::default()),
        });
        ObjectKey {
            index,
            generation: 0,
        }
    }

    fn with_record<R>(&self, key: ObjectKey, f: impl FnOnce(&mut CleanupRecord) -> R) -> Option<R> {
        let mut slots = self.slots.borrow_mut();
        let slot = slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.record.as_mut().map(f)
    }

    fn take_record(&self, key: ObjectKey) -> Option<CleanupRecord> {
        let mut slots = self.slots.borrow_mut();
        let slot = slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.borrow_mut().push(key.index);
        Some(record)
    }

    fn release_guarded(&self, id: ElementId, release: impl FnOnce(&dyn DependencyGraph)) {
        if let Err(message) = run_guarded(|| release(&*self.graph)) {
            let error = CleanupError::BindingReleasePanicked { id, message };
            log::error!("{error}");
            self.errors.borrow_mut().push(error);
        }
    }

    /// Collection notification for `key`.
    fn collect(&self, key: ObjectKey) {
        let Some(record) = self.take_record(key) else {
            log::debug!("collection notification for unknown {key}");
            return;
        };
        self.pending_syncs
            .borrow_mut()
            .retain(|pending| pending.key != key);
        self.collected.set(self.collected.get() + 1);

        let CleanupRecord {
            computed_ids,
            monitor_ids,
            tag_callbacks,
        } = record;

        for id in sorted(&computed_ids) {
            self.release_guarded(id, |graph| graph.release_computed(id));
        }
        for id in sorted(&monitor_ids) {
            self.release_guarded(id, |graph| graph.release_monitor(id));
        }

        let mut callbacks: Vec<(String, TagCallback)> = tag_callbacks.into_iter().collect();
        callbacks.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (tag, callback) in callbacks {
            if let Err(message) = run_guarded(callback) {
                let error = CleanupError::TagCallbackPanicked {
                    key,
                    tag,
                    message,
                };
                log::error!("{error}");
                self.errors.borrow_mut().push(error);
            }
        }
        log::trace!(
            "collected {key}: {} computed, {} monitors released",
            computed_ids.len(),
            monitor_ids.len()
        );
    }
}

struct Registration {
    key: ObjectKey,
    pool: Weak<PoolInner>,
}

pub(crate) struct TrackedCell<T> {
    value: T,
    registration: OnceCell<Registration>,
}

impl<T> Drop for TrackedCell<T> {
    fn drop(&mut self) {
        if let Some(registration) = self.registration.get() {
            if let Some(pool) = registration.pool.upgrade() {
                pool.collect(registration.key);
            }
        }
    }
}

impl<S: Subscriber> Subscriber for TrackedCell<S> {
    fn id(&self) -> ElementId {
        self.value.id()
    }

    fn on_property_changed(&self, property: &str) {
        self.value.on_property_changed(property);
    }

    fn on_properties_changed(&self, properties: &[&str]) {
        self.value.on_properties_changed(properties);
    }
}

/// Owning handle of an object whose lifetime the runtime tracks.
///
/// Clones share the object. Dropping the last clone is the object's
/// collection: if it was registered with a [`ReferencePool`], its cleanup
/// record is retired right there.
pub struct Tracked<T: 'static> {
    inner: Rc<TrackedCell<T>>,
}

impl<T: 'static> Tracked<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(TrackedCell {
                value,
                registration: OnceCell::new(),
            }),
        }
    }

    /// The object's key, once a pool has registered it.
    pub fn key(&self) -> Option<ObjectKey> {
        self.inner.registration.get().map(|registration| registration.key)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    pub(crate) fn cell(&self) -> &Rc<TrackedCell<T>> {
        &self.inner
    }
}

impl<T: 'static> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("key", &self.key())
            .field("value", &self.inner.value)
            .finish()
    }
}

/// The canonical weak reference of a tracked object.
///
/// Two references obtained for the same object compare equal.
pub struct PooledWeakRef<T: 'static> {
    key: ObjectKey,
    target: Weak<TrackedCell<T>>,
}

impl<T: 'static> PooledWeakRef<T> {
    pub fn key(&self) -> ObjectKey {
        self.key
    }

    pub fn upgrade(&self) -> Option<Tracked<T>> {
        self.target.upgrade().map(|inner| Tracked { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }
}

impl<T: 'static> Clone for PooledWeakRef<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            target: Weak::clone(&self.target),
        }
    }
}

impl<T: 'static> PartialEq for PooledWeakRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Weak::ptr_eq(&self.target, &other.target)
    }
}

impl<T: 'static> Eq for PooledWeakRef<T> {}

impl<T: 'static> fmt::Debug for PooledWeakRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledWeakRef")
            .field("key", &self.key)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Arena of cleanup records keyed by object identity.
#[derive(Clone)]
pub struct ReferencePool {
    inner: Rc<PoolInner>,
}

impl fmt::Debug for ReferencePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferencePool")
            .field("tracked", &self.tracked_count())
            .field("pending_syncs", &self.inner.pending_syncs.borrow().len())
            .field("collected", &self.inner.collected.get())
            .finish()
    }
}

impl ReferencePool {
    pub fn new(graph: Rc<dyn DependencyGraph>) -> Self {
        Self {
            inner: Rc::new(PoolInner {
                slots: RefCell::new(Vec::new()),
                free: RefCell::new(Vec::new()),
                pending_syncs: RefCell::new(Vec::new()),
                graph,
                collected: Cell::new(0),
                errors: RefCell::new(Vec::new()),
            }),
        }
    }

    fn ensure_registered<'a, T: 'static>(&self, obj: &'a Tracked<T>) -> &'a Registration {
        obj.inner.registration.get_or_init(|| {
            let key = self.inner.allocate();
            log::trace!("tracking {key}");
            Registration {
                key,
                pool: Rc::downgrade(&self.inner),
            }
        })
    }

    /// Key of `obj` in this pool, registering it on first use.
    ///
    /// Returns `None` when the object already belongs to another pool.
    fn local_key<T: 'static>(&self, obj: &Tracked<T>) -> Option<ObjectKey> {
        let registration = self.ensure_registered(obj);
        if registration.pool.as_ptr() == Rc::as_ptr(&self.inner) {
            Some(registration.key)
        } else {
            log::warn!("{} is tracked by another reference pool", registration.key);
            None
        }
    }

    /// Returns the canonical weak reference of `obj`, creating its cleanup
    /// record and arming its collection notification on the first call.
    ///
    /// Returns `None` when the object already belongs to another pool; its
    /// key would address an unrelated record here.
    pub fn get_or_create<T: 'static>(&self, obj: &Tracked<T>) -> Option<PooledWeakRef<T>> {
        let key = self.local_key(obj)?;
        Some(PooledWeakRef {
            key,
            target: Rc::downgrade(&obj.inner),
        })
    }

    /// Attaches `callback` under `tag`; an existing callback for the tag is
    /// dropped without running. Returns `false` if `obj` belongs to another pool.
    pub fn register_tag_callback<T: 'static>(
        &self,
        obj: &Tracked<T>,
        tag: impl Into<String>,
        callback: impl FnOnce() + 'static,
    ) -> bool {
        let Some(key) = self.local_key(obj) else {
            return false;
        };
        let tag = tag.into();
        let callback: TagCallback = Box::new(callback);
        let replaced = self
            .inner
            .with_record(key, |record| record.tag_callbacks.insert(tag, callback));
        // Dropped outside the borrow: the old closure may own tracked handles.
        drop(replaced);
        true
    }

    /// Detaches the callback registered under `tag` without running it.
    pub fn remove_tag_callback<T: 'static>(&self, obj: &Tracked<T>, tag: &str) -> bool {
        let Some(key) = self.local_key(obj) else {
            return false;
        };
        let removed = self
            .inner
            .with_record(key, |record| record.tag_callbacks.remove(tag))
            .flatten();
        removed.is_some()
    }

    /// Records a monitor binding. Returns `false` if it was already recorded.
    pub fn add_monitor_id<T: 'static>(&self, obj: &Tracked<T>, id: ElementId) -> bool {
        self.local_key(obj)
            .and_then(|key| {
                self.inner
                    .with_record(key, |record| record.monitor_ids.insert(id))
            })
            .unwrap_or(false)
    }

    pub fn clear_monitor_id<T: 'static>(&self, obj: &Tracked<T>, id: ElementId) -> bool {
        self.local_key(obj)
            .and_then(|key| {
                self.inner
                    .with_record(key, |record| record.monitor_ids.remove(&id))
            })
            .unwrap_or(false)
    }

    /// Records a computed binding. Returns `false` if it was already recorded.
    pub fn add_computed_id<T: 'static>(&self, obj: &Tracked<T>, id: ElementId) -> bool {
        self.local_key(obj)
            .and_then(|key| {
                self.inner
                    .with_record(key, |record| record.computed_ids.insert(id))
            })
            .unwrap_or(false)
    }

    /// Schedules a merge of the object's current computed and monitor ids
    /// into its record. The merge happens on the next
    /// [`drain_pending_syncs`](Self::drain_pending_syncs); repeated requests
    /// before that coalesce.
    pub fn sync_computed_and_monitor_ids<T: BindingSource + 'static>(&self, obj: &Tracked<T>) {
        let Some(key) = self.local_key(obj) else {
            return;
        };
        let mut pending = self.inner.pending_syncs.borrow_mut();
        if pending.iter().any(|entry| entry.key == key) {
            return;
        }
        let target = Rc::downgrade(&obj.inner);
        pending.push(PendingSync {
            key,
            read_ids: Box::new(move || {
                target
                    .upgrade()
                    .map(|cell| (cell.value.computed_ids(), cell.value.monitor_ids()))
            }),
        });
    }

    pub fn has_pending_syncs(&self) -> bool {
        !self.inner.pending_syncs.borrow().is_empty()
    }

    /// Runs every scheduled binding sync. Objects collected since they were
    /// scheduled are skipped. Returns the number of records updated.
    pub fn drain_pending_syncs(&self) -> usize {
        let pending = std::mem::take(&mut *self.inner.pending_syncs.borrow_mut());
        let mut merged = 0;
        for entry in pending {
            let Some((computed, monitors)) = (entry.read_ids)() else {
                continue;
            };
            let updated = self.inner.with_record(entry.key, |record| {
                record.computed_ids.extend(computed.iter().copied());
                record.monitor_ids.extend(monitors.iter().copied());
            });
            if updated.is_some() {
                merged += 1;
            }
        }
        merged
    }

    pub fn is_tracked(&self, key: ObjectKey) -> bool {
        self.inner.with_record(key, |_| ()).is_some()
    }

    pub fn tracked_count(&self) -> usize {
        self.inner
            .slots
            .borrow()
            .iter()
            .filter(|slot| slot.record.is_some())
            .count()
    }

    pub fn computed_ids(&self, key: ObjectKey) -> Vec<ElementId> {
        self.inner
            .with_record(key, |record| sorted(&record.computed_ids))
            .unwrap_or_default()
    }

    pub fn monitor_ids(&self, key: ObjectKey) -> Vec<ElementId> {
        self.inner
            .with_record(key, |record| sorted(&record.monitor_ids))
            .unwrap_or_default()
    }

    pub fn tag_count(&self, key: ObjectKey) -> usize {
        self.inner
            .with_record(key, |record| record.tag_callbacks.len())
            .unwrap_or(0)
    }

    /// Number of collection notifications processed so far.
    pub fn collected_count(&self) -> u64 {
        self.inner.collected.get()
    }

    /// Drains the callback failures recorded by collection notifications.
    pub fn take_cleanup_errors(&self) -> Vec<CleanupError> {
        std::mem::take(&mut *self.inner.errors.borrow_mut())
    }
}

#[cfg(test)]
#[path = "tests/reference_pool_tests.rs"]
mod tests;
