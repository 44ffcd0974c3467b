use super::*;
use crate::collections::IdList;
use smallvec::smallvec;

#[derive(Default)]
struct LogGraph {
    calls: RefCell<Vec<String>>,
}

impl LogGraph {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }
}

impl DependencyGraph for LogGraph {
    fn clear_binding(&self, id: ElementId) {
        self.calls.borrow_mut().push(format!("clear:{id}"));
    }

    fn release_computed(&self, id: ElementId) {
        self.calls.borrow_mut().push(format!("computed:{id}"));
    }

    fn release_monitor(&self, id: ElementId) {
        self.calls.borrow_mut().push(format!("monitor:{id}"));
    }
}

fn pool() -> (ReferencePool, Rc<LogGraph>) {
    let graph = Rc::new(LogGraph::default());
    (ReferencePool::new(graph.clone()), graph)
}

struct Model {
    computed: RefCell<IdList>,
    monitors: RefCell<IdList>,
}

impl BindingSource for Model {
    fn computed_ids(&self) -> IdList {
        self.computed.borrow().clone()
    }

    fn monitor_ids(&self) -> IdList {
        self.monitors.borrow().clone()
    }
}

#[test]
fn get_or_create_returns_the_same_reference_every_time() {
    let (pool, _) = pool();
    let obj = Tracked::new(5);

    let first = pool.get_or_create(&obj).expect("tracked here");
    let second = pool.get_or_create(&obj).expect("tracked here");

    assert_eq!(first, second);
    assert_eq!(pool.tracked_count(), 1);
    assert_eq!(first.upgrade().map(|tracked| *tracked), Some(5));
}

#[test]
fn distinct_objects_get_distinct_references() {
    let (pool, _) = pool();
    let a = Tracked::new("a");
    let b = Tracked::new("a");

    assert_ne!(pool.get_or_create(&a), pool.get_or_create(&b));
    assert_eq!(pool.tracked_count(), 2);
}

#[test]
fn weak_reference_does_not_keep_the_object_alive() {
    let (pool, _) = pool();
    let obj = Tracked::new(String::from("label"));
    let weak = pool.get_or_create(&obj).expect("tracked here");

    assert!(weak.is_alive());
    drop(obj);

    assert!(!weak.is_alive());
    assert!(weak.upgrade().is_none());
    assert!(!pool.is_tracked(weak.key()));
}

#[test]
fn collection_releases_bindings_and_runs_callbacks_once() {
    let (pool, graph) = pool();
    let obj = Tracked::new(());
    let runs = Rc::new(Cell::new(0));

    pool.add_computed_id(&obj, 4);
    pool.add_computed_id(&obj, 2);
    pool.add_monitor_id(&obj, 9);
    let counter = runs.clone();
    pool.register_tag_callback(&obj, "listener", move || counter.set(counter.get() + 1));

    let clone = obj.clone();
    drop(obj);
    assert!(graph.take().is_empty(), "a live clone defers collection");

    drop(clone);
    assert_eq!(graph.take(), vec!["computed:2", "computed:4", "monitor:9"]);
    assert_eq!(runs.get(), 1);
    assert_eq!(pool.collected_count(), 1);
    assert_eq!(pool.tracked_count(), 0);
}

#[test]
fn add_ids_report_whether_they_were_new() {
    let (pool, _) = pool();
    let obj = Tracked::new(());
    let key = pool.get_or_create(&obj).expect("tracked here").key();

    assert!(pool.add_monitor_id(&obj, 3));
    assert!(!pool.add_monitor_id(&obj, 3));
    assert!(pool.add_computed_id(&obj, 3));
    assert!(!pool.add_computed_id(&obj, 3));

    assert_eq!(pool.monitor_ids(key), vec![3]);
    assert_eq!(pool.computed_ids(key), vec![3]);
}

#[test]
fn cleared_monitor_is_not_released_on_collection() {
    let (pool, graph) = pool();
    let obj = Tracked::new(());

    pool.add_monitor_id(&obj, 1);
    pool.add_monitor_id(&obj, 2);
    assert!(pool.clear_monitor_id(&obj, 1));
    assert!(!pool.clear_monitor_id(&obj, 1));

    drop(obj);
    assert_eq!(graph.take(), vec!["monitor:2"]);
}

#[test]
fn registering_a_tag_again_replaces_the_previous_callback() {
    let (pool, _) = pool();
    let obj = Tracked::new(());
    let log = Rc::new(RefCell::new(Vec::new()));

    let first = log.clone();
    pool.register_tag_callback(&obj, "layout", move || first.borrow_mut().push("first"));
    let second = log.clone();
    pool.register_tag_callback(&obj, "layout", move || second.borrow_mut().push("second"));

    let key = pool.get_or_create(&obj).expect("tracked here").key();
    assert_eq!(pool.tag_count(key), 1);

    drop(obj);
    assert_eq!(*log.borrow(), vec!["second"]);
}

#[test]
fn removed_tag_callback_never_runs() {
    let (pool, _) = pool();
    let obj = Tracked::new(());
    let ran = Rc::new(Cell::new(false));

    let flag = ran.clone();
    pool.register_tag_callback(&obj, "effect", move || flag.set(true));
    assert!(pool.remove_tag_callback(&obj, "effect"));
    assert!(!pool.remove_tag_callback(&obj, "effect"));

    drop(obj);
    assert!(!ran.get());
}

#[test]
fn callbacks_run_in_tag_order() {
    let (pool, _) = pool();
    let obj = Tracked::new(());
    let log = Rc::new(RefCell::new(Vec::new()));

    for tag in ["b", "c", "a"] {
        let log = log.clone();
        pool.register_tag_callback(&obj, tag, move || log.borrow_mut().push(tag));
    }

    drop(obj);
    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
}

#[test]
fn panicking_callback_does_not_stop_the_others() {
    let (pool, _) = pool();
    let obj = Tracked::new(());
    let key = pool.get_or_create(&obj).expect("tracked here").key();
    let ran = Rc::new(Cell::new(false));

    pool.register_tag_callback(&obj, "a-broken", || panic!("listener exploded"));
    let flag = ran.clone();
    pool.register_tag_callback(&obj, "b-fine", move || flag.set(true));

    drop(obj);

    assert!(ran.get());
    let errors = pool.take_cleanup_errors();
    assert_eq!(
        errors,
        vec![CleanupError::TagCallbackPanicked {
            key,
            tag: "a-broken".to_string(),
            message: "listener exploded".to_string(),
        }]
    );
    assert!(pool.take_cleanup_errors().is_empty());
}

#[test]
fn object_without_cleanup_data_is_collected_quietly() {
    let (pool, graph) = pool();
    let obj = Tracked::new(1u8);
    pool.get_or_create(&obj).expect("tracked here");

    drop(obj);

    assert!(graph.take().is_empty());
    assert_eq!(pool.collected_count(), 1);
}

#[test]
fn untracked_object_is_never_collected() {
    let (pool, _) = pool();
    let obj = Tracked::new(1u8);
    assert!(obj.key().is_none());

    drop(obj);
    assert_eq!(pool.collected_count(), 0);
}

#[test]
fn reused_slot_gets_a_new_generation() {
    let (pool, _) = pool();
    let first = Tracked::new(());
    let stale = pool.get_or_create(&first).expect("tracked here").key();
    drop(first);

    let second = Tracked::new(());
    let fresh = pool.get_or_create(&second).expect("tracked here").key();

    assert_eq!(stale.index(), fresh.index());
    assert_ne!(stale.generation(), fresh.generation());
    assert!(!pool.is_tracked(stale));
    assert!(pool.is_tracked(fresh));
    assert!(pool.computed_ids(stale).is_empty());
}

#[test]
fn objects_belong_to_the_first_pool_that_tracks_them() {
    let (home, _) = pool();
    let (other, other_graph) = pool();
    let obj = Tracked::new(());

    let key = home.get_or_create(&obj).expect("tracked here").key();
    assert!(!other.add_computed_id(&obj, 1));
    assert!(!other.register_tag_callback(&obj, "x", || {}));
    assert!(other.get_or_create(&obj).is_none());
    assert_eq!(obj.key(), Some(key));
    assert_eq!(other.tracked_count(), 0);

    drop(obj);
    assert!(other_graph.take().is_empty());
    assert_eq!(home.collected_count(), 1);
}

#[test]
fn sync_merges_current_ids_on_drain() {
    let (pool, graph) = pool();
    let obj = Tracked::new(Model {
        computed: RefCell::new(smallvec![1]),
        monitors: RefCell::new(smallvec![]),
    });
    let key = pool.get_or_create(&obj).expect("tracked here").key();

    pool.sync_computed_and_monitor_ids(&obj);
    obj.computed.borrow_mut().push(2);
    obj.monitors.borrow_mut().push(8);
    pool.sync_computed_and_monitor_ids(&obj);

    assert!(pool.computed_ids(key).is_empty(), "sync is deferred");
    assert!(pool.has_pending_syncs());
    assert_eq!(pool.drain_pending_syncs(), 1);
    assert!(!pool.has_pending_syncs());
    assert_eq!(pool.computed_ids(key), vec![1, 2]);
    assert_eq!(pool.monitor_ids(key), vec![8]);

    drop(obj);
    assert_eq!(graph.take(), vec!["computed:1", "computed:2", "monitor:8"]);
}

#[test]
fn pending_sync_of_collected_object_is_discarded() {
    let (pool, graph) = pool();
    let obj = Tracked::new(Model {
        computed: RefCell::new(smallvec![5]),
        monitors: RefCell::new(smallvec![6]),
    });

    pool.sync_computed_and_monitor_ids(&obj);
    drop(obj);

    assert!(!pool.has_pending_syncs());
    assert_eq!(pool.drain_pending_syncs(), 0);
    assert!(graph.take().is_empty());
}

#[test]
fn callback_may_drop_another_tracked_object() {
    let (pool, graph) = pool();
    let outer = Tracked::new(());
    let inner = Tracked::new(());
    pool.add_computed_id(&inner, 11);
    pool.add_computed_id(&outer, 10);

    let held = RefCell::new(Some(inner));
    pool.register_tag_callback(&outer, "owner", move || {
        held.borrow_mut().take();
    });

    drop(outer);
    assert_eq!(graph.take(), vec!["computed:10", "computed:11"]);
    assert_eq!(pool.tracked_count(), 0);
}

#[test]
fn callback_may_reenter_the_pool() {
    let (pool, _) = pool();
    let survivor = Tracked::new(());
    let doomed = Tracked::new(());

    let reentrant_pool = pool.clone();
    let target = survivor.clone();
    pool.register_tag_callback(&doomed, "handoff", move || {
        reentrant_pool.add_monitor_id(&target, 77);
    });

    drop(doomed);
    let key = pool.get_or_create(&survivor).expect("tracked here").key();
    assert_eq!(pool.monitor_ids(key), vec![77]);
}

#[test]
fn foreign_object_never_aliases_a_local_record() {
    let (home, _) = pool();
    let (other, _) = pool();
    let foreign = Tracked::new("x");
    let local = Tracked::new("y");
    home.get_or_create(&foreign).expect("tracked here");
    let local_key = other.get_or_create(&local).expect("tracked here").key();
    other.register_tag_callback(&local, "layout", || {});
    assert_eq!(foreign.key().map(|key| key.index()), Some(local_key.index()));

    assert!(other.get_or_create(&foreign).is_none());
    assert!(!other.remove_tag_callback(&foreign, "layout"));
    assert_eq!(other.tag_count(local_key), 1);

    drop(foreign);
    assert!(other.is_tracked(local_key));
    assert_eq!(other.collected_count(), 0);
}

/// Graph whose release calls panic for one id.
struct FragileGraph {
    fragile: ElementId,
    released: RefCell<Vec<ElementId>>,
}

impl DependencyGraph for FragileGraph {
    fn clear_binding(&self, _id: ElementId) {}

    fn release_computed(&self, id: ElementId) {
        if id == self.fragile {
            panic!("computed {id} is corrupt");
        }
        self.released.borrow_mut().push(id);
    }

    fn release_monitor(&self, id: ElementId) {
        self.released.borrow_mut().push(id);
    }
}

#[test]
fn panicking_release_does_not_stop_collection() {
    let graph = Rc::new(FragileGraph {
        fragile: 1,
        released: RefCell::new(Vec::new()),
    });
    let pool = ReferencePool::new(graph.clone());
    let obj = Tracked::new(());
    pool.add_computed_id(&obj, 1);
    pool.add_computed_id(&obj, 2);
    pool.add_monitor_id(&obj, 3);
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    pool.register_tag_callback(&obj, "effect", move || flag.set(true));

    drop(obj);

    assert!(ran.get());
    assert_eq!(*graph.released.borrow(), vec![2, 3]);
    assert_eq!(
        pool.take_cleanup_errors(),
        vec![CleanupError::BindingReleasePanicked {
            id: 1,
            message: "computed 1 is corrupt".to_string(),
        }]
    );
    assert_eq!(pool.tracked_count(), 0);
}
