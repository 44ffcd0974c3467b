//! Component reuse through the recycle pool and the identity registry.
use std::rc::Rc;

use tether_core::{RecyclePool, ReusableComponent};
use tether_testing::prelude::*;

fn component(rule: &LifecycleTestRule, key: &str) -> Rc<TestComponent> {
    let registry = rule.runtime().identity_registry();
    let component = Rc::new(TestComponent::new(key, registry.make_id()));
    assert!(registry.add(&component));
    component
}

#[test]
fn acquire_is_last_in_first_out() {
    let rule = LifecycleTestRule::new();
    let mut pool: RecyclePool<TestComponent> = RecyclePool::new();
    let a = component(&rule, "row");
    let b = component(&rule, "row");

    pool.retire("row", a.clone());
    pool.retire("row", b.clone());

    assert!(Rc::ptr_eq(&pool.acquire("row").expect("b"), &b));
    assert!(Rc::ptr_eq(&pool.acquire("row").expect("a"), &a));
    assert!(pool.acquire("row").is_none());
}

#[test]
fn remapping_an_old_id_again_leaves_no_dangling_entry() {
    let mut pool: RecyclePool<TestComponent> = RecyclePool::new();

    pool.remap_id(1, 2);
    assert_eq!(pool.resolve_id(1), 2);
    assert_eq!(pool.resolve_id(2), 2);

    pool.remap_id(1, 3);
    assert_eq!(pool.resolve_id(1), 3);
    assert_eq!(pool.resolve_id(3), 3);
    assert_eq!(pool.resolve_id(2), 2);
    assert_eq!(pool.remap_len(), 1);
}

#[test]
fn reused_component_moves_to_its_new_id() {
    let rule = LifecycleTestRule::new();
    let registry = rule.runtime().identity_registry();
    let mut pool: RecyclePool<TestComponent> = RecyclePool::new();
    let original = component(&rule, "cell");
    let old_id = original.element_id();
    pool.retire("cell", original);

    let new_id = registry.make_id();
    let reused = rule
        .runtime()
        .acquire_recycled(&mut pool, "cell", new_id)
        .expect("retired cell");
    reused.set_element_id(new_id);

    assert_eq!(pool.resolve_id(old_id), new_id);
    assert!(!registry.has(old_id));
    assert!(registry.has(new_id));

    assert_eq!(pool.consume_remap(new_id), Some((old_id, new_id)));
    assert_eq!(pool.resolve_id(old_id), old_id);
}

#[test]
fn purge_all_detaches_every_retired_instance() {
    let rule = LifecycleTestRule::new();
    let mut pool: RecyclePool = RecyclePool::new();
    let header = component(&rule, "header");
    let rows = [component(&rule, "row"), component(&rule, "row")];
    pool.retire("header", header.clone());
    for row in &rows {
        pool.retire("row", row.clone());
    }

    let report = pool.purge_all();

    assert_eq!(report.reset, 3);
    assert_eq!(header.reset_count(), 1);
    assert!(rows.iter().all(|row| row.reset_count() == 1));
    assert!(pool.is_empty());
}

#[test]
fn bounded_pool_detaches_overflow() {
    let rule = LifecycleTestRule::new();
    let mut pool: RecyclePool<TestComponent> = RecyclePool::with_capacity_per_key(1);
    let first = component(&rule, "row");
    let second = component(&rule, "row");

    pool.retire("row", first.clone());
    pool.retire("row", second.clone());

    assert_eq!(first.reset_count(), 1);
    assert_eq!(second.reset_count(), 0);
    assert_eq!(pool.len(), 1);
}
