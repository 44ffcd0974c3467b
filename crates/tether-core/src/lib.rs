#![doc = r"Object identity lifecycle for the Tether reactive UI runtime."]
//!
//! Four pieces cooperate on a single UI thread:
//!
//! * [`ReferencePool`] hands out one canonical weak reference per tracked
//!   object and retires the object's bindings and cleanup callbacks when its
//!   last [`Tracked`] handle is dropped.
//! * [`IdentityRegistry`] maps element ids to weakly held [`Subscriber`]s.
//! * [`DeletedNodeCollector`] batches element ids destroyed by the render
//!   layer and unregisters them before the next render pass or in idle time.
//! * [`RecyclePool`] parks retired component instances for reuse and keeps
//!   the old ↔ new element id association while they come back.
//!
//! [`Runtime`] wires them together around a shared [`DependencyGraph`].

mod bindings;
pub mod collections;
pub mod config;
mod deleted_nodes;
mod error;
mod identity;
mod owners;
pub mod platform;
mod recycle;
mod reference_pool;
pub mod runtime;

pub use bindings::{BindingGraph, DependencyGraph, DependencyTarget, NoopDependencyGraph};
pub use config::RuntimeConfig;
pub use deleted_nodes::{CollectorState, DeletedNodeCollector, FlushReport};
pub use error::CleanupError;
pub use identity::{
    IdAllocator, IdentityRegistry, MonotonicIdAllocator, Subscriber, MAX_ALLOCATOR_ATTEMPTS,
};
pub use owners::{OwnerRegistry, OwnerResolver, OwningView};
pub use platform::{Clock, ClockDeadline, IdleDeadline, Unbounded};
pub use recycle::{IdRemapTable, PurgeReport, RecyclePool, ReusableComponent};
pub use reference_pool::{
    BindingSource, CleanupRecord, ObjectKey, PooledWeakRef, ReferencePool, Tracked,
};
pub use runtime::{IdleOutcome, IdleReport, Runtime, RuntimeBuilder, RuntimeHandle};

/// Identifier of an element, binding, computed value or monitor.
pub type ElementId = usize;
