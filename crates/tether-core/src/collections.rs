#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
}

/// Inline storage for the short id lists that bindings usually produce.
pub type IdList = smallvec::SmallVec<[crate::ElementId; 4]>;
