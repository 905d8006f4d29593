//! Reader/writer-locked facade over [`ParameterMap`]
//!
//! Reads take the shared lock for one operation only and hand back owned
//! copies, so callers never hold the lock across I/O. Writes take the
//! exclusive lock for the whole operation, mutator included. Mutators must
//! not re-enter the map: the lock is not reentrant.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::map::ParameterMap;
use crate::parameter::{Parameter, ParameterPatch};

/// Thread-safe, cheaply cloneable handle to a shared parameter map
///
/// Clones share the same underlying map.
///
/// # Example
///
/// ```rust
/// use param_map::{LockedParameterMap, Parameter, ParameterPatch, Variant};
///
/// let map = LockedParameterMap::new();
/// map.insert(Parameter::new("/gain").with_values(vec![Variant::Float(0.0)]));
///
/// let other_handle = map.clone();
/// other_handle.update_attributes("/gain", &ParameterPatch::new().values(vec![Variant::Float(0.5)]));
///
/// assert_eq!(map.get("/gain").unwrap().values, vec![Variant::Float(0.5)]);
/// ```
#[derive(Clone, Default)]
pub struct LockedParameterMap {
    inner: Arc<RwLock<ParameterMap>>,
}

impl LockedParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing map
    pub fn from_map(map: ParameterMap) -> Self {
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    // ------------------------------------------------------------------
    // Shared (read) operations
    // ------------------------------------------------------------------

    /// Copy of the parameter at `destination`
    pub fn get(&self, destination: &str) -> Option<Parameter> {
        self.inner.read().get(destination).cloned()
    }

    pub fn has(&self, destination: &str) -> bool {
        self.inner.read().has(destination)
    }

    pub fn has_node(&self, addr: &str) -> bool {
        self.inner.read().has_node(addr)
    }

    pub fn existing_path(&self, prefix: &str) -> bool {
        self.inner.read().existing_path(prefix)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Wire type codes of the parameter at `destination`
    pub fn type_tags(&self, destination: &str) -> Option<String> {
        self.inner.read().get(destination).map(Parameter::type_tags)
    }

    pub fn children_names(&self, addr: &str) -> BTreeSet<String> {
        self.inner.read().children_names(addr)
    }

    pub fn has_children(&self, addr: &str) -> bool {
        self.inner.read().has_children(addr)
    }

    /// Byte-wise prefix subset, copied out of the lock
    pub fn filter(&self, prefix: &str) -> ParameterMap {
        self.inner.read().filter(prefix)
    }

    /// Full copy of the map
    pub fn snapshot(&self) -> ParameterMap {
        self.inner.read().clone()
    }

    pub fn destinations(&self) -> Vec<String> {
        self.inner.read().destinations().map(str::to_string).collect()
    }

    /// Run `f` under the shared lock
    ///
    /// `f` must not perform I/O or touch this map again.
    pub fn read<R>(&self, f: impl FnOnce(&ParameterMap) -> R) -> R {
        f(&self.inner.read())
    }

    // ------------------------------------------------------------------
    // Exclusive (write) operations
    // ------------------------------------------------------------------

    /// Add if absent; returns whether the map changed
    pub fn insert(&self, parameter: Parameter) -> bool {
        self.inner.write().insert(parameter)
    }

    /// Overwrite if present; returns whether the destination existed
    pub fn replace(&self, parameter: Parameter) -> bool {
        self.inner.write().replace(parameter)
    }

    pub fn upsert(&self, parameter: Parameter) -> bool {
        self.inner.write().upsert(parameter)
    }

    /// Apply `mutator` under the write lock and return a copy of the result
    pub fn update<F>(&self, destination: &str, mutator: F) -> Option<Parameter>
    where
        F: FnOnce(&mut Parameter),
    {
        self.inner.write().update(destination, mutator).cloned()
    }

    /// Apply a facet patch; returns the updated copy and whether it changed
    pub fn update_attributes(&self, destination: &str, patch: &ParameterPatch) -> Option<(Parameter, bool)> {
        let mut map = self.inner.write();
        let changed = map.update_attributes(destination, patch)?;
        map.get(destination).cloned().map(|p| (p, changed))
    }

    /// Subtree removal; returns removed destinations
    pub fn remove(&self, destination: &str) -> Vec<String> {
        self.inner.write().remove(destination)
    }

    pub fn merge(&self, other: ParameterMap) -> usize {
        self.inner.write().merge(other)
    }

    /// Swap in a whole new map in one exclusive step
    pub fn reset(&self, map: ParameterMap) {
        *self.inner.write() = map;
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Run `f` under the exclusive lock
    pub fn write<R>(&self, f: impl FnOnce(&mut ParameterMap) -> R) -> R {
        f(&mut self.inner.write())
    }
}

impl std::fmt::Debug for LockedParameterMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockedParameterMap")
            .field("parameter_count", &self.len())
            .finish()
    }
}
