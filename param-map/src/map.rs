//! Flat, address-indexed parameter collection
//!
//! The tree is never materialised. Entries live in a `BTreeMap` keyed by
//! destination, so every subtree is a contiguous key range and children are
//! recovered from string prefixes at read time.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use tracing::trace;

use crate::address::{self, ROOT};
use crate::parameter::{Parameter, ParameterPatch};

/// Description given to a freshly seeded root node
pub const ROOT_DESCRIPTION: &str = "root node";

/// Collection of parameters keyed uniquely by destination
///
/// A root entry at `/` always exists. Removing everything (root included)
/// reseeds a fresh root.
///
/// # Example
///
/// ```rust
/// use param_map::{Access, Parameter, ParameterMap, Variant};
///
/// let mut map = ParameterMap::new();
/// map.insert(
///     Parameter::new("/da/da")
///         .with_values(vec![Variant::Int(42)])
///         .with_access(Access::Set)
///         .with_tags(["wow", "much tag"]),
/// );
///
/// assert_eq!(map.get("/da/da").unwrap().values, vec![Variant::Int(42)]);
/// assert!(!map.has("/da"));
/// assert!(map.existing_path("/da"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMap {
    entries: BTreeMap<String, Parameter>,
}

impl ParameterMap {
    /// Map holding only the root node
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(ROOT.to_string(), Self::root_node());
        Self { entries }
    }

    /// Map with no entries at all, used as a scratch target by filters
    fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    fn root_node() -> Parameter {
        Parameter::new(ROOT).with_description(ROOT_DESCRIPTION)
    }

    /// Add `parameter` if its destination is absent
    ///
    /// Re-inserting an existing destination is a no-op and returns `false`.
    pub fn insert(&mut self, parameter: Parameter) -> bool {
        match self.entries.entry(parameter.destination.clone()) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(slot) => {
                slot.insert(parameter);
                true
            }
        }
    }

    /// Substitute the whole record at an existing destination
    ///
    /// Returns `false` and leaves the map untouched if the destination is
    /// absent.
    pub fn replace(&mut self, parameter: Parameter) -> bool {
        match self.entries.get_mut(&parameter.destination) {
            Some(slot) => {
                *slot = parameter;
                true
            }
            None => false,
        }
    }

    /// Insert or overwrite, returning whether the map changed
    pub fn upsert(&mut self, parameter: Parameter) -> bool {
        match self.entries.get_mut(&parameter.destination) {
            Some(slot) if *slot == parameter => false,
            Some(slot) => {
                *slot = parameter;
                true
            }
            None => {
                self.entries.insert(parameter.destination.clone(), parameter);
                true
            }
        }
    }

    /// Run `mutator` on the stored record at `destination`
    ///
    /// Returns the updated record, or `None` if the address is not stored.
    /// The map itself triggers no notification.
    pub fn update<F>(&mut self, destination: &str, mutator: F) -> Option<&Parameter>
    where
        F: FnOnce(&mut Parameter),
    {
        let slot = self.entries.get_mut(destination)?;
        mutator(slot);
        // Identity is the key; a mutator may not move the record
        slot.destination = destination.to_string();
        Some(slot)
    }

    /// Apply a facet patch at `destination`
    ///
    /// Returns `Some(changed)` if the address is stored.
    pub fn update_attributes(&mut self, destination: &str, patch: &ParameterPatch) -> Option<bool> {
        let slot = self.entries.get_mut(destination)?;
        Some(slot.apply(patch))
    }

    /// Remove every destination that starts with `destination`
    ///
    /// Matching is byte-wise like [`filter`](Self::filter), so removing
    /// "/a/b" also takes "/a/bc". Works for virtual container addresses
    /// too. If the map ends up empty, a fresh root is reseeded. Returns the
    /// removed destinations in order.
    pub fn remove(&mut self, destination: &str) -> Vec<String> {
        let removed: Vec<String> = self
            .subtree_range(destination)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &removed {
            self.entries.remove(key);
        }

        if self.entries.is_empty() {
            trace!("Map emptied by removing {}, reseeding root", destination);
            self.entries.insert(ROOT.to_string(), Self::root_node());
        }

        removed
    }

    /// Upsert every entry of `other`
    pub fn merge(&mut self, other: ParameterMap) -> usize {
        let mut changed = 0;
        for parameter in other.entries.into_values() {
            if self.upsert(parameter) {
                changed += 1;
            }
        }
        changed
    }

    /// Drop everything and reseed a fresh root
    pub fn clear(&mut self) {
        self.entries.clear();
        self.entries.insert(ROOT.to_string(), Self::root_node());
    }

    pub fn has(&self, destination: &str) -> bool {
        self.entries.contains_key(destination)
    }

    pub fn get(&self, destination: &str) -> Option<&Parameter> {
        self.entries.get(destination)
    }

    /// Whether `addr` is stored or is the parent of a stored destination
    ///
    /// Segment-aware, unlike [`existing_path`](Self::existing_path): with
    /// only "/dab" stored, "/da" is not a node.
    pub fn has_node(&self, addr: &str) -> bool {
        self.has(addr) || self.has_children(addr)
    }

    /// Whether any stored destination starts with `prefix`
    ///
    /// True for virtual container addresses implied by descendants.
    pub fn existing_path(&self, prefix: &str) -> bool {
        self.entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .next()
            .is_some_and(|(key, _)| key.starts_with(prefix))
    }

    /// New map holding the entries whose destination starts with `prefix`
    ///
    /// Byte-wise prefix match; no root is seeded into the result.
    pub fn filter(&self, prefix: &str) -> ParameterMap {
        let mut out = Self::empty();
        out.entries.extend(
            self.entries
                .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        out
    }

    /// Immediate child segment names beneath `addr`, deduplicated
    pub fn children_names(&self, addr: &str) -> BTreeSet<String> {
        self.subtree_range(addr)
            .filter_map(|(key, _)| address::relative(key, addr))
            .filter_map(|rel| address::segments(rel).next())
            .map(str::to_string)
            .collect()
    }

    /// Whether `addr` has at least one stored descendant
    pub fn has_children(&self, addr: &str) -> bool {
        self.subtree_range(addr)
            .any(|(key, _)| key != addr && address::is_descendant(key, addr))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Never true while the root invariant holds
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in lexicographic destination order
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.entries.values()
    }

    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Key range that can contain `addr` and its descendants
    fn subtree_range<'a>(&'a self, addr: &str) -> impl Iterator<Item = (&'a String, &'a Parameter)> + 'a {
        let prefix = addr.to_string();
        self.entries
            .range::<str, _>((Bound::Included(addr), Bound::Unbounded))
            .take_while(move |(key, _)| key.starts_with(prefix.as_str()))
    }
}

impl Default for ParameterMap {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IntoIterator for &'a ParameterMap {
    type Item = &'a Parameter;
    type IntoIter = btree_map::Values<'a, String, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}
