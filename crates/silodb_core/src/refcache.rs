//! Per-operation reference caches.
//!
//! Every top-level save or load owns a fresh cache; the cache is what makes
//! traversal of circular object graphs terminate and what makes diamond
//! references resolve to a single object.

use crate::types::{Oid, Tid};
use std::collections::HashMap;

/// Save-side cache: arena index of a node already being saved in this
/// operation, mapped to the OID it received.
///
/// A node is entered the moment its OID is known, before its sub-objects
/// are visited; a back-reference reaching it mid-save gets the OID instead
/// of recursing forever.
#[derive(Debug, Default)]
pub struct SaveCache {
    entries: HashMap<usize, Oid>,
}

impl SaveCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a node already visited in this operation.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Oid> {
        self.entries.get(&index).copied()
    }

    /// Records a node's assigned OID.
    pub fn insert(&mut self, index: usize, oid: Oid) {
        self.entries.insert(index, oid);
    }
}

/// Load-side cache: persisted identity mapped to the arena index it was
/// materialized at in this operation.
///
/// An object reached through two paths (or through a cycle) materializes
/// once; every further reference resolves to the same index.
#[derive(Debug, Default)]
pub struct LoadCache {
    entries: HashMap<(Tid, Oid), usize>,
}

impl LoadCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an identity already materialized in this operation.
    #[must_use]
    pub fn get(&self, tid: Tid, oid: Oid) -> Option<usize> {
        self.entries.get(&(tid, oid)).copied()
    }

    /// Records where an identity was materialized.
    pub fn insert(&mut self, tid: Tid, oid: Oid, index: usize) {
        self.entries.insert((tid, oid), index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_cache_round_trip() {
        let mut cache = SaveCache::new();
        assert_eq!(cache.get(0), None);
        cache.insert(0, Oid::new(7));
        assert_eq!(cache.get(0), Some(Oid::new(7)));
    }

    #[test]
    fn load_cache_keyed_by_type_and_oid() {
        let mut cache = LoadCache::new();
        cache.insert(Tid::new(1), Oid::new(3), 0);
        assert_eq!(cache.get(Tid::new(1), Oid::new(3)), Some(0));
        assert_eq!(cache.get(Tid::new(2), Oid::new(3)), None);
    }
}
