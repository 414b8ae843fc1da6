//! Node state cache
//!
//! Positive and negative caching of decoded node states, keyed by entity id.
//!
//! ## Design Goals
//!
//! - **Explicit misses**: a known-absent id is a `Missing` entry, not a
//!   sentinel value
//! - **Entry-level atomicity**: every mutation is a single `DashMap` entry
//!   operation, so concurrent readers never see a torn entry
//! - **Never updated in place**: writes evict, and the next read goes back
//!   to the store
//!
//! ## Usage Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stowage_core::EntityId;
//! use stowage_persistence::cache::{CacheLookup, NodeStateCache};
//!
//! let cache: NodeStateCache<String> = NodeStateCache::new();
//! let id = EntityId::random();
//!
//! cache.mark_missing(id);
//! assert!(matches!(cache.lookup(&id), CacheLookup::Missing));
//!
//! cache.evict(&id);
//! cache.insert_if_absent(id, Arc::new("state".to_string()));
//! assert!(matches!(cache.lookup(&id), CacheLookup::Present(_)));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use stowage_core::EntityId;

/// A stored cache entry
#[derive(Debug)]
pub enum CacheEntry<T> {
    /// The id is known not to exist in the store
    Missing,
    Present(Arc<T>),
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        match self {
            CacheEntry::Missing => CacheEntry::Missing,
            CacheEntry::Present(v) => CacheEntry::Present(Arc::clone(v)),
        }
    }
}

/// Result of a cache lookup
#[derive(Debug)]
pub enum CacheLookup<T> {
    /// Nothing cached; the store must be consulted
    Absent,
    Missing,
    Present(Arc<T>),
}

/// Statistics about cache performance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub lookups: u64,
    /// Lookups answered from cache, positive or negative
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Calculate cache hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

/// Concurrent cache of node states
#[derive(Debug)]
pub struct NodeStateCache<T> {
    entries: DashMap<EntityId, CacheEntry<T>>,
    /// Bumped before every write-driven invalidation
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> Default for NodeStateCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodeStateCache<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn lookup(&self, id: &EntityId) -> CacheLookup<T> {
        let entry = self.entries.get(id).map(|e| e.value().clone());
        match entry {
            Some(CacheEntry::Missing) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Missing
            }
            Some(CacheEntry::Present(state)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Present(state)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Absent
            }
        }
    }

    /// Cache a loaded state unless another entry got there first
    ///
    /// Returns the entry now held for `id`.
    pub fn insert_if_absent(&self, id: EntityId, state: Arc<T>) -> CacheEntry<T> {
        self.entries
            .entry(id)
            .or_insert(CacheEntry::Present(state))
            .value()
            .clone()
    }

    /// Record a failed lookup, keeping any entry already present
    pub fn mark_missing(&self, id: EntityId) {
        self.entries.entry(id).or_insert(CacheEntry::Missing);
    }

    /// Current invalidation generation; read it before going to the store
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Cache the result of a store read started at `seen`
    ///
    /// Nothing is inserted if an invalidation happened since, so a read that
    /// raced a write never repopulates the cache with the old state.
    pub fn insert_loaded(&self, id: EntityId, state: Arc<T>, seen: u64) {
        if let Entry::Vacant(entry) = self.entries.entry(id) {
            if self.generation() == seen {
                entry.insert(CacheEntry::Present(state));
            }
        }
    }

    /// Negative counterpart of [`NodeStateCache::insert_loaded`]
    pub fn mark_missing_loaded(&self, id: EntityId, seen: u64) {
        if let Entry::Vacant(entry) = self.entries.entry(id) {
            if self.generation() == seen {
                entry.insert(CacheEntry::Missing);
            }
        }
    }

    /// Evict every id after a write
    pub fn invalidate<'a>(&self, ids: impl IntoIterator<Item = &'a EntityId>) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        for id in ids {
            self.entries.remove(id);
        }
    }

    /// Record a deletion, replacing any entry
    pub fn force_missing(&self, id: EntityId) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.insert(id, CacheEntry::Missing);
    }

    pub fn evict(&self, id: &EntityId) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            lookups: hits + misses,
            hits,
            misses,
            entries: self.entries.len(),
        }
    }
}
