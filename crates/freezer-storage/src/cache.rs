//! Read-Through Group Cache
//!
//! Reads below the write buffer have to come from the remote store, one
//! group blob at a time. This cache remembers the last group fetched so that
//! a sequential scan pays one GET per group instead of one per record.
//!
//! ## How It Works
//!
//! ```text
//! ancient(seq=70), group_size=32
//!         ↓
//! cached group covers [64, 96)? ──YES──→ return cached[70 - 64]
//!         │
//!         NO
//!         ↓
//! GET blocks/000000002.json
//!         ↓
//! replace the slot with [64, 96)   (old group is dropped, never merged)
//! ```
//!
//! ## Single Slot
//!
//! The slot is an `ArcSwapOption`, so readers never take a lock. Every entry
//! is stamped with the truncation generation it was fetched under; a
//! Truncate that rewrites remote history bumps the generation, and entries
//! from an older generation are treated as misses even if a slow reader
//! stores one after the truncation finished.

use arc_swap::ArcSwapOption;
use freezer_core::AncientRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct CachedGroup {
    generation: u64,
    start: u64,
    records: Vec<AncientRecord>,
}

impl CachedGroup {
    fn lookup(&self, generation: u64, number: u64) -> Option<&AncientRecord> {
        if self.generation != generation || number < self.start {
            return None;
        }
        self.records.get((number - self.start) as usize)
    }
}

/// Single-slot cache of the most recently fetched group.
#[derive(Debug, Default)]
pub struct ReadCache {
    slot: ArcSwapOption<CachedGroup>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ReadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `number` among the cached group's records.
    pub fn get(&self, generation: u64, number: u64) -> Option<AncientRecord> {
        let found = self
            .slot
            .load()
            .as_ref()
            .and_then(|group| group.lookup(generation, number).cloned());

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            freezer_observability::metrics::CACHE_HITS_TOTAL.inc();
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            freezer_observability::metrics::CACHE_MISSES_TOTAL.inc();
        }
        found
    }

    /// Replace the cached group wholesale.
    pub fn replace(&self, generation: u64, start: u64, records: Vec<AncientRecord>) {
        tracing::debug!(start, len = records.len(), generation, "Cached group");
        self.slot.store(Some(Arc::new(CachedGroup {
            generation,
            start,
            records,
        })));
    }

    pub fn invalidate(&self) {
        self.slot.store(None);
    }

    pub fn stats(&self) -> CacheStats {
        let slot = self.slot.load();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            cached_start: slot.as_ref().map(|g| g.start),
            cached_len: slot.as_ref().map(|g| g.records.len()).unwrap_or(0),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,

    /// First sequence number of the cached group, if any
    pub cached_start: Option<u64>,

    /// Records in the cached group
    pub cached_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(start: u64, count: u64) -> Vec<AncientRecord> {
        (start..start + count)
            .map(|n| {
                let b = n.to_be_bytes().to_vec();
                AncientRecord::new(b.clone(), b.clone(), b.clone(), b.clone(), b)
            })
            .collect()
    }

    #[test]
    fn test_empty_cache_misses() {
        let cache = ReadCache::new();
        assert!(cache.get(0, 3).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_hit_within_cached_group() {
        let cache = ReadCache::new();
        cache.replace(0, 64, records(64, 32));

        let hit = cache.get(0, 70).unwrap();
        assert_eq!(hit.hash.as_ref(), &70u64.to_be_bytes());
        assert!(cache.get(0, 63).is_none());
        assert!(cache.get(0, 96).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.cached_start, Some(64));
        assert_eq!(stats.cached_len, 32);
    }

    #[test]
    fn test_replace_drops_previous_group() {
        let cache = ReadCache::new();
        cache.replace(0, 0, records(0, 4));
        cache.replace(0, 4, records(4, 4));

        assert!(cache.get(0, 1).is_none());
        assert!(cache.get(0, 5).is_some());
    }

    #[test]
    fn test_stale_generation_is_a_miss() {
        let cache = ReadCache::new();
        cache.replace(3, 0, records(0, 4));

        assert!(cache.get(4, 1).is_none());
        assert!(cache.get(3, 1).is_some());
    }

    #[test]
    fn test_invalidate() {
        let cache = ReadCache::new();
        cache.replace(0, 0, records(0, 4));
        cache.invalidate();
        assert!(cache.get(0, 0).is_none());
        assert_eq!(cache.stats().cached_len, 0);
    }
}
