//! Resolution cache for recipe lookups and expansion fragments
//!
//! Readers share the lock; a writer holds it only while inserting or
//! evicting, never across a tree build. Entries live until they are
//! explicitly invalidated.
//!
//! Store reads happen outside the lock, so every insert carries the
//! generation observed before the read. Invalidation bumps the generation
//! and inserts computed under an older one are dropped.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::models::{ItemId, MaterialLine, RecipeResult, RecipeSource, SourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub item: ItemId,
    pub preferred: Option<RecipeSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub item: ItemId,
    pub me_level: Option<u8>,
    pub te_level: Option<u8>,
    pub preferred: Option<RecipeSource>,
}

/// One level of expansion for an item at fixed efficiency levels
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub source_kind: SourceKind,
    pub is_raw: bool,
    pub output_per_run: u32,
    pub time_per_run_seconds: f64,
    /// Efficiency-adjusted inputs per run; empty when raw
    pub materials: Vec<MaterialLine>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub lookups: usize,
    pub fragments: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    lookups: HashMap<LookupKey, Arc<RecipeResult>>,
    fragments: HashMap<FragmentKey, Arc<Fragment>>,
    /// material -> items whose cached fragment consumes it
    dependents: HashMap<ItemId, HashSet<ItemId>>,
    /// Bumped by every invalidation
    generation: u64,
}

#[derive(Debug, Default)]
pub struct ResolutionCache {
    state: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &LookupKey) -> Option<Arc<RecipeResult>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let found = state.lookups.get(key).cloned();
        self.record(found.is_some());
        found
    }

    /// Generation to pass to `store_lookup` / `store_fragment`; read it
    /// before querying the store.
    pub fn generation(&self) -> u64 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).generation
    }

    /// Cache `result` unless an invalidation happened since `generation`.
    /// The result is returned either way.
    pub fn store_lookup(&self, key: LookupKey, result: RecipeResult, generation: u64) -> Arc<RecipeResult> {
        let result = Arc::new(result);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.generation != generation {
            debug!(item = %key.item, "stale lookup not cached");
            return result;
        }
        state.lookups.insert(key, Arc::clone(&result));
        result
    }

    pub fn fragment(&self, key: &FragmentKey) -> Option<Arc<Fragment>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let found = state.fragments.get(key).cloned();
        self.record(found.is_some());
        found
    }

    pub fn store_fragment(&self, key: FragmentKey, fragment: Fragment, generation: u64) -> Arc<Fragment> {
        let fragment = Arc::new(fragment);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.generation != generation {
            debug!(item = %key.item, "stale fragment not cached");
            return fragment;
        }
        for line in &fragment.materials {
            state
                .dependents
                .entry(line.item.clone())
                .or_default()
                .insert(key.item.clone());
        }
        state.fragments.insert(key, Arc::clone(&fragment));
        fragment
    }

    /// Evict `item` and every item whose cached expansion transitively
    /// consumed it. Returns the number of evicted entries.
    pub fn invalidate_item(&self, item: &ItemId) -> usize {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.generation += 1;

        let mut affected: HashSet<ItemId> = HashSet::new();
        let mut pending = vec![item.clone()];
        while let Some(next) = pending.pop() {
            if !affected.insert(next.clone()) {
                continue;
            }
            if let Some(parents) = state.dependents.get(&next) {
                pending.extend(parents.iter().cloned());
            }
        }

        let before = state.lookups.len() + state.fragments.len();
        state.lookups.retain(|key, _| !affected.contains(&key.item));
        state.fragments.retain(|key, _| !affected.contains(&key.item));
        for gone in &affected {
            state.dependents.remove(gone);
        }
        let evicted = before - (state.lookups.len() + state.fragments.len());

        debug!(item = %item, affected = affected.len(), evicted, "cache invalidated");
        evicted
    }

    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.lookups.clear();
        state.fragments.clear();
        state.dependents.clear();
        state.generation += 1;
        debug!("cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            lookups: state.lookups.len(),
            fragments: state.fragments.len(),
        }
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn item(name: &str) -> ItemId {
        ItemId::new(name).unwrap()
    }

    fn key(name: &str) -> FragmentKey {
        FragmentKey {
            item: item(name),
            me_level: None,
            te_level: None,
            preferred: None,
        }
    }

    fn fragment(inputs: &[&str]) -> Fragment {
        Fragment {
            source_kind: SourceKind::SdeReference,
            is_raw: inputs.is_empty(),
            output_per_run: 1,
            time_per_run_seconds: 60.0,
            materials: inputs
                .iter()
                .map(|name| MaterialLine {
                    item: item(name),
                    quantity: 1.0,
                })
                .collect(),
        }
    }

    #[test]
    fn hit_and_miss_counting() {
        let cache = ResolutionCache::new();
        assert!(cache.fragment(&key("A")).is_none());
        cache.store_fragment(key("A"), fragment(&["B"]), 0);
        assert!(cache.fragment(&key("A")).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.fragments, 1);
    }

    #[test]
    fn invalidation_follows_dependents() {
        let cache = ResolutionCache::new();
        // Root -> Component -> Mineral, plus an unrelated Other -> Pyerite
        cache.store_fragment(key("Root"), fragment(&["Component"]), 0);
        cache.store_fragment(key("Component"), fragment(&["Mineral"]), 0);
        cache.store_fragment(key("Mineral"), fragment(&[]), 0);
        cache.store_fragment(key("Other"), fragment(&["Pyerite"]), 0);
        cache.store_lookup(
            LookupKey {
                item: item("Mineral"),
                preferred: None,
            },
            RecipeResult::NotFound,
            0,
        );

        let evicted = cache.invalidate_item(&item("Mineral"));
        assert_eq!(evicted, 4);
        assert!(cache.fragment(&key("Root")).is_none());
        assert!(cache.fragment(&key("Component")).is_none());
        assert!(cache.fragment(&key("Other")).is_some());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = ResolutionCache::new();
        cache.store_fragment(key("A"), fragment(&["B"]), 0);
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.fragments, 0);
        assert_eq!(stats.lookups, 0);
    }

    #[test]
    fn concurrent_readers_share_entries() {
        let cache = Arc::new(ResolutionCache::new());
        cache.store_fragment(key("A"), fragment(&["B"]), 0);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.fragment(&key("A")).is_some())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(cache.stats().hits, 4);
    }

    #[test]
    fn inserts_from_before_an_invalidation_are_dropped() {
        let cache = ResolutionCache::new();
        let seen = cache.generation();

        // A refresh lands while the caller is still reading the store
        cache.invalidate_item(&item("Widget"));

        let returned = cache.store_fragment(key("Widget"), fragment(&["Tritanium"]), seen);
        assert_eq!(returned.materials.len(), 1);
        assert!(cache.fragment(&key("Widget")).is_none());

        let lookup_key = LookupKey {
            item: item("Widget"),
            preferred: None,
        };
        cache.store_lookup(lookup_key.clone(), RecipeResult::NotFound, seen);
        assert!(cache.lookup(&lookup_key).is_none());

        cache.store_fragment(key("Widget"), fragment(&["Tritanium"]), cache.generation());
        assert!(cache.fragment(&key("Widget")).is_some());
    }

    #[test]
    fn clear_also_advances_generation() {
        let cache = ResolutionCache::new();
        let seen = cache.generation();
        cache.clear();
        cache.store_fragment(key("A"), fragment(&["B"]), seen);
        assert_eq!(cache.stats().fragments, 0);
    }
}
