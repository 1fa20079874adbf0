//! Cached queries over an [`ArchetypeStore`].
//!
//! A [`Query`] owns a [`Filter`] and, for every world it has been evaluated
//! against, the list of archetypes already known to match plus a high-water
//! mark of how many archetypes have been tested. Archetypes are append-only,
//! so re-evaluation only tests archetypes created since the last call:
//!
//! ```text
//! archetypes: [0 1 2 3 | 4 5]
//!                        ^ seen = 4 → only 4 and 5 are tested
//! ```
//!
//! Create a query once and keep it; building a new one per tick throws the
//! cache away.

use std::collections::HashMap;

use tracing::trace;

use crate::archetype::ArchetypeIndex;
use crate::entity::Entity;
use crate::filter::Filter;
use crate::storage::{ArchetypeStore, WorldId};

/// Observable state of a query's cache for one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheState {
    /// Number of archetypes known to match.
    pub matched: usize,
    /// High-water mark: archetypes `[0, seen)` have been tested.
    pub seen: usize,
    /// Total filter evaluations performed for this world.
    pub filter_tests: u64,
}

#[derive(Debug, Default)]
struct QueryCache {
    archetypes: Vec<ArchetypeIndex>,
    seen: usize,
    filter_tests: u64,
}

/// A filter plus its per-world archetype cache.
#[derive(Debug)]
pub struct Query {
    filter: Filter,
    caches: HashMap<WorldId, QueryCache>,
}

impl Query {
    /// Create a query from a filter.
    #[must_use]
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            caches: HashMap::new(),
        }
    }

    /// The query's filter.
    #[must_use]
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Bring the cache for `store` up to date and return the matching
    /// archetypes in index order.
    fn evaluate(&mut self, store: &ArchetypeStore) -> &[ArchetypeIndex] {
        let cache = self.caches.entry(store.world_id()).or_default();
        let total = store.archetype_count();
        if cache.seen < total {
            for archetype in &store.archetypes()[cache.seen..] {
                cache.filter_tests += 1;
                if self.filter.matches(&archetype.layout) {
                    cache.archetypes.push(archetype.index);
                }
            }
            trace!(
                from = cache.seen,
                to = total,
                matched = cache.archetypes.len(),
                "extended query cache"
            );
            cache.seen = total;
        }
        &cache.archetypes
    }

    /// Indices of every matching archetype.
    pub fn matching_archetypes(&mut self, store: &ArchetypeStore) -> Vec<ArchetypeIndex> {
        self.evaluate(store).to_vec()
    }

    /// Invoke `f` for each matching entity, in archetype then row order.
    /// Returning `false` from `f` stops the iteration early.
    pub fn each<F>(&mut self, store: &ArchetypeStore, mut f: F)
    where
        F: FnMut(Entity) -> bool,
    {
        for &index in self.evaluate(store) {
            let Some(archetype) = store.archetype(index) else {
                continue;
            };
            for &entity in &archetype.entities {
                if !f(entity) {
                    return;
                }
            }
        }
    }

    /// Every matching entity, in iteration order.
    pub fn entities(&mut self, store: &ArchetypeStore) -> Vec<Entity> {
        let mut out = Vec::new();
        self.each(store, |e| {
            out.push(e);
            true
        });
        out
    }

    /// Number of matching entities.
    pub fn count(&mut self, store: &ArchetypeStore) -> usize {
        self.evaluate(store)
            .iter()
            .filter_map(|&i| store.archetype(i))
            .map(|a| a.len())
            .sum()
    }

    /// The first matching entity, if any.
    pub fn first(&mut self, store: &ArchetypeStore) -> Option<Entity> {
        let mut found = None;
        self.each(store, |e| {
            found = Some(e);
            false
        });
        found
    }

    /// Cache state for `world`, or `None` if never evaluated there.
    #[must_use]
    pub fn cache_state(&self, world: WorldId) -> Option<CacheState> {
        self.caches.get(&world).map(|c| CacheState {
            matched: c.archetypes.len(),
            seen: c.seen,
            filter_tests: c.filter_tests,
        })
    }
}
