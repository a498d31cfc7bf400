//! Query matching and the version-invalidated query cache.
//!
//! ## Matching
//! [`archetype_matches`] decides whether an archetype satisfies a resolved
//! [`QueryContext`]: every required identifier present, no excluded one,
//! every non-negated wildcard pair finds a matching pair, every negated one
//! does not, and every `Any` group has at least one satisfied sub-term.
//!
//! ## Caching
//! Matched archetype lists are cached per context hash. A cache entry is
//! valid only while its stamped generation equals the world's
//! `archetype_generation`; any archetype creation or removal invalidates
//! every entry at once, and the next lookup rebuilds by rescanning the full
//! archetype list. The cache clones the context's captures and required
//! identifiers into storage it owns, so entries survive the contexts they
//! were built from.
//!
//! When a query carries a cascade relation, the cache also holds the depth
//! groups for hierarchical iteration: bucket `d` lists the matched
//! archetypes whose shallowest entity sits at depth `d` along the cascade
//! relation. Iteration walks buckets in ascending order so parents are
//! visited before children.

use std::collections::HashMap;

use crate::engine::archetype::Archetype;
use crate::engine::entity::ArchetypeHandle;
use crate::engine::term::{GroupOp, QueryContext, ResolvedTerm};
use crate::engine::types::{ComponentID, EntityID, Fnv1a, RowID, VarSlot, MAX_QUERY_BINDINGS};


/// Behavior flags for query iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryFlags {

    /// Yield rows whose entities have a required component disabled.
    pub include_disabled: bool,
}

/// One result row of a query.
#[derive(Clone, Copy, Debug)]
pub struct QueryHit {

    /// The matched entity.
    pub entity: EntityID,

    /// The archetype holding the entity.
    pub archetype: ArchetypeHandle,

    /// The entity's row within the archetype.
    pub row: RowID,

    /// Capture bindings; slot values are entity handles where the matched
    /// target resolves to an alive entity, raw target values otherwise, and
    /// `0` for unbound slots.
    pub bindings: [u64; MAX_QUERY_BINDINGS],
}

/// In-flight state of a manual query iteration.
///
/// Obtained from `World::query_iter`; advanced with `World::query_next`;
/// released with `World::query_finish`. Exhausting the iterator releases the
/// iteration scope automatically; callers that stop early must call
/// `query_finish` so the world's iteration depth is decremented exactly
/// once.
pub struct QueryIter {
    pub(crate) order: Vec<u32>,
    pub(crate) captures: Vec<(u32, VarSlot)>,
    pub(crate) required: Vec<ComponentID>,
    pub(crate) include_disabled: bool,
    pub(crate) archetype_cursor: usize,
    pub(crate) row_cursor: usize,
    pub(crate) row_limit: usize,
    pub(crate) bindings: [u64; MAX_QUERY_BINDINGS],
    pub(crate) bindings_ready: bool,
    pub(crate) finished: bool,
}

/// A cached query: matched archetypes plus everything needed to iterate
/// without the originating context.
#[derive(Clone, Debug, Default)]
pub(crate) struct CachedQuery {
    pub archetypes: Vec<u32>,
    pub generation: u64,
    pub captures: Vec<(u32, VarSlot)>,
    pub required: Vec<ComponentID>,
    pub cascade_rel: u32,
    pub depth_groups: Vec<Vec<u32>>,
    pub max_depth: u32,
}

/// Context-hash keyed store of cached queries.
#[derive(Default)]
pub(crate) struct QueryCache {
    entries: HashMap<u64, CachedQuery>,
}

impl QueryCache {
    pub fn get(&self, key: u64) -> Option<&CachedQuery> {
        self.entries.get(&key)
    }

    pub fn insert(&mut self, key: u64, cached: CachedQuery) -> &CachedQuery {
        self.entries.insert(key, cached);
        &self.entries[&key]
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Hashes a resolved context into its cache key.
///
/// Required and excluded identifiers are hashed in sorted order so that
/// term order never splits the cache; separators keep the sections from
/// running together. Collisions are tolerable: the cache re-validates
/// entries against the archetype generation.
pub fn hash_context(context: &QueryContext) -> u64 {
    let mut hasher = Fnv1a::new();

    let mut required = context.required.clone();
    required.sort_unstable();
    for id in required {
        hasher.write_u32(id);
    }
    hasher.write_u8(0xFF);

    let mut excluded = context.excluded.clone();
    excluded.sort_unstable();
    for id in excluded {
        hasher.write_u32(id);
    }
    hasher.write_u8(0xFF);

    for &(relation, negate) in &context.wildcard_terms {
        hasher.write_u32(relation);
        hasher.write_u8(negate as u8);
    }
    hasher.write_u8(0xFF);

    for group in &context.any_of_groups {
        hasher.write_u32(group.len() as u32);
    }
    hasher.write_u8(0xFF);

    // Keep a depth-ordered query from sharing an entry with its unordered
    // twin, and queries with different bindings from sharing captures.
    hasher.write_u32(context.cascade_rel);
    for &(relation, slot) in &context.captures {
        hasher.write_u32(relation);
        hasher.write_u8(slot);
    }

    hasher.finish()
}

/// Returns `true` iff the archetype satisfies the context.
pub fn archetype_matches(archetype: &Archetype, context: &QueryContext) -> bool {
    for &id in &context.required {
        if !archetype.has(id) {
            return false;
        }
    }
    for &id in &context.excluded {
        if archetype.has(id) {
            return false;
        }
    }
    for &(relation, negate) in &context.wildcard_terms {
        if archetype.find_pair_with_relation(relation).is_some() == negate {
            return false;
        }
    }
    for group in &context.any_of_groups {
        if !group.iter().any(|term| matches_resolved(archetype, term)) {
            return false;
        }
    }
    true
}

fn matches_resolved(archetype: &Archetype, term: &ResolvedTerm) -> bool {
    match term {
        ResolvedTerm::Component { id, negate } => archetype.has(*id) != *negate,
        ResolvedTerm::WildcardPair { relation, negate } => {
            archetype.find_pair_with_relation(*relation).is_some() != *negate
        }
        ResolvedTerm::Group { op, terms, negate } => {
            let holds = match op {
                GroupOp::All => terms.iter().all(|term| matches_resolved(archetype, term)),
                GroupOp::Any => terms.iter().any(|term| matches_resolved(archetype, term)),
                GroupOp::None => !terms.iter().any(|term| matches_resolved(archetype, term)),
            };
            holds != *negate
        }
    }
}
