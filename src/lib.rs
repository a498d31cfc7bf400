//! # kinship
//!
//! Archetype-based Entity-Component-System data engine with first-class
//! entity relationships.
//!
//! ## Design Goals
//! - Archetype storage with O(1) cached transitions
//! - Relationship pairs encoded directly into component identifiers
//! - Declarative term queries with a generation-invalidated cache
//! - Deferred structural mutation, safe during iteration
//! - Reactive observers over archetype transitions
//!
//! The world is single-threaded by design: all operations assume exclusive
//! access. Term construction is value-based and free of shared state, so
//! independent worlds on independent threads never contend.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Core world types

pub use engine::world::{
    ComponentBundle,
    World,
    WorldConfig,
};

pub use engine::component::{
    Component,
    ComponentInfo,
    TypeHandle,
};

pub use engine::entity::ArchetypeHandle;

pub use engine::pair::{
    is_pair,
    make_pair_id,
    pair_relation,
    pair_target,
};

pub use engine::term::{
    all, and, any, capture, cascade, entity_pair, entity_pair_wildcard, hierarchy, none, not, on,
    or, pair, pair_any, pair_entity, pair_var, pair_wildcard, some, term,
    GroupOp,
    PairRelation,
    PairTarget,
    QueryContext,
    Term,
    TermArg,
};

pub use engine::query::{
    QueryFlags,
    QueryHit,
    QueryIter,
};

pub use engine::observer::{
    on_add,
    on_remove,
    ObserverDef,
    ObserverEvent,
    ObserverID,
};

pub use engine::relation::{Cascade, Exclusive};

pub use engine::error::{
    ColumnError,
    ContractViolationError,
    ECSError,
    ECSResult,
    EncodingOverflowError,
    MoveError,
    RegistryError,
};

pub use engine::types::{
    entity_generation,
    entity_index,
    make_entity_id,
    ArchetypeID,
    ComponentID,
    EntityID,
    MAX_QUERY_BINDINGS,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used engine types and term constructors.
///
/// Import with:
/// ```rust
/// use kinship::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        engine::term::{
            all, any, capture, cascade, hierarchy, none, not, on, pair, pair_any, pair_entity,
            pair_var, pair_wildcard, term,
        },
        on_add, on_remove, Cascade, ComponentID, ECSResult, EntityID, Exclusive, QueryFlags,
        QueryHit, World,
    };
}
