//! Relation traits: markers that alter pair semantics.
//!
//! A trait is attached by adding a marker component to the *type-entity* of
//! a relation, a hidden entity the world lazily creates per component kind.
//! Two traits are defined:
//!
//! - [`Exclusive`] — an entity may hold at most one pair of the relation at
//!   a time. Adding `(R, T')` first removes every other `(R, *)` on the
//!   entity, immediately, even inside a flush: the removal is part of the
//!   same add operation.
//! - [`Cascade`] — destroying the target of a pair `(R, t)` enqueues the
//!   destruction of every entity carrying such a pair. Cascading proceeds
//!   through the deferred queue, so it recurses naturally and a bounded
//!   work-list with liveness checks keeps cycles from looping forever.
//!
//! Entity-valued relations carry no type-entity and therefore no traits.

/// Marker trait: a relation admitting at most one pair per entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Exclusive;

// Zero-sized markers are trivially plain old data.
unsafe impl bytemuck::Zeroable for Exclusive {}
unsafe impl bytemuck::Pod for Exclusive {}

/// Marker trait: destroying a pair target destroys the pair's holder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cascade;

unsafe impl bytemuck::Zeroable for Cascade {}
unsafe impl bytemuck::Pod for Cascade {}
