//! Pair encoding: packing a (relation, target) tuple into a [`ComponentID`].
//!
//! A pair is an ordinary component identifier whose high bit is set:
//!
//! ```text
//! | pair flag : 1 | relation : 15 | target : 16 |
//! ```
//!
//! The relation field holds a component ordinal (or an entity index for
//! entity-valued relations); the target field holds a component ordinal or
//! an entity index. Because the pair flag is the high bit, every pair sorts
//! above every plain component in a signature, and all pairs sharing a
//! relation form one contiguous bucket.

use crate::engine::error::EncodingOverflowError;
use crate::engine::types::{
    ComponentID, PAIR_FLAG, PAIR_RELATION_MAX, PAIR_TARGET_BITS, PAIR_TARGET_MAX,
};


/// Packs a relation and target into a pair [`ComponentID`].
///
/// ## Errors
/// Fails with [`EncodingOverflowError`] when the relation exceeds 15 bits or
/// the target exceeds 16 bits. This is fatal: no fallback encoding exists.
#[inline]
pub fn make_pair_id(relation: u32, target: u32) -> Result<ComponentID, EncodingOverflowError> {
    if relation > PAIR_RELATION_MAX || target > PAIR_TARGET_MAX {
        return Err(EncodingOverflowError { relation: relation as u64, target: target as u64 });
    }
    Ok(PAIR_FLAG | (relation << PAIR_TARGET_BITS) | target)
}

/// Extracts the relation field of a pair identifier.
#[inline]
pub const fn pair_relation(id: ComponentID) -> u32 {
    (id >> PAIR_TARGET_BITS) & PAIR_RELATION_MAX
}

/// Extracts the target field of a pair identifier.
#[inline]
pub const fn pair_target(id: ComponentID) -> u32 {
    id & PAIR_TARGET_MAX
}

/// Returns `true` if the identifier encodes a pair.
#[inline]
pub const fn is_pair(id: ComponentID) -> bool {
    (id >> 31) != 0
}

/// Returns the inclusive `[low, high]` identifier range of every pair with
/// the given relation.
///
/// Signatures are sorted, so a scan may start at the first id `>= low` and
/// stop as soon as an id exceeds `high`.
#[inline]
pub const fn relation_bucket(relation: u32) -> (ComponentID, ComponentID) {
    let low = PAIR_FLAG | (relation << PAIR_TARGET_BITS);
    (low, low | PAIR_TARGET_MAX)
}
