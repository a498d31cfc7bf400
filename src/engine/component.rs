//! # Component Registry
//!
//! This module assigns stable numeric [`ComponentID`] ordinals to component
//! kinds and stores the size/alignment descriptors the storage layer needs
//! to allocate columns.
//!
//! ## Purpose
//! The registry decouples component type information (`TypeId`, name, size,
//! alignment) from runtime storage, so archetypes can hold heterogeneous
//! columns without knowing concrete Rust types.
//!
//! ## Design
//! - Components are registered once and assigned an ordinal from `1`.
//! - Both directions are kept: `TypeId → ComponentID` for registration and
//!   term resolution, and `ComponentID → info` for storage allocation and
//!   relation-trait lookups.
//! - Pair identifiers are registered on first sight, inheriting their column
//!   width from the relation's backing type (zero for tag relations and for
//!   entity-valued relations).
//!
//! ## Invariants
//! - Ordinals are unique and stable for the lifetime of the world.
//! - Every registered identifier has a descriptor; sized descriptors are the
//!   only ones that produce columns.
//!
//! The registry is owned by a single `World` and needs no synchronization.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::mem::{align_of, size_of};

use bytemuck::Pod;

use crate::engine::error::RegistryError;
use crate::engine::pair::{is_pair, pair_relation};
use crate::engine::types::{ComponentID, PAIR_FLAG};


/// Marker trait for attachable component kinds.
///
/// Components are plain old data: byte-for-byte copies and zero
/// initialization are always valid representations. Zero-sized types act as
/// *tags* and occupy no storage.
pub trait Component: Pod + Send + Sync + 'static {}

impl<T: Pod + Send + Sync + 'static> Component for T {}

/// Stable, hashable identity plus layout descriptor for a component kind.
///
/// Term arguments carry handles rather than bare `TypeId`s so that
/// resolution can register previously unseen kinds without access to the
/// static type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeHandle {

    /// Runtime identity of the component kind.
    pub type_id: TypeId,

    /// Size of the component in bytes; `0` marks a tag.
    pub size: usize,

    /// Alignment of the component in bytes.
    pub align: usize,

    /// Rust type name for diagnostics.
    pub name: &'static str,
}

impl TypeHandle {
    /// Builds the handle for component type `T`.
    #[inline]
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Describes a registered component identifier.
#[derive(Clone, Copy, Debug)]
pub struct ComponentInfo {

    /// The identifier this descriptor belongs to.
    pub id: ComponentID,

    /// Column element width in bytes; `0` for tags and tag-like pairs.
    pub size: usize,

    /// Column element alignment in bytes.
    pub align: usize,

    /// Back-reference to the external type, absent for pair identifiers.
    pub type_id: Option<TypeId>,

    /// Diagnostic name.
    pub name: &'static str,
}

impl ComponentInfo {
    /// Returns `true` if this kind stores no data.
    #[inline]
    pub fn is_tag(&self) -> bool {
        self.size == 0
    }
}

/// Per-world mapping between component kinds and compact ordinals.
#[derive(Default)]
pub struct ComponentRegistry {
    next_ordinal: ComponentID,
    by_type: HashMap<TypeId, ComponentID>,
    by_id: HashMap<ComponentID, ComponentInfo>,
}

impl ComponentRegistry {
    /// Creates an empty registry; the first assigned ordinal is `1`.
    pub fn new() -> Self {
        Self { next_ordinal: 1, by_type: HashMap::new(), by_id: HashMap::new() }
    }

    /// Registers a component kind from its handle, returning its ordinal.
    ///
    /// Registration is idempotent: a kind seen before returns its existing
    /// ordinal.
    ///
    /// ## Errors
    /// `CapacityExceeded` once the 31-bit ordinal space is exhausted.
    pub fn register_handle(&mut self, handle: &TypeHandle) -> Result<ComponentID, RegistryError> {
        if let Some(&existing) = self.by_type.get(&handle.type_id) {
            return Ok(existing);
        }

        let id = self.next_ordinal;
        if id >= PAIR_FLAG {
            return Err(RegistryError::CapacityExceeded { cap: PAIR_FLAG });
        }
        self.next_ordinal = id + 1;

        self.by_type.insert(handle.type_id, id);
        self.by_id.insert(
            id,
            ComponentInfo {
                id,
                size: handle.size,
                align: handle.align,
                type_id: Some(handle.type_id),
                name: handle.name,
            },
        );
        Ok(id)
    }

    /// Registers component type `T`, returning its ordinal.
    #[inline]
    pub fn register<T: Component>(&mut self) -> Result<ComponentID, RegistryError> {
        self.register_handle(&TypeHandle::of::<T>())
    }

    /// Registers a pair identifier whose relation is a component kind.
    ///
    /// The pair inherits the relation's size and alignment; tag relations
    /// produce tag pairs.
    ///
    /// ## Errors
    /// `MissingRelationInfo` if the relation ordinal has no descriptor.
    pub fn register_pair(&mut self, pair_id: ComponentID) -> Result<ComponentID, RegistryError> {
        debug_assert!(is_pair(pair_id));
        if self.by_id.contains_key(&pair_id) {
            return Ok(pair_id);
        }

        let relation = pair_relation(pair_id);
        let info = self
            .by_id
            .get(&relation)
            .copied()
            .ok_or(RegistryError::MissingRelationInfo { relation })?;

        self.by_id.insert(
            pair_id,
            ComponentInfo {
                id: pair_id,
                size: info.size,
                align: info.align,
                type_id: None,
                name: info.name,
            },
        );
        Ok(pair_id)
    }

    /// Registers a pair identifier whose relation is an entity.
    ///
    /// Entity-valued relations never carry data, regardless of target.
    pub fn register_entity_pair(&mut self, pair_id: ComponentID) -> ComponentID {
        debug_assert!(is_pair(pair_id));
        self.by_id.entry(pair_id).or_insert(ComponentInfo {
            id: pair_id,
            size: 0,
            align: 1,
            type_id: None,
            name: "entity pair",
        });
        pair_id
    }

    /// Returns the ordinal of a previously registered type, if any.
    #[inline]
    pub fn lookup(&self, type_id: TypeId) -> Option<ComponentID> {
        self.by_type.get(&type_id).copied()
    }

    /// Returns the ordinal of component type `T`, if registered.
    #[inline]
    pub fn lookup_type<T: Component>(&self) -> Option<ComponentID> {
        self.lookup(TypeId::of::<T>())
    }

    /// Returns the descriptor for an identifier, if registered.
    #[inline]
    pub fn info(&self, id: ComponentID) -> Option<&ComponentInfo> {
        self.by_id.get(&id)
    }

    /// Returns the external type behind a plain ordinal, if any.
    #[inline]
    pub fn type_of(&self, id: ComponentID) -> Option<TypeId> {
        self.by_id.get(&id).and_then(|info| info.type_id)
    }

    /// Number of registered identifiers (plain and pair).
    #[inline]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if nothing has been registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
