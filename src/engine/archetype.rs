//! # Archetype storage
//!
//! An archetype stores every entity that holds exactly the same set of
//! component kinds, column-major, densely packed.
//!
//! ## Design
//! - The **signature** is a strictly sorted `Vec<ComponentID>`; duplicates
//!   are impossible by construction. Sorting makes subset tests linear, the
//!   identity hash stable, and pair buckets contiguous.
//! - The **column array** holds one [`Column`] per sized signature entry.
//!   `column_indices` maps each signature position to its column, or `None`
//!   for tags.
//! - The **entity list** records insertion order; an entity's row is its
//!   index into this list.
//! - **Transition edges** cache, per component, the archetype reached by
//!   adding or removing that component, together with a precomputed
//!   column map. Edges are created lazily on first transition and the
//!   reverse edge is installed on the target at the same time.
//!
//! ## Invariants
//! - Every column holds exactly `entities.len()` rows.
//! - `id == hash_signature(signature)`.
//! - For an add edge `A --C--> B`: `C ∉ A`, `C ∈ B`, and
//!   `B.signature == sorted(A.signature ∪ {C})`; the reverse remove edge on
//!   `B` leads back to `A`.
//!
//! Row removal is *swap-remove*: the last row is copied over the hole in
//! every column and the moved entity is reported so the caller can patch
//! its record.

use std::collections::HashMap;

use crate::engine::component::ComponentRegistry;
use crate::engine::error::{ColumnError, ECSError, ECSResult};
use crate::engine::pair::relation_bucket;
use crate::engine::storage::Column;
use crate::engine::types::{hash_signature, ArchetypeID, ComponentID, EntityID};


/// Cached transition to another archetype.
///
/// `column_map` has one entry per destination column: the source column to
/// copy from, or `None` for columns with no source (zero-initialized).
#[derive(Clone, Debug)]
pub struct Edge {

    /// Index of the destination archetype in the world's archetype list.
    pub target: u32,

    /// Per-destination-column source column index.
    pub column_map: Vec<Option<usize>>,
}

/// Stores entities that share an identical component signature.
pub struct Archetype {
    id: ArchetypeID,
    signature: Vec<ComponentID>,
    columns: Vec<Column>,
    column_indices: Vec<Option<usize>>,
    entities: Vec<EntityID>,
    pub(crate) add_edges: HashMap<ComponentID, Edge>,
    pub(crate) remove_edges: HashMap<ComponentID, Edge>,
}

impl Archetype {
    /// Creates an empty archetype for a strictly sorted signature.
    ///
    /// ## Errors
    /// `Internal` if the signature is not strictly sorted or names an
    /// identifier the registry has never seen.
    pub fn new(signature: Vec<ComponentID>, registry: &ComponentRegistry) -> ECSResult<Self> {
        if signature.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ECSError::Internal("archetype signature must be strictly sorted"));
        }

        let mut columns = Vec::new();
        let mut column_indices = Vec::with_capacity(signature.len());
        for &component_id in &signature {
            let info = registry
                .info(component_id)
                .ok_or(ECSError::Internal("archetype signature names unregistered component"))?;
            if info.is_tag() {
                column_indices.push(None);
            } else {
                column_indices.push(Some(columns.len()));
                columns.push(Column::new(info.size, info.align));
            }
        }

        Ok(Self {
            id: hash_signature(&signature),
            signature,
            columns,
            column_indices,
            entities: Vec::new(),
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
        })
    }

    /// Creates the designated empty archetype (signature of length zero).
    pub(crate) fn empty() -> Self {
        Self {
            id: hash_signature(&[]),
            signature: Vec::new(),
            columns: Vec::new(),
            column_indices: Vec::new(),
            entities: Vec::new(),
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
        }
    }

    /// Identity hash of the signature.
    #[inline]
    pub fn id(&self) -> ArchetypeID {
        self.id
    }

    /// The strictly sorted signature.
    #[inline]
    pub fn signature(&self) -> &[ComponentID] {
        &self.signature
    }

    /// Entities stored in this archetype, in row order.
    #[inline]
    pub fn entities(&self) -> &[EntityID] {
        &self.entities
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entities are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Binary-searches the signature for a component.
    #[inline]
    pub fn find_component(&self, component_id: ComponentID) -> Option<usize> {
        self.signature.binary_search(&component_id).ok()
    }

    /// Returns `true` if the signature contains the component.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        self.find_component(component_id).is_some()
    }

    /// Returns the column storing a component, if it is present and sized.
    pub fn column_of(&self, component_id: ComponentID) -> Option<&Column> {
        let position = self.find_component(component_id)?;
        self.column_indices[position].map(|index| &self.columns[index])
    }

    /// Mutable variant of [`Archetype::column_of`].
    pub fn column_of_mut(&mut self, component_id: ComponentID) -> Option<&mut Column> {
        let position = self.find_component(component_id)?;
        self.column_indices[position].map(move |index| &mut self.columns[index])
    }

    /// Finds the first pair in the signature with the given relation.
    ///
    /// Pairs sort above plain ids and share a contiguous bucket per
    /// relation, so the scan starts at the bucket's lower bound and stops
    /// once an id exceeds its upper bound.
    pub fn find_pair_with_relation(&self, relation: u32) -> Option<ComponentID> {
        let (low, high) = relation_bucket(relation);
        let start = self.signature.partition_point(|&id| id < low);
        match self.signature.get(start) {
            Some(&id) if id <= high => Some(id),
            _ => None,
        }
    }

    /// Iterates every pair in the signature with the given relation.
    pub fn pairs_with_relation(&self, relation: u32) -> impl Iterator<Item = ComponentID> + '_ {
        let (low, high) = relation_bucket(relation);
        let start = self.signature.partition_point(|&id| id < low);
        self.signature[start..]
            .iter()
            .copied()
            .take_while(move |&id| id <= high)
    }

    /// Appends an entity, growing every column by one zeroed element.
    ///
    /// Returns the new row.
    pub fn push_entity(&mut self, entity: EntityID) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        for column in &mut self.columns {
            let column_row = column.push_zeroed();
            debug_assert_eq!(column_row, row);
        }
        row
    }

    /// Swap-removes a row from every column and the entity list.
    ///
    /// Returns the removed entity and, when the hole was filled from the
    /// end, the entity that now occupies `row` (its record must be patched
    /// by the caller).
    pub fn swap_remove_row(&mut self, row: usize) -> Result<(EntityID, Option<EntityID>), ColumnError> {
        if row >= self.entities.len() {
            return Err(ColumnError::RowOutOfBounds { row, rows: self.entities.len() });
        }
        for column in &mut self.columns {
            column.swap_remove(row)?;
        }
        let removed = self.entities.swap_remove(row);
        let moved = self.entities.get(row).copied();
        Ok((removed, moved))
    }

    /// Computes the column map for a transition into `destination`.
    ///
    /// One entry per destination column: the index of the source column
    /// holding the same component, or `None` when the component is new.
    pub fn column_map_into(&self, destination: &Archetype) -> Vec<Option<usize>> {
        let mut map = Vec::with_capacity(destination.columns.len());
        for (position, &component_id) in destination.signature.iter().enumerate() {
            if destination.column_indices[position].is_none() {
                continue;
            }
            let source = self
                .find_component(component_id)
                .and_then(|source_position| self.column_indices[source_position]);
            map.push(source);
        }
        map
    }

    /// Copies every mapped cell of `source_row` into `destination_row`.
    ///
    /// Unmapped destination columns keep their zero initialization.
    pub fn copy_row_from(
        &mut self,
        destination_row: usize,
        source: &Archetype,
        source_row: usize,
        column_map: &[Option<usize>],
    ) -> Result<(), ColumnError> {
        debug_assert_eq!(column_map.len(), self.columns.len());
        for (destination_column, mapped) in self.columns.iter_mut().zip(column_map) {
            if let Some(source_index) = mapped {
                destination_column.copy_row_from(
                    destination_row,
                    &source.columns[*source_index],
                    source_row,
                )?;
            }
        }
        Ok(())
    }

    /// Builds the signature obtained by adding one component.
    ///
    /// Returns `None` if the component is already present.
    pub fn signature_with(&self, component_id: ComponentID) -> Option<Vec<ComponentID>> {
        match self.signature.binary_search(&component_id) {
            Ok(_) => None,
            Err(insert_at) => {
                let mut signature = self.signature.clone();
                signature.insert(insert_at, component_id);
                Some(signature)
            }
        }
    }

    /// Builds the signature obtained by removing one component.
    ///
    /// Returns `None` if the component is absent.
    pub fn signature_without(&self, component_id: ComponentID) -> Option<Vec<ComponentID>> {
        match self.signature.binary_search(&component_id) {
            Ok(remove_at) => {
                let mut signature = self.signature.clone();
                signature.remove(remove_at);
                Some(signature)
            }
            Err(_) => None,
        }
    }
}
