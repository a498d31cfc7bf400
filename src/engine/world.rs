//! # World: the ECS composition layer
//!
//! The `World` owns every structure of the engine and exposes the public
//! operation surface: entity lifecycle, component and pair mutation, trait
//! attachment, declarative queries, and observers.
//!
//! ## Ownership
//! The world owns the component registry, the entity index and records, the
//! archetype list with its canonical `ArchetypeID → index` map, the
//! designated empty archetype (index `0`), the deferred op queue, the
//! observer list, the query cache, the type-entity map, and the
//! disabled-component map.
//!
//! ## Iteration gate
//! `iteration_depth` counts active iteration scopes. Entering a scope at
//! depth zero first flushes the deferred queue, then increments the depth;
//! leaving a scope decrements it and flushes once it returns to zero. While
//! the depth is non-zero (or a flush is running) every structural mutation
//! is enqueued instead of applied, so reads taken during iteration observe
//! the snapshot from the moment the scope was entered. Recursive flushing
//! is forbidden by the `is_flushing` flag.
//!
//! ## Structural changes
//! Moving an entity between archetypes goes through cached transition
//! edges: the first transition across a given component computes a column
//! map and installs forward and reverse edges; subsequent transitions copy
//! cell-by-cell using the cached map. Every transition is reported to the
//! observer dispatcher.
//!
//! After each flush pass, archetypes that became empty are removed (the
//! designated empty archetype excepted) and the archetype generation is
//! bumped, invalidating every cached query.
//!
//! ## Concurrency
//! Single-threaded by design. All operations assume exclusive access to the
//! world; nothing here synchronizes.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use log::{debug, trace};

use crate::engine::archetype::{Archetype, Edge};
use crate::engine::commands::DeferredOp;
use crate::engine::component::{Component, ComponentRegistry};
use crate::engine::entity::{ArchetypeHandle, EntityIndex, EntityRecord};
use crate::engine::error::{
    ContractViolationError, ECSError, ECSResult, EncodingOverflowError,
};
use crate::engine::observer::{Observer, ObserverDef, ObserverEvent, ObserverID};
use crate::engine::pair::{is_pair, make_pair_id, pair_relation, pair_target};
use crate::engine::query::{
    archetype_matches, hash_context, CachedQuery, QueryCache, QueryFlags, QueryHit, QueryIter,
};
use crate::engine::relation::{Cascade, Exclusive};
use crate::engine::term::{resolve_terms, QueryContext, TermArg};
use crate::engine::types::{
    entity_index, ComponentID, EntityID, RowID, MAX_QUERY_BINDINGS,
    DEFAULT_CASCADE_DEPTH_CAP, PAIR_RELATION_MAX, PAIR_TARGET_MAX,
};


/// Index of the designated empty archetype.
const EMPTY_ARCHETYPE: u32 = 0;

/// Runtime knobs for a [`World`].
#[derive(Clone, Copy, Debug)]
pub struct WorldConfig {

    /// Cascade nesting beyond this depth is treated as depth `0`.
    pub cascade_depth_cap: u32,

    /// Remove archetypes that became empty after each flush pass.
    pub auto_cleanup: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self { cascade_depth_cap: DEFAULT_CASCADE_DEPTH_CAP, auto_cleanup: true }
    }
}

/// A group of component values spawned or added together.
///
/// Implemented for tuples of one to eight components.
pub trait ComponentBundle {
    /// Converts the bundle into `(identifier, value bytes)` parts,
    /// registering component kinds as needed.
    fn into_parts(
        self,
        registry: &mut ComponentRegistry,
    ) -> ECSResult<Vec<(ComponentID, Box<[u8]>)>>;
}

macro_rules! impl_component_bundle {
    ($(($type:ident, $field:tt)),+) => {
        impl<$($type: Component),+> ComponentBundle for ($($type,)+) {
            fn into_parts(
                self,
                registry: &mut ComponentRegistry,
            ) -> ECSResult<Vec<(ComponentID, Box<[u8]>)>> {
                let mut parts = Vec::new();
                $(
                    let id = registry.register::<$type>()?;
                    parts.push((id, bytemuck::bytes_of(&self.$field).to_vec().into_boxed_slice()));
                )+
                Ok(parts)
            }
        }
    };
}

impl_component_bundle!((A, 0));
impl_component_bundle!((A, 0), (B, 1));
impl_component_bundle!((A, 0), (B, 1), (C, 2));
impl_component_bundle!((A, 0), (B, 1), (C, 2), (D, 3));
impl_component_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
impl_component_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));
impl_component_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6));
impl_component_bundle!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7));

/// The ECS world.
pub struct World {
    pub(crate) registry: ComponentRegistry,
    pub(crate) entity_index: EntityIndex,
    pub(crate) records: Vec<EntityRecord>,
    pub(crate) archetypes: Vec<Archetype>,
    archetype_map: HashMap<u64, u32>,
    queue: VecDeque<DeferredOp>,
    observers: Vec<Observer>,
    next_observer_id: ObserverID,
    cache: QueryCache,
    type_entities: HashMap<TypeId, EntityID>,
    disabled: HashMap<u64, Vec<ComponentID>>,
    archetype_generation: u64,
    iteration_depth: u32,
    is_flushing: bool,
    config: WorldConfig,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Lifecycle
// ───────────────────────────────────────────────────────────────────────────

impl World {
    /// Creates a world with default configuration.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates a world with explicit configuration.
    pub fn with_config(config: WorldConfig) -> Self {
        let empty = Archetype::empty();
        let mut archetype_map = HashMap::new();
        archetype_map.insert(empty.id(), EMPTY_ARCHETYPE);

        Self {
            registry: ComponentRegistry::new(),
            entity_index: EntityIndex::new(),
            records: vec![EntityRecord::DEAD],
            archetypes: vec![empty],
            archetype_map,
            queue: VecDeque::new(),
            observers: Vec::new(),
            next_observer_id: 1,
            cache: QueryCache::default(),
            type_entities: HashMap::new(),
            disabled: HashMap::new(),
            archetype_generation: 1,
            iteration_depth: 0,
            is_flushing: false,
            config,
        }
    }

    /// Applies all queued deferred ops.
    ///
    /// A no-op while an iteration scope is active or a flush is already
    /// running; flushing twice in a row is also a no-op.
    pub fn flush(&mut self) -> ECSResult<()> {
        if self.iteration_depth > 0 || self.is_flushing {
            return Ok(());
        }
        self.flush_queue()
    }

    /// Drops every cached query; the next execution rescans archetypes.
    pub fn clear_query_cache(&mut self) {
        self.cache.clear();
    }

    /// Number of archetypes currently alive, the empty archetype included.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Number of currently alive entities.
    pub fn entity_count(&self) -> usize {
        self.entity_index.alive_count()
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Entities
// ───────────────────────────────────────────────────────────────────────────

impl World {
    /// Creates an empty entity in the designated empty archetype.
    pub fn spawn(&mut self) -> ECSResult<EntityID> {
        let entity = self.entity_index.create();
        self.ensure_record_slot(entity_index(entity));

        let row = self.archetypes[EMPTY_ARCHETYPE as usize].push_entity(entity);
        self.records[entity_index(entity) as usize] =
            EntityRecord { archetype: EMPTY_ARCHETYPE, row: row as RowID };

        self.dispatch_transition(entity, None, Some(EMPTY_ARCHETYPE));
        self.flush_if_idle()?;
        Ok(entity)
    }

    /// Creates an entity carrying the bundle's components.
    pub fn spawn_with<B: ComponentBundle>(&mut self, bundle: B) -> ECSResult<EntityID> {
        let parts = bundle.into_parts(&mut self.registry)?;

        let mut signature: Vec<ComponentID> = parts.iter().map(|part| part.0).collect();
        signature.sort_unstable();
        signature.dedup();

        let archetype = self.get_or_create_archetype(signature)?;
        let entity = self.entity_index.create();
        self.ensure_record_slot(entity_index(entity));

        let row = self.archetypes[archetype as usize].push_entity(entity);
        self.records[entity_index(entity) as usize] =
            EntityRecord { archetype, row: row as RowID };

        for (component_id, bytes) in &parts {
            if bytes.is_empty() {
                continue;
            }
            if let Some(column) = self.archetypes[archetype as usize].column_of_mut(*component_id) {
                column.write_row(row, bytes)?;
            }
        }

        self.dispatch_transition(entity, None, Some(archetype));
        self.flush_if_idle()?;
        Ok(entity)
    }

    /// Destroys an entity; deferred while iteration is active.
    ///
    /// Destroying a dead or stale handle is a no-op.
    pub fn despawn(&mut self, entity: EntityID) -> ECSResult<()> {
        if self.deferring() {
            self.queue.push_back(DeferredOp::Destroy { entity });
            return Ok(());
        }
        self.apply_destroy(entity)?;
        self.flush_if_idle()
    }

    /// Returns `true` if the handle refers to a currently alive entity.
    #[inline]
    pub fn is_alive(&self, entity: EntityID) -> bool {
        self.entity_index.alive(entity)
    }

    /// Returns the entity's row in its archetype, if alive.
    pub fn entity_row(&self, entity: EntityID) -> Option<RowID> {
        self.live_record(entity).map(|record| record.row)
    }

    /// Returns the archetype currently holding the entity, if alive.
    pub fn entity_archetype(&self, entity: EntityID) -> Option<ArchetypeHandle> {
        let record = self.live_record(entity)?;
        Some(ArchetypeHandle {
            index: record.archetype,
            id: self.archetypes[record.archetype as usize].id(),
        })
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Components
// ───────────────────────────────────────────────────────────────────────────

impl World {
    /// Registers component type `T`, returning its stable identifier.
    ///
    /// Registration is idempotent.
    pub fn register_component<T: Component>(&mut self) -> ECSResult<ComponentID> {
        Ok(self.registry.register::<T>()?)
    }

    /// Adds (or overwrites) a component; deferred while iteration is active.
    ///
    /// Adding to a dead entity is a no-op. Adding a component the entity
    /// already holds overwrites the payload in place without an archetype
    /// move.
    pub fn add_component<T: Component>(&mut self, entity: EntityID, value: T) -> ECSResult<()> {
        let component_id = self.registry.register::<T>()?;
        let bytes = bytemuck::bytes_of(&value);
        self.submit_add(entity, component_id, if bytes.is_empty() { None } else { Some(bytes) })
    }

    /// Adds every component of a bundle; deferred while iteration is active.
    pub fn add_components<B: ComponentBundle>(
        &mut self,
        entity: EntityID,
        bundle: B,
    ) -> ECSResult<()> {
        let parts = bundle.into_parts(&mut self.registry)?;
        for (component_id, bytes) in parts {
            let data = if bytes.is_empty() { None } else { Some(&bytes[..]) };
            self.submit_add(entity, component_id, data)?;
        }
        Ok(())
    }

    /// Removes a component; deferred while iteration is active.
    ///
    /// Removing an absent component, or from a dead entity, is a no-op.
    pub fn remove_component<T: Component>(&mut self, entity: EntityID) -> ECSResult<()> {
        let Some(component_id) = self.registry.lookup_type::<T>() else {
            return Ok(());
        };
        self.submit_remove(entity, component_id)
    }

    /// Reads a component value.
    ///
    /// Returns `None` for dead entities, absent components, unregistered
    /// kinds, and tags (which carry no value).
    pub fn get_component<T: Component>(&self, entity: EntityID) -> Option<&T> {
        let component_id = self.registry.lookup_type::<T>()?;
        let record = self.live_record(entity)?;
        let archetype = &self.archetypes[record.archetype as usize];
        archetype.column_of(component_id)?.as_slice::<T>()?.get(record.row as usize)
    }

    /// Mutable variant of [`World::get_component`].
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityID) -> Option<&mut T> {
        let component_id = self.registry.lookup_type::<T>()?;
        let record = self.live_record(entity)?;
        let archetype = &mut self.archetypes[record.archetype as usize];
        archetype.column_of_mut(component_id)?.as_slice_mut::<T>()?.get_mut(record.row as usize)
    }

    /// Returns `true` if the entity is alive and holds the component.
    pub fn has_component<T: Component>(&self, entity: EntityID) -> bool {
        let Some(component_id) = self.registry.lookup_type::<T>() else {
            return false;
        };
        self.live_record(entity)
            .map(|record| self.archetypes[record.archetype as usize].has(component_id))
            .unwrap_or(false)
    }

    /// Masks a component of one entity from queries.
    ///
    /// Returns `false` for dead entities and unregistered kinds. The
    /// component data and archetype placement are untouched; only query
    /// iteration skips the row (unless the query opts into disabled rows).
    pub fn disable_component<T: Component>(&mut self, entity: EntityID) -> bool {
        let Some(component_id) = self.registry.lookup_type::<T>() else {
            return false;
        };
        if self.live_record(entity).is_none() {
            return false;
        }
        let set = self.disabled.entry(entity_index(entity)).or_default();
        if let Err(position) = set.binary_search(&component_id) {
            set.insert(position, component_id);
        }
        true
    }

    /// Removes the query mask from a component of one entity.
    pub fn enable_component<T: Component>(&mut self, entity: EntityID) -> bool {
        let Some(component_id) = self.registry.lookup_type::<T>() else {
            return false;
        };
        let Some(set) = self.disabled.get_mut(&entity_index(entity)) else {
            return false;
        };
        match set.binary_search(&component_id) {
            Ok(position) => {
                set.remove(position);
                if set.is_empty() {
                    self.disabled.remove(&entity_index(entity));
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Returns `true` if the component is currently masked on the entity.
    pub fn is_component_disabled<T: Component>(&self, entity: EntityID) -> bool {
        let Some(component_id) = self.registry.lookup_type::<T>() else {
            return false;
        };
        self.disabled
            .get(&entity_index(entity))
            .map(|set| set.binary_search(&component_id).is_ok())
            .unwrap_or(false)
    }

    /// Returns the full column of `T` in an archetype as a typed slice.
    pub fn column<T: Component>(&self, archetype: ArchetypeHandle) -> Option<&[T]> {
        let component_id = self.registry.lookup_type::<T>()?;
        self.archetype_at(archetype)?.column_of(component_id)?.as_slice::<T>()
    }

    /// Mutable variant of [`World::column`].
    pub fn column_mut<T: Component>(&mut self, archetype: ArchetypeHandle) -> Option<&mut [T]> {
        let component_id = self.registry.lookup_type::<T>()?;
        let target = self.archetypes.get_mut(archetype.index as usize)?;
        if target.id() != archetype.id {
            return None;
        }
        target.column_of_mut(component_id)?.as_slice_mut::<T>()
    }

    /// Returns the entities of an archetype in row order.
    pub fn entities_of(&self, archetype: ArchetypeHandle) -> &[EntityID] {
        self.archetype_at(archetype).map(Archetype::entities).unwrap_or(&[])
    }

    /// Returns the sorted signature of an archetype.
    pub fn signature_of(&self, archetype: ArchetypeHandle) -> Option<&[ComponentID]> {
        self.archetype_at(archetype).map(Archetype::signature)
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Pairs
// ───────────────────────────────────────────────────────────────────────────

impl World {
    fn relation_field<R: Component>(&mut self) -> ECSResult<u32> {
        let relation = self.registry.register::<R>()?;
        if relation > PAIR_RELATION_MAX {
            return Err(EncodingOverflowError { relation: relation as u64, target: 0 }.into());
        }
        Ok(relation)
    }

    fn entity_target_field(&self, target: EntityID) -> ECSResult<u32> {
        let index = entity_index(target);
        if index > PAIR_TARGET_MAX as u64 {
            return Err(EncodingOverflowError { relation: 0, target: index }.into());
        }
        Ok(index as u32)
    }

    /// Encodes and registers the pair `(R, T)` with a type target.
    pub fn pair_id<R: Component, T: Component>(&mut self) -> ECSResult<ComponentID> {
        let target = self.registry.register::<T>()?;
        if target > PAIR_TARGET_MAX {
            return Err(EncodingOverflowError { relation: 0, target: target as u64 }.into());
        }
        let relation = self.relation_field::<R>()?;
        let pair = make_pair_id(relation, target)?;
        Ok(self.registry.register_pair(pair)?)
    }

    /// Encodes and registers the pair `(R, target)` with an entity target.
    pub fn pair_id_with_target<R: Component>(&mut self, target: EntityID) -> ECSResult<ComponentID> {
        let target_field = self.entity_target_field(target)?;
        let relation = self.relation_field::<R>()?;
        let pair = make_pair_id(relation, target_field)?;
        Ok(self.registry.register_pair(pair)?)
    }

    /// Encodes and registers a pair whose relation and target are entities.
    ///
    /// Entity-valued relations never carry data.
    pub fn entity_pair_id(
        &mut self,
        relation: EntityID,
        target: EntityID,
    ) -> ECSResult<ComponentID> {
        let relation_index = entity_index(relation);
        if relation_index > PAIR_RELATION_MAX as u64 {
            return Err(
                EncodingOverflowError { relation: relation_index, target: 0 }.into()
            );
        }
        let target_field = self.entity_target_field(target)?;
        let pair = make_pair_id(relation_index as u32, target_field)?;
        Ok(self.registry.register_entity_pair(pair))
    }

    fn lookup_pair_id_with_target<R: Component>(&self, target_field: u32) -> Option<ComponentID> {
        let relation = self.registry.lookup_type::<R>()?;
        if relation > PAIR_RELATION_MAX {
            return None;
        }
        make_pair_id(relation, target_field).ok()
    }

    fn submit_pair(
        &mut self,
        entity: EntityID,
        pair: ComponentID,
        data: Option<&[u8]>,
    ) -> ECSResult<()> {
        // Data relations default to a zeroed payload so a later read is
        // always backed by initialized bytes.
        let size = self.registry.info(pair).map(|info| info.size).unwrap_or(0);
        match data {
            Some(bytes) => self.submit_add(entity, pair, Some(bytes)),
            None if size > 0 => {
                let zeroes = vec![0u8; size];
                self.submit_add(entity, pair, Some(&zeroes))
            }
            None => self.submit_add(entity, pair, None),
        }
    }

    /// Adds the pair `(R, T)`; the payload is zero-initialized when `R`
    /// carries data.
    pub fn add_pair<R: Component, T: Component>(&mut self, entity: EntityID) -> ECSResult<()> {
        let pair = self.pair_id::<R, T>()?;
        self.submit_pair(entity, pair, None)
    }

    /// Adds the pair `(R, T)` with an explicit relation payload.
    pub fn add_pair_value<R: Component, T: Component>(
        &mut self,
        entity: EntityID,
        value: R,
    ) -> ECSResult<()> {
        let pair = self.pair_id::<R, T>()?;
        let bytes = bytemuck::bytes_of(&value);
        self.submit_pair(entity, pair, if bytes.is_empty() { None } else { Some(bytes) })
    }

    /// Adds the pair `(R, target)` with an entity target.
    pub fn add_pair_target<R: Component>(
        &mut self,
        entity: EntityID,
        target: EntityID,
    ) -> ECSResult<()> {
        let pair = self.pair_id_with_target::<R>(target)?;
        self.submit_pair(entity, pair, None)
    }

    /// Adds the pair `(R, target)` with an entity target and payload.
    pub fn add_pair_target_value<R: Component>(
        &mut self,
        entity: EntityID,
        target: EntityID,
        value: R,
    ) -> ECSResult<()> {
        let pair = self.pair_id_with_target::<R>(target)?;
        let bytes = bytemuck::bytes_of(&value);
        self.submit_pair(entity, pair, if bytes.is_empty() { None } else { Some(bytes) })
    }

    /// Adds a pair whose relation and target are both entities.
    pub fn add_entity_pair(
        &mut self,
        entity: EntityID,
        relation: EntityID,
        target: EntityID,
    ) -> ECSResult<()> {
        let pair = self.entity_pair_id(relation, target)?;
        self.submit_add(entity, pair, None)
    }

    /// Returns `true` if the entity holds the pair `(R, T)`.
    pub fn has_pair<R: Component, T: Component>(&self, entity: EntityID) -> bool {
        let Some(target) = self.registry.lookup_type::<T>() else {
            return false;
        };
        if target > PAIR_TARGET_MAX {
            return false;
        }
        self.has_pair_id::<R>(entity, target)
    }

    /// Returns `true` if the entity holds the pair `(R, target)`.
    pub fn has_pair_target<R: Component>(&self, entity: EntityID, target: EntityID) -> bool {
        let index = entity_index(target);
        if index > PAIR_TARGET_MAX as u64 {
            return false;
        }
        self.has_pair_id::<R>(entity, index as u32)
    }

    fn has_pair_id<R: Component>(&self, entity: EntityID, target_field: u32) -> bool {
        let Some(pair) = self.lookup_pair_id_with_target::<R>(target_field) else {
            return false;
        };
        self.live_record(entity)
            .map(|record| self.archetypes[record.archetype as usize].has(pair))
            .unwrap_or(false)
    }

    /// Returns `true` if the entity holds the entity-relation pair
    /// `(relation, target)`.
    pub fn has_entity_pair(
        &self,
        entity: EntityID,
        relation: EntityID,
        target: EntityID,
    ) -> bool {
        let relation_index = entity_index(relation);
        let target_index = entity_index(target);
        if relation_index > PAIR_RELATION_MAX as u64 || target_index > PAIR_TARGET_MAX as u64 {
            return false;
        }
        let Ok(pair) = make_pair_id(relation_index as u32, target_index as u32) else {
            return false;
        };
        self.live_record(entity)
            .map(|record| self.archetypes[record.archetype as usize].has(pair))
            .unwrap_or(false)
    }

    /// Reads the payload of the pair `(R, T)`.
    ///
    /// Returns `None` when the pair is absent or `R` is a tag.
    pub fn get_pair<R: Component, T: Component>(&self, entity: EntityID) -> Option<&R> {
        let target = self.registry.lookup_type::<T>()?;
        if target > PAIR_TARGET_MAX {
            return None;
        }
        self.get_pair_id::<R>(entity, target)
    }

    /// Reads the payload of the pair `(R, target)`.
    pub fn get_pair_target<R: Component>(&self, entity: EntityID, target: EntityID) -> Option<&R> {
        let index = entity_index(target);
        if index > PAIR_TARGET_MAX as u64 {
            return None;
        }
        self.get_pair_id::<R>(entity, index as u32)
    }

    fn get_pair_id<R: Component>(&self, entity: EntityID, target_field: u32) -> Option<&R> {
        let pair = self.lookup_pair_id_with_target::<R>(target_field)?;
        let record = self.live_record(entity)?;
        let archetype = &self.archetypes[record.archetype as usize];
        archetype.column_of(pair)?.as_slice::<R>()?.get(record.row as usize)
    }

    /// Removes the pair `(R, T)`; a no-op if absent.
    pub fn remove_pair<R: Component, T: Component>(&mut self, entity: EntityID) -> ECSResult<()> {
        let Some(target) = self.registry.lookup_type::<T>() else {
            return Ok(());
        };
        if target > PAIR_TARGET_MAX {
            return Ok(());
        }
        match self.lookup_pair_id_with_target::<R>(target) {
            Some(pair) => self.submit_remove(entity, pair),
            None => Ok(()),
        }
    }

    /// Removes the pair `(R, target)`; a no-op if absent.
    pub fn remove_pair_target<R: Component>(
        &mut self,
        entity: EntityID,
        target: EntityID,
    ) -> ECSResult<()> {
        let index = entity_index(target);
        if index > PAIR_TARGET_MAX as u64 {
            return Ok(());
        }
        match self.lookup_pair_id_with_target::<R>(index as u32) {
            Some(pair) => self.submit_remove(entity, pair),
            None => Ok(()),
        }
    }

    /// Removes an entity-relation pair; a no-op if absent.
    pub fn remove_entity_pair(
        &mut self,
        entity: EntityID,
        relation: EntityID,
        target: EntityID,
    ) -> ECSResult<()> {
        let relation_index = entity_index(relation);
        let target_index = entity_index(target);
        if relation_index > PAIR_RELATION_MAX as u64 || target_index > PAIR_TARGET_MAX as u64 {
            return Ok(());
        }
        match make_pair_id(relation_index as u32, target_index as u32) {
            Ok(pair) => self.submit_remove(entity, pair),
            Err(_) => Ok(()),
        }
    }

    /// Returns every alive entity the given relation points at from `entity`.
    ///
    /// Targets whose 16-bit index does not resolve to an alive entity (type
    /// targets among them) are skipped.
    pub fn relation_targets<R: Component>(&self, entity: EntityID) -> Vec<EntityID> {
        let Some(relation) = self.registry.lookup_type::<R>() else {
            return Vec::new();
        };
        if relation > PAIR_RELATION_MAX {
            return Vec::new();
        }
        let Some(record) = self.live_record(entity) else {
            return Vec::new();
        };
        self.archetypes[record.archetype as usize]
            .pairs_with_relation(relation)
            .filter_map(|pair| self.entity_index.entity_at_index(pair_target(pair) as u64))
            .collect()
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Relation traits
// ───────────────────────────────────────────────────────────────────────────

impl World {
    /// Returns the shadow entity anchoring traits of component type `R`,
    /// creating it on first use.
    pub fn type_entity<R: Component>(&mut self) -> ECSResult<EntityID> {
        let type_id = TypeId::of::<R>();
        if let Some(&existing) = self.type_entities.get(&type_id) {
            if self.entity_index.alive(existing) {
                return Ok(existing);
            }
        }
        self.registry.register::<R>()?;
        let entity = self.spawn()?;
        self.type_entities.insert(type_id, entity);
        Ok(entity)
    }

    /// Attaches trait marker `M` to relation type `R`.
    pub fn add_trait<R: Component, M: Component>(&mut self) -> ECSResult<()> {
        let anchor = self.type_entity::<R>()?;
        let marker: M = bytemuck::Zeroable::zeroed();
        self.add_component::<M>(anchor, marker)
    }

    /// Returns `true` if relation type `R` carries trait marker `M`.
    pub fn has_trait<R: Component, M: Component>(&self) -> bool {
        self.type_entities
            .get(&TypeId::of::<R>())
            .map(|&anchor| self.has_component::<M>(anchor))
            .unwrap_or(false)
    }

    fn relation_has_marker(&self, relation: u32, marker: ComponentID) -> bool {
        let Some(type_id) = self.registry.type_of(relation) else {
            return false;
        };
        let Some(&anchor) = self.type_entities.get(&type_id) else {
            return false;
        };
        self.live_record(anchor)
            .map(|record| self.archetypes[record.archetype as usize].has(marker))
            .unwrap_or(false)
    }

    fn relation_is_exclusive(&self, relation: u32) -> bool {
        match self.registry.lookup_type::<Exclusive>() {
            Some(marker) => self.relation_has_marker(relation, marker),
            None => false,
        }
    }

    fn cascade_relations(&self) -> Vec<u32> {
        let Some(marker) = self.registry.lookup_type::<Cascade>() else {
            return Vec::new();
        };
        let mut relations = Vec::new();
        for (&type_id, &anchor) in &self.type_entities {
            let carries = self
                .live_record(anchor)
                .map(|record| self.archetypes[record.archetype as usize].has(marker))
                .unwrap_or(false);
            if !carries {
                continue;
            }
            if let Some(relation) = self.registry.lookup(type_id) {
                if relation <= PAIR_RELATION_MAX {
                    relations.push(relation);
                }
            }
        }
        relations
    }

    /// Enqueues destroys for every alive carrier of a Cascade pair pointing
    /// at `target`. Liveness is re-checked at flush time, which bounds
    /// cyclic relation graphs.
    fn enqueue_cascade_destroys(&mut self, target: EntityID) {
        let target_index = entity_index(target);
        if target_index > PAIR_TARGET_MAX as u64 {
            return;
        }
        let relations = self.cascade_relations();
        if relations.is_empty() {
            return;
        }

        let mut victims: Vec<EntityID> = Vec::new();
        for relation in relations {
            let Ok(pair) = make_pair_id(relation, target_index as u32) else {
                continue;
            };
            for archetype in &self.archetypes {
                if archetype.has(pair) {
                    victims.extend_from_slice(archetype.entities());
                }
            }
        }
        for victim in victims {
            if victim != target && self.entity_index.alive(victim) {
                self.queue.push_back(DeferredOp::Destroy { entity: victim });
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Structural core
// ───────────────────────────────────────────────────────────────────────────

impl World {
    #[inline]
    fn deferring(&self) -> bool {
        self.iteration_depth > 0 || self.is_flushing
    }

    fn ensure_record_slot(&mut self, index: u64) {
        if self.records.len() <= index as usize {
            self.records.resize(index as usize + 1, EntityRecord::DEAD);
        }
    }

    fn live_record(&self, entity: EntityID) -> Option<EntityRecord> {
        if !self.entity_index.alive(entity) {
            return None;
        }
        let record = *self.records.get(entity_index(entity) as usize)?;
        debug_assert!(record.is_alive());
        Some(record)
    }

    fn archetype_at(&self, handle: ArchetypeHandle) -> Option<&Archetype> {
        let archetype = self.archetypes.get(handle.index as usize)?;
        (archetype.id() == handle.id).then_some(archetype)
    }

    fn get_or_create_archetype(&mut self, signature: Vec<ComponentID>) -> ECSResult<u32> {
        let id = crate::engine::types::hash_signature(&signature);
        if let Some(&index) = self.archetype_map.get(&id) {
            debug_assert_eq!(self.archetypes[index as usize].signature(), &signature[..]);
            return Ok(index);
        }

        let archetype = Archetype::new(signature, &self.registry)?;
        let index = self.archetypes.len() as u32;
        trace!("archetype {:#018x} created at index {}", archetype.id(), index);
        self.archetype_map.insert(id, index);
        self.archetypes.push(archetype);
        self.archetype_generation += 1;
        Ok(index)
    }

    /// Returns the add edge `from --component--> target`, creating it (and
    /// its reverse) on first use.
    fn add_edge(&mut self, from: u32, component_id: ComponentID) -> ECSResult<Edge> {
        if let Some(edge) = self.archetypes[from as usize].add_edges.get(&component_id) {
            return Ok(edge.clone());
        }

        let signature = self.archetypes[from as usize]
            .signature_with(component_id)
            .ok_or(ECSError::Internal("add edge requested for a present component"))?;
        let target = self.get_or_create_archetype(signature)?;

        let forward = self.archetypes[from as usize].column_map_into(&self.archetypes[target as usize]);
        let reverse = self.archetypes[target as usize].column_map_into(&self.archetypes[from as usize]);

        let edge = Edge { target, column_map: forward };
        self.archetypes[from as usize].add_edges.insert(component_id, edge.clone());
        self.archetypes[target as usize]
            .remove_edges
            .insert(component_id, Edge { target: from, column_map: reverse });
        Ok(edge)
    }

    /// Returns the remove edge `from --component--> target`, creating it
    /// (and its reverse) on first use.
    fn remove_edge(&mut self, from: u32, component_id: ComponentID) -> ECSResult<Edge> {
        if let Some(edge) = self.archetypes[from as usize].remove_edges.get(&component_id) {
            return Ok(edge.clone());
        }

        let signature = self.archetypes[from as usize]
            .signature_without(component_id)
            .ok_or(ECSError::Internal("remove edge requested for an absent component"))?;
        let target = self.get_or_create_archetype(signature)?;

        let forward = self.archetypes[from as usize].column_map_into(&self.archetypes[target as usize]);
        let reverse = self.archetypes[target as usize].column_map_into(&self.archetypes[from as usize]);

        let edge = Edge { target, column_map: forward };
        self.archetypes[from as usize].remove_edges.insert(component_id, edge.clone());
        self.archetypes[target as usize]
            .add_edges
            .insert(component_id, Edge { target: from, column_map: reverse });
        Ok(edge)
    }

    /// Split-borrows two distinct archetypes mutably.
    fn archetype_pair_mut(&mut self, a: u32, b: u32) -> (&mut Archetype, &mut Archetype) {
        debug_assert_ne!(a, b, "source and destination archetype must differ");
        let (left, right) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.archetypes.split_at_mut(right as usize);
        let left_reference = &mut head[left as usize];
        let right_reference = &mut tail[0];
        if a < b { (left_reference, right_reference) } else { (right_reference, left_reference) }
    }

    /// Moves an entity across an edge, preserving shared column data.
    ///
    /// Returns the entity's row in the destination.
    fn move_entity(
        &mut self,
        entity: EntityID,
        from: u32,
        source_row: usize,
        edge: &Edge,
    ) -> ECSResult<usize> {
        let to = edge.target;
        {
            let (source, destination) = self.archetype_pair_mut(from, to);
            let destination_row = destination.push_entity(entity);
            destination.copy_row_from(destination_row, source, source_row, &edge.column_map)?;

            let (removed, moved) = source.swap_remove_row(source_row)?;
            debug_assert_eq!(removed, entity);

            self.records[entity_index(entity) as usize] =
                EntityRecord { archetype: to, row: destination_row as RowID };
            if let Some(moved_entity) = moved {
                self.records[entity_index(moved_entity) as usize].row = source_row as RowID;
            }
            Ok(destination_row)
        }
    }

    fn submit_add(
        &mut self,
        entity: EntityID,
        component_id: ComponentID,
        data: Option<&[u8]>,
    ) -> ECSResult<()> {
        if self.deferring() {
            self.queue.push_back(DeferredOp::Add {
                entity,
                component_id,
                data: data.map(|bytes| bytes.to_vec().into_boxed_slice()),
            });
            return Ok(());
        }
        self.apply_add(entity, component_id, data)?;
        self.flush_if_idle()
    }

    fn submit_remove(&mut self, entity: EntityID, component_id: ComponentID) -> ECSResult<()> {
        if self.deferring() {
            self.queue.push_back(DeferredOp::Remove { entity, component_id });
            return Ok(());
        }
        self.apply_remove(entity, component_id)?;
        self.flush_if_idle()
    }

    fn apply_add(
        &mut self,
        entity: EntityID,
        component_id: ComponentID,
        data: Option<&[u8]>,
    ) -> ECSResult<()> {
        let Some(record) = self.live_record(entity) else {
            return Ok(());
        };

        // Present already: overwrite the payload in place, no move.
        if self.archetypes[record.archetype as usize].has(component_id) {
            if let Some(bytes) = data {
                if let Some(column) =
                    self.archetypes[record.archetype as usize].column_of_mut(component_id)
                {
                    column.write_row(record.row as usize, bytes)?;
                }
            }
            return Ok(());
        }

        // An Exclusive relation admits one pair at a time: drop the others
        // as part of this same add, even mid-flush.
        if is_pair(component_id) {
            let relation = pair_relation(component_id);
            if self.relation_is_exclusive(relation) {
                let existing: Vec<ComponentID> = self.archetypes[record.archetype as usize]
                    .pairs_with_relation(relation)
                    .filter(|&other| other != component_id)
                    .collect();
                for other in existing {
                    self.apply_remove(entity, other)?;
                }
            }
        }

        let Some(record) = self.live_record(entity) else {
            return Ok(());
        };
        let from = record.archetype;
        let edge = self.add_edge(from, component_id)?;
        let destination_row = self.move_entity(entity, from, record.row as usize, &edge)?;

        if let Some(bytes) = data {
            if let Some(column) =
                self.archetypes[edge.target as usize].column_of_mut(component_id)
            {
                column.write_row(destination_row, bytes)?;
            }
        }

        self.dispatch_transition(entity, Some(from), Some(edge.target));
        Ok(())
    }

    fn apply_remove(&mut self, entity: EntityID, component_id: ComponentID) -> ECSResult<()> {
        let Some(record) = self.live_record(entity) else {
            return Ok(());
        };
        if !self.archetypes[record.archetype as usize].has(component_id) {
            return Ok(());
        }

        let from = record.archetype;
        let edge = self.remove_edge(from, component_id)?;
        self.move_entity(entity, from, record.row as usize, &edge)?;

        self.dispatch_transition(entity, Some(from), Some(edge.target));
        Ok(())
    }

    fn apply_destroy(&mut self, entity: EntityID) -> ECSResult<()> {
        let Some(record) = self.live_record(entity) else {
            return Ok(());
        };

        self.enqueue_cascade_destroys(entity);

        let from = record.archetype;
        let (removed, moved) =
            self.archetypes[from as usize].swap_remove_row(record.row as usize)?;
        debug_assert_eq!(removed, entity);
        if let Some(moved_entity) = moved {
            self.records[entity_index(moved_entity) as usize].row = record.row;
        }

        self.records[entity_index(entity) as usize] = EntityRecord::DEAD;
        self.disabled.remove(&entity_index(entity));
        self.entity_index.destroy(entity);

        self.dispatch_transition(entity, Some(from), None);
        Ok(())
    }

    fn flush_if_idle(&mut self) -> ECSResult<()> {
        if self.iteration_depth == 0 && !self.is_flushing && !self.queue.is_empty() {
            self.flush_queue()?;
        }
        Ok(())
    }

    /// Applies queued ops in FIFO order; ops enqueued by observers or
    /// cascade collection during the pass join the same pass.
    fn flush_queue(&mut self) -> ECSResult<()> {
        if self.is_flushing {
            return Ok(());
        }
        self.is_flushing = true;

        let mut applied = 0usize;
        while let Some(op) = self.queue.pop_front() {
            applied += 1;
            let result = match op {
                DeferredOp::Add { entity, component_id, data } => {
                    self.apply_add(entity, component_id, data.as_deref())
                }
                DeferredOp::Remove { entity, component_id } => {
                    self.apply_remove(entity, component_id)
                }
                DeferredOp::Destroy { entity } => self.apply_destroy(entity),
            };
            if let Err(error) = result {
                self.is_flushing = false;
                return Err(error);
            }
        }
        self.is_flushing = false;

        if applied > 0 {
            debug!("flushed {} deferred ops", applied);
            if self.config.auto_cleanup {
                self.cleanup_empty_archetypes();
            }
        }
        Ok(())
    }

    /// Removes archetypes that hold no entities, compacting indices and
    /// rewriting edges, records, and the archetype map.
    fn cleanup_empty_archetypes(&mut self) {
        let mut remap: Vec<Option<u32>> = Vec::with_capacity(self.archetypes.len());
        let mut kept = 0u32;
        for (index, archetype) in self.archetypes.iter().enumerate() {
            if index == EMPTY_ARCHETYPE as usize || !archetype.is_empty() {
                remap.push(Some(kept));
                kept += 1;
            } else {
                remap.push(None);
            }
        }
        if kept as usize == self.archetypes.len() {
            return;
        }

        let removed = self.archetypes.len() - kept as usize;
        let old = std::mem::take(&mut self.archetypes);
        for (index, archetype) in old.into_iter().enumerate() {
            if remap[index].is_some() {
                self.archetypes.push(archetype);
            }
        }

        for archetype in &mut self.archetypes {
            archetype.add_edges.retain(|_, edge| match remap[edge.target as usize] {
                Some(new_target) => {
                    edge.target = new_target;
                    true
                }
                None => false,
            });
            archetype.remove_edges.retain(|_, edge| match remap[edge.target as usize] {
                Some(new_target) => {
                    edge.target = new_target;
                    true
                }
                None => false,
            });
        }

        self.archetype_map.clear();
        for (index, archetype) in self.archetypes.iter().enumerate() {
            self.archetype_map.insert(archetype.id(), index as u32);
        }

        for (index, archetype) in self.archetypes.iter().enumerate() {
            for (row, &entity) in archetype.entities().iter().enumerate() {
                self.records[entity_index(entity) as usize] =
                    EntityRecord { archetype: index as u32, row: row as RowID };
            }
        }

        self.archetype_generation += 1;
        trace!("removed {} empty archetypes", removed);
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Observers
// ───────────────────────────────────────────────────────────────────────────

impl World {
    /// Registers an observer; fires for matching transitions from now on.
    ///
    /// ## Errors
    /// `Contract` if the definition's terms contain wildcard pairs or `Any`
    /// groups: observers match plain component sets.
    pub fn observe<F>(&mut self, definition: ObserverDef, callback: F) -> ECSResult<ObserverID>
    where
        F: FnMut(&mut World, EntityID) + 'static,
    {
        let context = resolve_terms(&mut self.registry, &definition.terms)?;
        if !context.wildcard_terms.is_empty() || !context.any_of_groups.is_empty() {
            return Err(ContractViolationError {
                reason: "observers match plain component sets, not wildcards",
            }
            .into());
        }

        let mut required = context.required;
        required.sort_unstable();
        required.dedup();
        let mut excluded = context.excluded;
        excluded.sort_unstable();
        excluded.dedup();

        let id = self.next_observer_id;
        self.next_observer_id += 1;
        self.observers.push(Observer {
            id,
            event: definition.event,
            required,
            excluded,
            callback: Rc::new(RefCell::new(callback)),
        });
        Ok(id)
    }

    /// Unregisters an observer. Returns `false` for unknown handles.
    pub fn unobserve(&mut self, id: ObserverID) -> bool {
        let before = self.observers.len();
        self.observers.retain(|observer| observer.id != id);
        self.observers.len() != before
    }

    /// Fires observers whose matching boundary the transition crossed.
    ///
    /// Callbacks run with structural mutation forcibly deferred; a callback
    /// re-entered through its own mutations is skipped rather than recursed
    /// into.
    fn dispatch_transition(&mut self, entity: EntityID, from: Option<u32>, to: Option<u32>) {
        if self.observers.is_empty() {
            return;
        }

        let mut fired = Vec::new();
        for observer in &self.observers {
            let matches_from = from
                .map(|index| observer.matches(self.archetypes[index as usize].signature()))
                .unwrap_or(false);
            let matches_to = to
                .map(|index| observer.matches(self.archetypes[index as usize].signature()))
                .unwrap_or(false);
            let fires = match observer.event {
                ObserverEvent::OnAdd => !matches_from && matches_to,
                ObserverEvent::OnRemove => matches_from && !matches_to,
            };
            if fires {
                fired.push(observer.callback.clone());
            }
        }
        if fired.is_empty() {
            return;
        }

        self.iteration_depth += 1;
        for callback in fired {
            if let Ok(mut callback) = callback.try_borrow_mut() {
                (&mut *callback)(&mut *self, entity);
            }
        }
        self.iteration_depth -= 1;
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Queries
// ───────────────────────────────────────────────────────────────────────────

impl World {
    fn cached_query_for(&mut self, context: &QueryContext) -> ECSResult<CachedQuery> {
        let key = hash_context(context);
        if let Some(entry) = self.cache.get(key) {
            if entry.generation == self.archetype_generation {
                return Ok(entry.clone());
            }
        }

        let mut matched = Vec::new();
        for (index, archetype) in self.archetypes.iter().enumerate() {
            if archetype_matches(archetype, context) {
                matched.push(index as u32);
            }
        }

        let (depth_groups, max_depth) = if context.cascade_rel != 0 {
            self.build_depth_groups(context.cascade_rel, &matched)
        } else {
            (Vec::new(), 0)
        };

        trace!(
            "query cache rebuild: key {:#018x}, {} archetypes, generation {}",
            key,
            matched.len(),
            self.archetype_generation
        );

        let cached = CachedQuery {
            archetypes: matched,
            generation: self.archetype_generation,
            captures: context.captures.clone(),
            required: context.required.clone(),
            cascade_rel: context.cascade_rel,
            depth_groups,
            max_depth,
        };
        Ok(self.cache.insert(key, cached).clone())
    }

    /// Computes an entity's depth along a cascade relation, memoized.
    ///
    /// Depth is `0` without a pair of the relation, otherwise one more than
    /// the parent's depth. Cycles and nesting past the configured cap fall
    /// back to depth `0` for the offending ancestor.
    fn entity_depth(&self, relation: u32, entity: EntityID, memo: &mut HashMap<u64, u32>) -> u32 {
        let mut chain: Vec<u64> = Vec::new();
        let mut current = entity;
        let base: u32;

        loop {
            let index = entity_index(current);
            if let Some(&known) = memo.get(&index) {
                base = known;
                break;
            }
            if chain.iter().any(|&seen| seen == index)
                || chain.len() as u32 >= self.config.cascade_depth_cap
            {
                base = 0;
                break;
            }

            let pair = self
                .live_record(current)
                .and_then(|record| {
                    self.archetypes[record.archetype as usize].find_pair_with_relation(relation)
                });
            let Some(pair) = pair else {
                memo.insert(index, 0);
                base = 0;
                break;
            };

            chain.push(index);
            match self.entity_index.entity_at_index(pair_target(pair) as u64) {
                Some(parent) => current = parent,
                None => {
                    base = 0;
                    break;
                }
            }
        }

        if chain.is_empty() {
            return base;
        }
        let mut depth = base;
        for &index in chain.iter().rev() {
            depth += 1;
            memo.insert(index, depth);
        }
        depth
    }

    fn build_depth_groups(&self, relation: u32, matched: &[u32]) -> (Vec<Vec<u32>>, u32) {
        let mut memo: HashMap<u64, u32> = HashMap::new();
        let mut groups: Vec<Vec<u32>> = Vec::new();

        for &archetype_index in matched {
            let archetype = &self.archetypes[archetype_index as usize];
            let depth = archetype
                .entities()
                .iter()
                .map(|&entity| self.entity_depth(relation, entity, &mut memo))
                .min()
                .unwrap_or(0);
            if groups.len() <= depth as usize {
                groups.resize_with(depth as usize + 1, Vec::new);
            }
            groups[depth as usize].push(archetype_index);
        }

        let max_depth = groups.len().saturating_sub(1) as u32;
        (groups, max_depth)
    }

    fn iteration_order(cached: &CachedQuery) -> Vec<u32> {
        if cached.cascade_rel == 0 {
            return cached.archetypes.clone();
        }
        let mut order = Vec::with_capacity(cached.archetypes.len());
        for depth in 0..=cached.max_depth {
            if let Some(group) = cached.depth_groups.get(depth as usize) {
                order.extend_from_slice(group);
            }
        }
        order
    }

    fn begin_iteration(&mut self) -> ECSResult<()> {
        if self.iteration_depth == 0 && !self.is_flushing {
            self.flush_queue()?;
        }
        self.iteration_depth += 1;
        Ok(())
    }

    fn end_iteration(&mut self) -> ECSResult<()> {
        debug_assert!(self.iteration_depth > 0, "iteration scope underflow");
        self.iteration_depth = self.iteration_depth.saturating_sub(1);
        if self.iteration_depth == 0 && !self.is_flushing {
            self.flush_queue()?;
        }
        Ok(())
    }

    fn bind_captures(
        &self,
        archetype_index: u32,
        captures: &[(u32, u8)],
    ) -> [u64; MAX_QUERY_BINDINGS] {
        let mut bindings = [0u64; MAX_QUERY_BINDINGS];
        let archetype = &self.archetypes[archetype_index as usize];
        for &(relation, slot) in captures {
            if let Some(pair) = archetype.find_pair_with_relation(relation) {
                let target = pair_target(pair) as u64;
                bindings[slot as usize] =
                    self.entity_index.entity_at_index(target).unwrap_or(target);
            }
        }
        bindings
    }

    fn row_masked(&self, entity: EntityID, required: &[ComponentID]) -> bool {
        match self.disabled.get(&entity_index(entity)) {
            Some(set) => required.iter().any(|id| set.binary_search(id).is_ok()),
            None => false,
        }
    }

    /// Runs a callback for every entity matching the term list.
    ///
    /// The callback receives the world, so it may read components and
    /// request structural changes; changes are deferred and applied when the
    /// outermost iteration scope closes.
    pub fn each<F>(&mut self, terms: &[TermArg], callback: F) -> ECSResult<()>
    where
        F: FnMut(&mut World, QueryHit),
    {
        self.each_filtered(terms, QueryFlags::default(), callback)
    }

    /// [`World::each`] with explicit query flags.
    pub fn each_filtered<F>(
        &mut self,
        terms: &[TermArg],
        flags: QueryFlags,
        mut callback: F,
    ) -> ECSResult<()>
    where
        F: FnMut(&mut World, QueryHit),
    {
        // Flush before snapshotting the match list: the entry flush may
        // remove empty archetypes and remap indices.
        self.flush()?;
        let context = resolve_terms(&mut self.registry, terms)?;
        let cached = self.cached_query_for(&context)?;
        let order = Self::iteration_order(&cached);

        self.begin_iteration()?;
        for archetype_index in order {
            let bindings = self.bind_captures(archetype_index, &cached.captures);
            let handle = ArchetypeHandle {
                index: archetype_index,
                id: self.archetypes[archetype_index as usize].id(),
            };
            // Row count is pinned on entry: rows cannot move during the
            // scope, but entities spawned by the callback may append.
            let rows = self.archetypes[archetype_index as usize].len();
            for row in 0..rows {
                let entity = self.archetypes[archetype_index as usize].entities()[row];
                if !flags.include_disabled && self.row_masked(entity, &cached.required) {
                    continue;
                }
                callback(
                    &mut *self,
                    QueryHit { entity, archetype: handle, row: row as RowID, bindings },
                );
            }
        }
        self.end_iteration()
    }

    /// Returns the archetypes matching a term list.
    ///
    /// This does not open an iteration scope; handles are invalidated by
    /// the next structural change.
    pub fn query_archetypes(&mut self, terms: &[TermArg]) -> ECSResult<Vec<ArchetypeHandle>> {
        let context = resolve_terms(&mut self.registry, terms)?;
        let cached = self.cached_query_for(&context)?;
        Ok(Self::iteration_order(&cached)
            .into_iter()
            .map(|index| ArchetypeHandle { index, id: self.archetypes[index as usize].id() })
            .collect())
    }

    /// Opens a manual iteration over the term list.
    pub fn query_iter(&mut self, terms: &[TermArg]) -> ECSResult<QueryIter> {
        self.query_iter_filtered(terms, QueryFlags::default())
    }

    /// [`World::query_iter`] with explicit query flags.
    pub fn query_iter_filtered(
        &mut self,
        terms: &[TermArg],
        flags: QueryFlags,
    ) -> ECSResult<QueryIter> {
        // Flush before snapshotting the match list: the entry flush may
        // remove empty archetypes and remap indices.
        self.flush()?;
        let context = resolve_terms(&mut self.registry, terms)?;
        let cached = self.cached_query_for(&context)?;
        let order = Self::iteration_order(&cached);

        self.begin_iteration()?;
        Ok(QueryIter {
            order,
            captures: cached.captures,
            required: cached.required,
            include_disabled: flags.include_disabled,
            archetype_cursor: 0,
            row_cursor: 0,
            row_limit: 0,
            bindings: [0; MAX_QUERY_BINDINGS],
            bindings_ready: false,
            finished: false,
        })
    }

    /// Advances a manual iteration.
    ///
    /// Returns `Ok(None)` once exhausted, at which point the iteration
    /// scope has been released and the deferred queue flushed (when this
    /// was the outermost scope).
    pub fn query_next(&mut self, iter: &mut QueryIter) -> ECSResult<Option<QueryHit>> {
        if iter.finished {
            return Ok(None);
        }
        loop {
            let Some(&archetype_index) = iter.order.get(iter.archetype_cursor) else {
                iter.finished = true;
                self.end_iteration()?;
                return Ok(None);
            };

            if !iter.bindings_ready {
                iter.bindings = self.bind_captures(archetype_index, &iter.captures);
                iter.row_limit = self.archetypes[archetype_index as usize].len();
                iter.bindings_ready = true;
            }

            if iter.row_cursor >= iter.row_limit {
                iter.archetype_cursor += 1;
                iter.row_cursor = 0;
                iter.bindings_ready = false;
                continue;
            }

            let row = iter.row_cursor;
            iter.row_cursor += 1;

            let entity = self.archetypes[archetype_index as usize].entities()[row];
            if !iter.include_disabled && self.row_masked(entity, &iter.required) {
                continue;
            }

            return Ok(Some(QueryHit {
                entity,
                archetype: ArchetypeHandle {
                    index: archetype_index,
                    id: self.archetypes[archetype_index as usize].id(),
                },
                row: row as RowID,
                bindings: iter.bindings,
            }));
        }
    }

    /// Releases a manual iteration early.
    ///
    /// Exhausted iterations release themselves; for early exits this must
    /// be called exactly once so the iteration depth balances.
    pub fn query_finish(&mut self, mut iter: QueryIter) -> ECSResult<()> {
        if !iter.finished {
            iter.finished = true;
            self.end_iteration()?;
        }
        Ok(())
    }
}
