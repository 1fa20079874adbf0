//! The archetype store and the entity location index.
//!
//! [`ArchetypeStore`] owns every [`Archetype`] of a world in a growable list
//! and a side table mapping each live [`Entity`] to its [`EntityLocation`].
//! The side table is the single source of truth for where an entity's data
//! lives; every mutation of an archetype's row list updates exactly the
//! affected entries (the removed entity's exit and the moved entity's new
//! row).
//!
//! Archetypes are never deleted, even when they become empty. This keeps
//! every [`ArchetypeIndex`] stable, which [`crate::Query`] relies on to
//! extend its cache incrementally instead of invalidating it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::archetype::{Archetype, ArchetypeIndex, Layout};
use crate::component::{self, Component, ComponentRegistry, ComponentTypeId, Components};
use crate::entity::{Entity, EntityAllocator};
use crate::error::StorageError;

/// Identity of one world instance. Query caches are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldId(pub Uuid);

impl WorldId {
    /// A fresh random world identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorldId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an entity's component data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLocation {
    /// The archetype holding the entity.
    pub archetype: ArchetypeIndex,
    /// The entity's row inside that archetype.
    pub row: usize,
}

/// Serialisable image of an [`ArchetypeStore`].
///
/// The location index and layout lookup are derived data and are rebuilt on
/// restore. `components` records the registered component names in ID order
/// so a restore against a differently-registered world fails loudly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Registered component names, indexed by [`ComponentTypeId`].
    pub components: Vec<String>,
    /// Entity allocator high-water mark.
    pub allocator: EntityAllocator,
    /// Every archetype, in index order.
    pub archetypes: Vec<Archetype>,
}

/// Archetype list plus entity location index for one world.
#[derive(Debug)]
pub struct ArchetypeStore {
    world_id: WorldId,
    allocator: EntityAllocator,
    archetypes: Vec<Archetype>,
    by_layout: HashMap<Layout, ArchetypeIndex>,
    locations: HashMap<Entity, EntityLocation>,
}

impl ArchetypeStore {
    /// Create an empty store with a fresh [`WorldId`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_world_id(WorldId::new())
    }

    /// Create an empty store with the given identity.
    #[must_use]
    pub fn with_world_id(world_id: WorldId) -> Self {
        Self {
            world_id,
            allocator: EntityAllocator::new(),
            archetypes: Vec::new(),
            by_layout: HashMap::new(),
            locations: HashMap::new(),
        }
    }

    /// The identity query caches use for this store.
    #[must_use]
    pub fn world_id(&self) -> WorldId {
        self.world_id
    }

    // -- Entity lifecycle --

    /// Create an entity carrying the components in `components`.
    ///
    /// # Errors
    ///
    /// Fails if the bundle is empty, names an unregistered component, repeats
    /// a component, or a value failed to encode.
    pub fn create_entity(
        &mut self,
        registry: &ComponentRegistry,
        components: Components,
    ) -> Result<Entity, StorageError> {
        let resolved = components.resolve(registry)?;
        let mut values = BTreeMap::new();
        for (type_id, bytes) in resolved {
            if values.insert(type_id, bytes).is_some() {
                return Err(StorageError::RepeatedComponent(
                    registry.name_of(type_id).to_string(),
                ));
            }
        }
        self.create_raw(values)
    }

    /// Create an entity from already-encoded values.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::EmptyLayout`] if `values` is empty.
    pub fn create_raw(
        &mut self,
        values: BTreeMap<ComponentTypeId, Vec<u8>>,
    ) -> Result<Entity, StorageError> {
        if values.is_empty() {
            return Err(StorageError::EmptyLayout);
        }
        let layout = Layout::new(values.keys().copied());
        let entity = self.allocator.allocate();
        let archetype = self.archetype_for(layout);
        let row = self.archetypes[archetype.0].push(entity, values);
        self.locations
            .insert(entity, EntityLocation { archetype, row });
        trace!(%entity, %archetype, row, "created entity");
        Ok(entity)
    }

    /// Remove an entity and all its components. Its ID is retired.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::EntityNotFound`] if the entity is not live.
    pub fn remove_entity(&mut self, entity: Entity) -> Result<(), StorageError> {
        self.detach(entity)?;
        trace!(%entity, "removed entity");
        Ok(())
    }

    /// Returns `true` if `entity` is live.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.locations.contains_key(&entity)
    }

    /// The location of a live entity.
    #[must_use]
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        self.locations.get(&entity).copied()
    }

    /// The layout of a live entity.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::EntityNotFound`].
    pub fn layout_of(&self, entity: Entity) -> Result<&Layout, StorageError> {
        let loc = self.locate(entity)?;
        Ok(&self.archetypes[loc.archetype.0].layout)
    }

    // -- Component access --

    /// Encoded value of `type_id` on `entity`.
    ///
    /// # Errors
    ///
    /// [`StorageError::EntityNotFound`] or [`StorageError::ComponentNotPresent`].
    pub fn get_raw(&self, entity: Entity, type_id: ComponentTypeId) -> Result<&[u8], StorageError> {
        let loc = self.locate(entity)?;
        self.archetypes[loc.archetype.0]
            .get(loc.row, type_id)
            .ok_or_else(|| not_present(entity, type_id, None))
    }

    /// Overwrite the encoded value of `type_id` on `entity`.
    ///
    /// # Errors
    ///
    /// [`StorageError::EntityNotFound`] or [`StorageError::ComponentNotPresent`].
    pub fn set_raw(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
        bytes: Vec<u8>,
    ) -> Result<(), StorageError> {
        let loc = self.locate(entity)?;
        if self.archetypes[loc.archetype.0].set(loc.row, type_id, bytes) {
            Ok(())
        } else {
            Err(not_present(entity, type_id, None))
        }
    }

    /// Decoded value of component `T` on `entity`.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unregistered, the entity is not live, the component is
    /// not present, or the stored bytes do not decode as `T`.
    pub fn get<T: Component>(
        &self,
        registry: &ComponentRegistry,
        entity: Entity,
    ) -> Result<T, StorageError> {
        let type_id = registry.id_of::<T>()?;
        let bytes = self
            .get_raw(entity, type_id)
            .map_err(|e| name_missing::<T>(e, entity))?;
        component::decode(bytes)
    }

    /// Overwrite component `T` on `entity`.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unregistered, the entity is not live, or the
    /// component is not present.
    pub fn set<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        entity: Entity,
        value: &T,
    ) -> Result<(), StorageError> {
        let type_id = registry.id_of::<T>()?;
        let bytes = component::encode(value)?;
        self.set_raw(entity, type_id, bytes)
            .map_err(|e| name_missing::<T>(e, entity))
    }

    /// Returns whether `entity` carries `type_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::EntityNotFound`].
    pub fn has_component(&self, entity: Entity, type_id: ComponentTypeId) -> Result<bool, StorageError> {
        Ok(self.layout_of(entity)?.contains(type_id))
    }

    /// Attach component `T` to `entity`, migrating it to the archetype of
    /// its new layout.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unregistered, the entity is not live, or `T` is
    /// already present.
    pub fn add_component<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        entity: Entity,
        value: &T,
    ) -> Result<(), StorageError> {
        let type_id = registry.id_of::<T>()?;
        if self.has_component(entity, type_id)? {
            return Err(StorageError::ComponentAlreadyPresent {
                entity,
                component: T::type_name().to_string(),
            });
        }
        let bytes = component::encode(value)?;
        let mut values = self.detach(entity)?;
        values.insert(type_id, bytes);
        self.attach(entity, values);
        Ok(())
    }

    /// Detach component `T` from `entity` and return its last value. The
    /// entity migrates to the archetype of its new layout.
    ///
    /// # Errors
    ///
    /// Fails if `T` is unregistered, the entity is not live, `T` is not
    /// present, or `T` is the entity's only component.
    pub fn remove_component<T: Component>(
        &mut self,
        registry: &ComponentRegistry,
        entity: Entity,
    ) -> Result<T, StorageError> {
        let type_id = registry.id_of::<T>()?;
        let layout = self.layout_of(entity)?;
        if !layout.contains(type_id) {
            return Err(not_present(entity, type_id, Some(T::type_name())));
        }
        if layout.len() == 1 {
            return Err(StorageError::EmptyLayout);
        }
        let mut values = self.detach(entity)?;
        let removed = values.remove(&type_id).unwrap_or_default();
        self.attach(entity, values);
        component::decode(&removed)
    }

    // -- Archetypes --

    /// All archetypes, in index order.
    #[must_use]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// The archetype at `index`.
    #[must_use]
    pub fn archetype(&self, index: ArchetypeIndex) -> Option<&Archetype> {
        self.archetypes.get(index.0)
    }

    /// Number of archetypes ever created.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.locations.len()
    }

    /// Verify that every live entity has exactly one location and that the
    /// archetype row at that location holds the entity.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexCorrupted`] describing the first
    /// inconsistency found.
    pub fn check_integrity(&self) -> Result<(), StorageError> {
        let mut seen = HashSet::new();
        for archetype in &self.archetypes {
            for column in &archetype.columns {
                if column.len() != archetype.len() {
                    return Err(StorageError::IndexCorrupted(format!(
                        "{} column {} has {} values for {} rows",
                        archetype.index,
                        column.type_id,
                        column.len(),
                        archetype.len()
                    )));
                }
            }
            for (row, &entity) in archetype.entities.iter().enumerate() {
                if !seen.insert(entity) {
                    return Err(StorageError::IndexCorrupted(format!(
                        "{entity} stored more than once"
                    )));
                }
                let expected = EntityLocation {
                    archetype: archetype.index,
                    row,
                };
                if self.locations.get(&entity) != Some(&expected) {
                    return Err(StorageError::IndexCorrupted(format!(
                        "{entity} at {} row {row} is indexed as {:?}",
                        archetype.index,
                        self.locations.get(&entity)
                    )));
                }
            }
        }
        if seen.len() != self.locations.len() {
            return Err(StorageError::IndexCorrupted(format!(
                "{} indexed entities but {} stored",
                self.locations.len(),
                seen.len()
            )));
        }
        Ok(())
    }

    // -- Persistence --

    /// Capture the complete store state.
    #[must_use]
    pub fn snapshot(&self, registry: &ComponentRegistry) -> StoreSnapshot {
        StoreSnapshot {
            components: registry.iter().map(|m| m.name.clone()).collect(),
            allocator: self.allocator.clone(),
            archetypes: self.archetypes.clone(),
        }
    }

    /// Rebuild a store from a snapshot taken against an identically
    /// registered component set.
    ///
    /// # Errors
    ///
    /// [`StorageError::SnapshotMismatch`] if the registry disagrees with the
    /// snapshot, [`StorageError::CorruptSnapshot`] if the snapshot is
    /// internally inconsistent.
    pub fn restore(
        snapshot: StoreSnapshot,
        registry: &ComponentRegistry,
    ) -> Result<Self, StorageError> {
        for (i, expected) in snapshot.components.iter().enumerate() {
            let id = ComponentTypeId(i as u32);
            let found = registry.meta(id).map(|m| m.name.clone()).unwrap_or_default();
            if &found != expected {
                return Err(StorageError::SnapshotMismatch {
                    id,
                    expected: expected.clone(),
                    found,
                });
            }
        }

        let mut store = Self::new();
        store.allocator = snapshot.allocator;
        for (position, archetype) in snapshot.archetypes.into_iter().enumerate() {
            if archetype.index != ArchetypeIndex(position) {
                return Err(StorageError::CorruptSnapshot(format!(
                    "{} stored at position {position}",
                    archetype.index
                )));
            }
            for type_id in archetype.layout.iter() {
                if type_id.0 as usize >= snapshot.components.len() {
                    return Err(StorageError::UnknownComponentId(type_id));
                }
            }
            for (row, &entity) in archetype.entities.iter().enumerate() {
                if !store.allocator.issued(entity) {
                    return Err(StorageError::CorruptSnapshot(format!(
                        "{entity} was never allocated"
                    )));
                }
                let loc = EntityLocation {
                    archetype: archetype.index,
                    row,
                };
                if store.locations.insert(entity, loc).is_some() {
                    return Err(StorageError::CorruptSnapshot(format!(
                        "{entity} stored more than once"
                    )));
                }
            }
            if store
                .by_layout
                .insert(archetype.layout.clone(), archetype.index)
                .is_some()
            {
                return Err(StorageError::CorruptSnapshot(format!(
                    "duplicate layout at {}",
                    archetype.index
                )));
            }
            store.archetypes.push(archetype);
        }
        store
            .check_integrity()
            .map_err(|e| StorageError::CorruptSnapshot(e.to_string()))?;
        debug!(
            archetypes = store.archetype_count(),
            entities = store.entity_count(),
            "restored archetype store"
        );
        Ok(store)
    }

    // -- Internals --

    fn locate(&self, entity: Entity) -> Result<EntityLocation, StorageError> {
        self.location(entity)
            .ok_or(StorageError::EntityNotFound(entity))
    }

    /// Get or create the archetype for `layout`.
    fn archetype_for(&mut self, layout: Layout) -> ArchetypeIndex {
        if let Some(&index) = self.by_layout.get(&layout) {
            return index;
        }
        let index = ArchetypeIndex(self.archetypes.len());
        debug!(%index, components = layout.len(), "created archetype");
        self.archetypes.push(Archetype::new(index, layout.clone()));
        self.by_layout.insert(layout, index);
        index
    }

    /// Take `entity` out of its archetype, fixing up the moved entity's
    /// location, and return its values.
    fn detach(
        &mut self,
        entity: Entity,
    ) -> Result<BTreeMap<ComponentTypeId, Vec<u8>>, StorageError> {
        let loc = self
            .locations
            .remove(&entity)
            .ok_or(StorageError::EntityNotFound(entity))?;
        let removed = self.archetypes[loc.archetype.0].swap_remove(loc.row);
        if let Some(moved) = removed.moved {
            self.locations.insert(moved, loc);
        }
        Ok(removed.values)
    }

    /// Place an existing entity into the archetype matching `values`.
    fn attach(&mut self, entity: Entity, values: BTreeMap<ComponentTypeId, Vec<u8>>) {
        let archetype = self.archetype_for(Layout::new(values.keys().copied()));
        let row = self.archetypes[archetype.0].push(entity, values);
        self.locations
            .insert(entity, EntityLocation { archetype, row });
    }
}

impl Default for ArchetypeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn not_present(entity: Entity, type_id: ComponentTypeId, name: Option<&str>) -> StorageError {
    StorageError::ComponentNotPresent {
        entity,
        component: name.map_or_else(|| format!("#{type_id}"), str::to_string),
    }
}

/// Replace the numeric placeholder in a [`StorageError::ComponentNotPresent`]
/// with `T`'s name.
fn name_missing<T: Component>(err: StorageError, entity: Entity) -> StorageError {
    match err {
        StorageError::ComponentNotPresent { .. } => StorageError::ComponentNotPresent {
            entity,
            component: T::type_name().to_string(),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Health(i64);

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Attack(i64);

    impl Component for Attack {
        fn type_name() -> &'static str {
            "Attack"
        }
    }

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.register::<Health>().unwrap();
        registry.register::<Attack>().unwrap();
        registry
    }

    #[test]
    fn test_create_places_entities_by_layout() {
        let registry = registry();
        let mut store = ArchetypeStore::new();
        let a = store
            .create_entity(&registry, Components::new().with(Health(10)))
            .unwrap();
        let b = store
            .create_entity(&registry, Components::new().with(Attack(1)).with(Health(5)))
            .unwrap();
        let c = store
            .create_entity(&registry, Components::new().with(Health(5)).with(Attack(2)))
            .unwrap();

        assert_eq!(store.archetype_count(), 2);
        assert_eq!(store.location(a).unwrap().archetype, ArchetypeIndex(0));
        assert_eq!(store.location(b).unwrap().archetype, ArchetypeIndex(1));
        assert_eq!(store.location(c).unwrap(), EntityLocation {
            archetype: ArchetypeIndex(1),
            row: 1
        });
        assert_eq!(store.get::<Attack>(&registry, c).unwrap(), Attack(2));
    }

    #[test]
    fn test_remove_reindexes_moved_entity() {
        let registry = registry();
        let mut store = ArchetypeStore::new();
        let entities: Vec<Entity> = (0..3)
            .map(|i| {
                store
                    .create_entity(&registry, Components::new().with(Health(i)))
                    .unwrap()
            })
            .collect();

        store.remove_entity(entities[0]).unwrap();
        assert_eq!(store.location(entities[2]).unwrap().row, 0);
        assert_eq!(store.get::<Health>(&registry, entities[2]).unwrap(), Health(2));
        assert!(matches!(
            store.get::<Health>(&registry, entities[0]),
            Err(StorageError::EntityNotFound(_))
        ));
        store.check_integrity().unwrap();
    }

    #[test]
    fn test_removed_ids_are_not_reused() {
        let registry = registry();
        let mut store = ArchetypeStore::new();
        let a = store
            .create_entity(&registry, Components::new().with(Health(1)))
            .unwrap();
        store.remove_entity(a).unwrap();
        let b = store
            .create_entity(&registry, Components::new().with(Health(1)))
            .unwrap();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_missing_component_is_recoverable() {
        let registry = registry();
        let mut store = ArchetypeStore::new();
        let e = store
            .create_entity(&registry, Components::new().with(Health(1)))
            .unwrap();
        let err = store.get::<Attack>(&registry, e).unwrap_err();
        assert!(
            matches!(err, StorageError::ComponentNotPresent { ref component, .. } if component == "Attack")
        );
        assert!(store.set(&registry, e, &Attack(3)).is_err());
        assert_eq!(store.get::<Health>(&registry, e).unwrap(), Health(1));
    }

    #[test]
    fn test_empty_and_repeated_bundles_rejected() {
        let registry = registry();
        let mut store = ArchetypeStore::new();
        assert!(matches!(
            store.create_entity(&registry, Components::new()),
            Err(StorageError::EmptyLayout)
        ));
        assert!(matches!(
            store.create_entity(&registry, Components::new().with(Health(1)).with(Health(2))),
            Err(StorageError::RepeatedComponent(_))
        ));
        assert_eq!(store.archetype_count(), 0);
    }

    #[test]
    fn test_add_and_remove_component_migrate() {
        let registry = registry();
        let mut store = ArchetypeStore::new();
        let e = store
            .create_entity(&registry, Components::new().with(Health(7)))
            .unwrap();
        let other = store
            .create_entity(&registry, Components::new().with(Health(8)))
            .unwrap();

        store.add_component(&registry, e, &Attack(4)).unwrap();
        assert_eq!(store.location(e).unwrap().archetype, ArchetypeIndex(1));
        assert_eq!(store.location(other).unwrap().row, 0);
        assert_eq!(store.get::<Health>(&registry, e).unwrap(), Health(7));
        assert!(store.add_component(&registry, e, &Attack(5)).is_err());

        let removed: Attack = store.remove_component(&registry, e).unwrap();
        assert_eq!(removed, Attack(4));
        assert_eq!(store.location(e).unwrap().archetype, ArchetypeIndex(0));
        assert!(matches!(
            store.remove_component::<Health>(&registry, e),
            Err(StorageError::EmptyLayout)
        ));
        // The emptied archetype is kept.
        assert_eq!(store.archetype_count(), 2);
        store.check_integrity().unwrap();
    }

    #[test]
    fn test_location_invariant_under_churn() {
        let registry = registry();
        let mut store = ArchetypeStore::new();
        let mut live = Vec::new();
        // Deterministic pseudo-random create/remove sequence.
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        for step in 0..500 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            if live.is_empty() || state % 3 != 0 {
                let bundle = if state % 2 == 0 {
                    Components::new().with(Health(step))
                } else {
                    Components::new().with(Health(step)).with(Attack(step))
                };
                live.push(store.create_entity(&registry, bundle).unwrap());
            } else {
                let victim = live.swap_remove((state as usize / 3) % live.len());
                store.remove_entity(victim).unwrap();
            }
            store.check_integrity().unwrap();
        }
        assert_eq!(store.entity_count(), live.len());
        for e in live {
            let loc = store.location(e).unwrap();
            assert_eq!(store.archetype(loc.archetype).unwrap().entities[loc.row], e);
        }
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let registry = registry();
        let mut store = ArchetypeStore::new();
        let a = store
            .create_entity(&registry, Components::new().with(Health(1)).with(Attack(9)))
            .unwrap();
        let b = store
            .create_entity(&registry, Components::new().with(Health(2)))
            .unwrap();
        store.remove_entity(a).unwrap();

        let bytes = rmp_serde::to_vec(&store.snapshot(&registry)).unwrap();
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&bytes).unwrap();
        let mut restored = ArchetypeStore::restore(snapshot, &registry).unwrap();

        assert_eq!(restored.archetype_count(), 2);
        assert_eq!(restored.location(b), store.location(b));
        assert_eq!(restored.get::<Health>(&registry, b).unwrap(), Health(2));
        let c = restored
            .create_entity(&registry, Components::new().with(Health(3)))
            .unwrap();
        assert_eq!(c, Entity(3));
    }

    #[test]
    fn test_restore_rejects_mismatched_registry() {
        let registry = registry();
        let mut store = ArchetypeStore::new();
        store
            .create_entity(&registry, Components::new().with(Health(1)))
            .unwrap();
        let snapshot = store.snapshot(&registry);

        let mut other = ComponentRegistry::new();
        other.register::<Attack>().unwrap();
        other.register::<Health>().unwrap();
        assert!(matches!(
            ArchetypeStore::restore(snapshot, &other),
            Err(StorageError::SnapshotMismatch { .. })
        ));
    }
}
