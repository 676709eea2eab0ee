//! The entity registry.
//!
//! The registry owns the entity slot table and one `TypedByteArena` per
//! component type. An entity's ID is its row in every pool, so every pool is
//! kept exactly as long as the slot table: adding a slot pushes an invalid row
//! onto every pool, and a pool created late is padded out to the current slot
//! count.

use std::collections::{BTreeSet, HashMap};

use crate::arena::{TypedByteArena, DEFAULT_GROWTH};
use crate::component::{Component, ComponentTypeID, Tag};
use crate::component_data::ComponentValueRef;
use crate::entity::Entity;
use crate::error::{Error, Result};

/// Settings for an `EntityRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Rows reserved by a new pool, and the first growth step of its buffer.
    pub initial_growth: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            initial_growth: DEFAULT_GROWTH,
        }
    }
}

/// Owner of all entities and their component pools.
pub struct EntityRegistry {
    config: RegistryConfig,
    entities: Vec<Entity>,
    free: BTreeSet<usize>,
    arenas: HashMap<ComponentTypeID, TypedByteArena>,
    pub(crate) required_tags: Vec<ComponentTypeID>,
}

impl EntityRegistry {
    /// Create an empty registry with the default settings.
    pub fn new() -> EntityRegistry {
        EntityRegistry::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with the given settings.
    pub fn with_config(config: RegistryConfig) -> EntityRegistry {
        EntityRegistry {
            config,
            entities: Vec::new(),
            free: BTreeSet::new(),
            arenas: HashMap::new(),
            required_tags: Vec::new(),
        }
    }

    /// Return the settings this registry was created with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Return the number of entity slots, live or freed.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no entity has ever been created.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Return the number of live entities.
    pub fn live_count(&self) -> usize {
        self.entities.len() - self.free.len()
    }

    /// Iterate over the live entities in ID order.
    pub fn entities(&self) -> impl Iterator<Item=Entity> + '_ {
        self.entities.iter().copied().filter(|e| !e.is_none())
    }

    /// Returns true if `entity` refers to a live entity.
    pub fn is_alive(&self, entity: Entity) -> bool {
        !entity.is_none() && self.entities.get(entity.id()) == Some(&entity)
    }

    /// Create a new entity.
    ///
    /// The lowest freed ID is reused if there is one, otherwise a new slot is
    /// appended and every pool grows by an invalid row.
    pub fn create_entity(&mut self) -> Entity {
        if let Some(id) = self.free.pop_first() {
            let entity = Entity::new(id);
            self.entities[id] = entity;
            log::trace!("reused slot for {}", entity);
            return entity;
        }

        let entity = Entity::new(self.entities.len());
        self.entities.push(entity);

        for arena in self.arenas.values_mut() {
            arena.push_row(false);
        }

        log::trace!("appended slot for {}", entity);
        entity
    }

    /// Destroy an entity, dropping all of its components.
    ///
    /// Destroying an entity which is not alive does nothing.
    pub fn destroy_entity(&mut self, entity: Entity) {
        if !self.is_alive(entity) {
            return;
        }

        let id = entity.id();
        self.entities[id] = Entity::NONE;
        self.free.insert(id);

        for arena in self.arenas.values_mut() {
            arena.invalidate(id);
        }

        log::trace!("destroyed {}", entity);
    }

    /// Get the pool for a component type, creating it if this is the first time
    /// the type has been attached.
    fn arena_entry(&mut self, type_id: ComponentTypeID) -> &mut TypedByteArena {
        let rows = self.entities.len();
        let growth = self.config.initial_growth;

        self.arenas.entry(type_id).or_insert_with(|| {
            let registration = type_id.registration();
            log::debug!("creating pool for {} ({} bytes, {} rows)",
                        registration.name(), registration.layout().size(), rows);

            let mut arena = TypedByteArena::from_layout(registration.layout(), growth);
            for _ in 0..rows {
                arena.push_row(false);
            }
            arena
        })
    }

    /// Attach a component to an entity, replacing any existing value.
    ///
    /// Attaching to an entity which is not alive does nothing.
    pub fn add_component<T: Component>(&mut self, entity: Entity, component: T) -> Result<()> {
        self.set_raw(entity, ComponentValueRef::from(&component))
    }

    /// Attach a tag to an entity.
    pub fn add_tag<T: Tag>(&mut self, entity: Entity, tag: T) -> Result<()> {
        self.add_component(entity, tag)
    }

    /// Attach a type-erased component value to an entity.
    pub fn set_raw(&mut self, entity: Entity, value: ComponentValueRef<'_>) -> Result<()> {
        if !self.is_alive(entity) {
            log::debug!("ignoring {:?} for dead {}", value.type_id(), entity);
            return Ok(());
        }

        self.arena_entry(value.type_id()).assign_value(value, entity.id(), true)
    }

    /// Copy a component out of an entity.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<T> {
        if !self.is_alive(entity) {
            return None;
        }

        match self.arenas.get(&T::type_id())?.read::<T>(entity.id()) {
            Ok(read) => read.into_option(),
            Err(err) => {
                log::error!("reading {}: {}", entity, err);
                None
            }
        }
    }

    /// Returns true if the entity currently has a component of type `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.is_alive(entity) && self.arenas.get(&T::type_id())
            .map_or(false, |arena| arena.is_valid_at(entity.id()))
    }

    /// Detach a component from an entity. Does nothing if it is absent.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) {
        self.remove_raw(entity, T::type_id())
    }

    /// Detach a component by type ID.
    pub fn remove_raw(&mut self, entity: Entity, type_id: ComponentTypeID) {
        if !self.is_alive(entity) {
            return;
        }

        if let Some(arena) = self.arenas.get_mut(&type_id) {
            arena.invalidate(entity.id());
        }
    }

    /// Get the pool holding components of type `T`, if one has been created.
    pub fn arena<T: Component>(&self) -> Option<&TypedByteArena> {
        self.arenas.get(&T::type_id())
    }

    /// Get the pool for a component type ID, if one has been created.
    pub fn arena_by_id(&self, type_id: ComponentTypeID) -> Option<&TypedByteArena> {
        self.arenas.get(&type_id)
    }

    /// Iterate over every component type which has a pool.
    pub fn component_types(&self) -> impl Iterator<Item=ComponentTypeID> + '_ {
        self.arenas.keys().copied()
    }

    /// View all rows of the pool for `T`, one element per entity slot.
    ///
    /// Only elements at rows which are valid in the pool hold real components.
    pub fn typed_view<T: Component>(&mut self) -> Result<&mut [T]> {
        self.arenas.get_mut(&T::type_id())
            .ok_or(Error::UninitializedStorage)?
            .typed_view::<T>()
    }

    pub(crate) fn is_valid_at(&self, type_id: ComponentTypeID, row: usize) -> bool {
        self.arenas.get(&type_id).map_or(false, |arena| arena.is_valid_at(row))
    }

    pub(crate) fn take_arena(&mut self, type_id: ComponentTypeID) -> Option<TypedByteArena> {
        self.arenas.remove(&type_id)
    }

    pub(crate) fn restore_arena(&mut self, type_id: ComponentTypeID, arena: TypedByteArena) {
        self.arenas.insert(type_id, arena);
    }

    /// Release trailing freed slots and excess pool capacity.
    ///
    /// This reallocates every pool, so it belongs between frames.
    pub fn compact(&mut self) {
        while self.entities.last().map_or(false, |e| e.is_none()) {
            self.entities.pop();
        }

        let slots = self.entities.len();
        self.free.retain(|id| *id < slots);

        for arena in self.arenas.values_mut() {
            arena.compact();
            while arena.len() < slots {
                arena.push_row(false);
            }
        }

        log::debug!("compacted registry to {} slots across {} pools", slots, self.arenas.len());
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        EntityRegistry::new()
    }
}
