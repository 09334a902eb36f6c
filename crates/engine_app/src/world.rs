//! World state owned by the driver.
//!
//! The [`World`] holds the entity table, the id allocator, the component
//! registry, and the per-type component tables every pipeline node reads
//! from. It is only mutated between ticks, on the driver thread.

use std::collections::HashMap;

use engine_component::{
    BoxedComponent, Component, ComponentMeta, ComponentRecord, ComponentRef, ComponentRegistry,
    ComponentTables, ComponentTypeId, Entity, EntityAllocator,
};
use engine_system::CommandError;

/// Entities, their component types, and the component storage.
#[derive(Debug, Default)]
pub struct World {
    /// Entity ID allocator.
    allocator: EntityAllocator,
    /// Component types owned by each live entity, kept sorted.
    entities: HashMap<Entity, Vec<ComponentTypeId>>,
    /// Decoders for component records.
    registry: ComponentRegistry,
    /// One table per registered component type.
    tables: ComponentTables,
}

impl World {
    /// Create a new empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` and create its table. Returns `true` if `T` was new.
    ///
    /// # Errors
    ///
    /// Returns [`engine_component::ComponentError::TypeIdCollision`] if
    /// another type owns the same id.
    pub fn register_component<T: Component>(
        &mut self,
    ) -> Result<bool, engine_component::ComponentError> {
        let meta = ComponentMeta::of::<T>();
        let added = self.registry.register_meta(meta)?;
        self.tables.ensure(meta.type_id, meta.name);
        Ok(added)
    }

    /// The component registry.
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// The component tables.
    #[must_use]
    pub fn tables(&self) -> &ComponentTables {
        &self.tables
    }

    /// Decode a record through the registry.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Component`] for unknown or malformed records.
    pub fn decode(&self, record: &ComponentRecord) -> Result<BoxedComponent, CommandError> {
        Ok(self.registry.decode(record)?)
    }

    /// Allocate an entity and store `components` for it.
    ///
    /// Nothing is stored if any component is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Component`] if a component type is not
    /// registered, or [`CommandError::DuplicateComponent`] if two components
    /// share a type.
    pub fn spawn(&mut self, components: Vec<BoxedComponent>) -> Result<Entity, CommandError> {
        let mut types: Vec<ComponentTypeId> = components
            .iter()
            .map(|component| component.type_id_dyn())
            .collect();
        for &type_id in &types {
            if self.tables.get(type_id).is_none() {
                return Err(engine_component::ComponentError::UnknownType(type_id).into());
            }
        }
        types.sort_unstable();
        if let Some(pair) = types.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(CommandError::DuplicateComponent(pair[0]));
        }

        let entity = self.allocator.allocate();
        for component in components {
            self.store(entity, component)?;
        }
        self.entities.insert(entity, types);
        Ok(entity)
    }

    /// Destroy `entity` and drop all its components.
    ///
    /// Returns `false` if the entity does not exist.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        let Some(types) = self.entities.remove(&entity) else {
            return false;
        };
        for type_id in types {
            if let Some(table) = self.tables.get(type_id) {
                table.write().remove(entity);
            }
        }
        self.allocator.release(entity);
        true
    }

    /// Attach `component` to an existing entity.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::EntityNotFound`], [`CommandError::ComponentExists`],
    /// or [`CommandError::Component`] for unregistered types.
    pub fn insert(&mut self, entity: Entity, component: BoxedComponent) -> Result<(), CommandError> {
        let type_id = component.type_id_dyn();
        let types = self
            .entities
            .get(&entity)
            .ok_or(CommandError::EntityNotFound(entity))?;
        let Err(index) = types.binary_search(&type_id) else {
            return Err(CommandError::ComponentExists { entity, type_id });
        };
        self.store(entity, component)?;
        if let Some(types) = self.entities.get_mut(&entity) {
            types.insert(index, type_id);
        }
        Ok(())
    }

    /// Detach the component of `type_id` from `entity`.
    ///
    /// Returns `false` if the entity does not own one.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::EntityNotFound`] if the entity does not exist.
    pub fn remove(&mut self, entity: Entity, type_id: ComponentTypeId) -> Result<bool, CommandError> {
        let types = self
            .entities
            .get_mut(&entity)
            .ok_or(CommandError::EntityNotFound(entity))?;
        let Ok(index) = types.binary_search(&type_id) else {
            return Ok(false);
        };
        types.remove(index);
        if let Some(table) = self.tables.get(type_id) {
            table.write().remove(entity);
        }
        Ok(true)
    }

    /// Overwrite the value of a component `entity` already owns.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::ComponentMissing`] if the entity does not own
    /// a component of that type.
    pub fn replace(&mut self, entity: Entity, component: BoxedComponent) -> Result<(), CommandError> {
        let type_id = component.type_id_dyn();
        let cell = self
            .component(entity, type_id)
            .ok_or(CommandError::ComponentMissing { entity, type_id })?;
        cell.replace(component)?;
        Ok(())
    }

    /// Returns `true` if `entity` is alive.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity)
    }

    /// The component types `entity` owns, sorted.
    #[must_use]
    pub fn component_types(&self, entity: Entity) -> Option<&[ComponentTypeId]> {
        self.entities.get(&entity).map(Vec::as_slice)
    }

    /// A handle to `entity`'s component of `type_id`.
    #[must_use]
    pub fn component(&self, entity: Entity, type_id: ComponentTypeId) -> Option<ComponentRef> {
        self.tables.get(type_id)?.read().find(entity).cloned()
    }

    /// A copy of `entity`'s `T` component.
    #[must_use]
    pub fn get<T: Component + Clone>(&self, entity: Entity) -> Option<T> {
        let cell = self.component(entity, T::component_type_id())?;
        let value = cell.read::<T>()?.clone();
        Some(value)
    }

    /// Returns an iterator over all live entities, in no particular order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.keys().copied()
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn store(&mut self, entity: Entity, component: BoxedComponent) -> Result<(), CommandError> {
        let type_id = component.type_id_dyn();
        let table = self
            .tables
            .get(type_id)
            .ok_or(engine_component::ComponentError::UnknownType(type_id))?;
        match table.write().insert(entity, component)? {
            Some(_) => Ok(()),
            None => Err(CommandError::ComponentExists { entity, type_id }),
        }
    }
}
