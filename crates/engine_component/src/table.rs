//! Per-type component tables and the tree-wide table source.
//!
//! Each component type has exactly one [`ComponentTable`], owned by the
//! world's [`ComponentTables`] and handed out by reference ([`SharedTable`])
//! to every component set that declares the type. Individual components live
//! behind their own lock ([`ComponentRef`]) so systems on different workers
//! can edit fields of the components they were given while the table
//! structure itself is only changed by the driver between ticks.

use std::collections::HashMap;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use engine_task::Shared;

use crate::component::{BoxedComponent, Component, ComponentTypeId};
use crate::entity::Entity;
use crate::error::ComponentError;

/// A shared handle to one stored component.
#[derive(Clone)]
pub struct ComponentRef {
    type_id: ComponentTypeId,
    cell: Shared<RwLock<BoxedComponent>>,
}

impl ComponentRef {
    /// Wrap a component value in a fresh cell.
    #[must_use]
    pub fn new(value: BoxedComponent) -> Self {
        Self {
            type_id: value.type_id_dyn(),
            cell: Shared::new(RwLock::new(value)),
        }
    }

    /// The type id of the stored component.
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    /// Shared access to the component as `T`; `None` if it is another type.
    #[must_use]
    pub fn read<T: Component>(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        RwLockReadGuard::try_map(self.cell.read(), |value| {
            (**value).as_any().downcast_ref::<T>()
        })
        .ok()
    }

    /// Exclusive access to the component as `T`; `None` if it is another
    /// type.
    #[must_use]
    pub fn write<T: Component>(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        RwLockWriteGuard::try_map(self.cell.write(), |value| {
            (**value).as_any_mut().downcast_mut::<T>()
        })
        .ok()
    }

    /// Overwrite the stored value in place, returning the previous one.
    ///
    /// Every set row holding this reference observes the new value.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::TypeMismatch`] if `value` is of another
    /// component type.
    pub fn replace(&self, value: BoxedComponent) -> Result<BoxedComponent, ComponentError> {
        let actual = value.type_id_dyn();
        if actual != self.type_id {
            return Err(ComponentError::TypeMismatch {
                expected: self.type_id,
                actual,
            });
        }
        Ok(std::mem::replace(&mut *self.cell.write(), value))
    }

    /// Returns `true` if both references point at the same stored component.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Shared::ptr_eq(&a.cell, &b.cell)
    }
}

impl std::fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRef")
            .field("type_id", &self.type_id)
            .finish_non_exhaustive()
    }
}

/// Storage for every component of one type, keyed by entity.
#[derive(Debug)]
pub struct ComponentTable {
    type_id: ComponentTypeId,
    name: &'static str,
    cells: HashMap<Entity, ComponentRef>,
}

impl ComponentTable {
    /// Create a new, empty table.
    #[must_use]
    pub fn new(type_id: ComponentTypeId, name: &'static str) -> Self {
        Self {
            type_id,
            name,
            cells: HashMap::new(),
        }
    }

    /// The component type stored in this table.
    #[must_use]
    pub fn type_id(&self) -> ComponentTypeId {
        self.type_id
    }

    /// The component name stored in this table.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Look up `entity`'s component.
    #[must_use]
    pub fn find(&self, entity: Entity) -> Option<&ComponentRef> {
        self.cells.get(&entity)
    }

    /// Returns `true` if `entity` owns a component in this table.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.cells.contains_key(&entity)
    }

    /// Store `value` for `entity`.
    ///
    /// Returns a reference to the stored component, or `None` if the entity
    /// already owns one (the existing component is left untouched).
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::TypeMismatch`] if `value` belongs to another
    /// table.
    pub fn insert(
        &mut self,
        entity: Entity,
        value: BoxedComponent,
    ) -> Result<Option<ComponentRef>, ComponentError> {
        let actual = value.type_id_dyn();
        if actual != self.type_id {
            return Err(ComponentError::TypeMismatch {
                expected: self.type_id,
                actual,
            });
        }
        if self.cells.contains_key(&entity) {
            return Ok(None);
        }
        let cell = ComponentRef::new(value);
        self.cells.insert(entity, cell.clone());
        Ok(Some(cell))
    }

    /// Remove `entity`'s component. Returns `true` if one was stored.
    pub fn remove(&mut self, entity: Entity) -> bool {
        self.cells.remove(&entity).is_some()
    }

    /// Returns the number of stored components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns `true` if the table holds no components.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns an iterator over the entities with a component in this table.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.cells.keys().copied()
    }
}

/// A component table shared by reference between the world and every
/// component set that declares its type.
pub type SharedTable = Shared<RwLock<ComponentTable>>;

/// The single source of component tables for a whole pipeline tree.
#[derive(Debug, Default)]
pub struct ComponentTables {
    tables: HashMap<ComponentTypeId, SharedTable>,
}

impl ComponentTables {
    /// Create an empty table source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Returns the table for `type_id`, creating it if needed.
    pub fn ensure(&mut self, type_id: ComponentTypeId, name: &'static str) -> SharedTable {
        self.tables
            .entry(type_id)
            .or_insert_with(|| Shared::new(RwLock::new(ComponentTable::new(type_id, name))))
            .clone()
    }

    /// Returns the table for `type_id`, if one exists.
    #[must_use]
    pub fn get(&self, type_id: ComponentTypeId) -> Option<&SharedTable> {
        self.tables.get(&type_id)
    }

    /// Returns an iterator over all tables.
    pub fn iter(&self) -> impl Iterator<Item = (&ComponentTypeId, &SharedTable)> {
        self.tables.iter()
    }

    /// Returns the number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` if no table exists yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag;

    impl Component for Tag {
        fn type_name() -> &'static str {
            "Tag"
        }
    }

    fn position_table() -> ComponentTable {
        ComponentTable::new(Position::component_type_id(), Position::type_name())
    }

    #[test]
    fn test_insert_find_remove() {
        let mut table = position_table();
        let e = Entity::from_raw(1);

        let stored = table
            .insert(e, Box::new(Position { x: 1.0, y: 2.0 }))
            .unwrap()
            .expect("first insert stores the component");
        assert_eq!(table.len(), 1);
        assert!(ComponentRef::ptr_eq(&stored, table.find(e).unwrap()));

        assert!(table.remove(e));
        assert!(!table.remove(e));
        assert!(table.find(e).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_insert_does_not_overwrite() {
        let mut table = position_table();
        let e = Entity::from_raw(1);
        table
            .insert(e, Box::new(Position { x: 1.0, y: 1.0 }))
            .unwrap();
        let second = table
            .insert(e, Box::new(Position { x: 9.0, y: 9.0 }))
            .unwrap();
        assert!(second.is_none());
        assert_eq!(table.find(e).unwrap().read::<Position>().unwrap().x, 1.0);
    }

    #[test]
    fn test_insert_rejects_foreign_type() {
        let mut table = position_table();
        let err = table.insert(Entity::from_raw(1), Box::new(Tag)).unwrap_err();
        assert!(matches!(err, ComponentError::TypeMismatch { .. }));
    }

    #[test]
    fn test_write_is_visible_through_every_clone() {
        let cell = ComponentRef::new(Box::new(Position { x: 0.0, y: 0.0 }));
        let other = cell.clone();
        cell.write::<Position>().unwrap().x = 5.0;
        assert_eq!(other.read::<Position>().unwrap().x, 5.0);
        assert!(cell.read::<Tag>().is_none());
    }

    #[test]
    fn test_replace_checks_type() {
        let cell = ComponentRef::new(Box::new(Position { x: 0.0, y: 0.0 }));
        assert!(cell.replace(Box::new(Tag)).is_err());
        cell.replace(Box::new(Position { x: 3.0, y: 4.0 })).unwrap();
        assert_eq!(
            *cell.read::<Position>().unwrap(),
            Position { x: 3.0, y: 4.0 }
        );
    }

    #[test]
    fn test_tables_are_shared_not_copied() {
        let mut tables = ComponentTables::new();
        let a = tables.ensure(Position::component_type_id(), Position::type_name());
        let b = tables.ensure(Position::component_type_id(), Position::type_name());
        assert!(Shared::ptr_eq(&a, &b));
        assert_eq!(tables.len(), 1);

        a.write()
            .insert(Entity::from_raw(3), Box::new(Position { x: 0.0, y: 0.0 }))
            .unwrap();
        assert_eq!(b.read().len(), 1);
    }
}
