//! Live component sets and the access objects handed to systems.
//!
//! A [`ComponentSet`] is a [`SetSpec`] bound to the shared tables of its
//! declared types. It keeps one [`EntityRow`] per admitted entity, holding
//! references to that entity's components of the declared types. Rows are
//! maintained incrementally: the driver calls
//! [`ComponentAccess::register_entity`] / [`ComponentAccess::unregister_entity`]
//! whenever an entity's component membership changes, so between those
//! events a set's rows are exactly the entities satisfying its predicate.
//!
//! Systems never see [`ComponentAccess`] during an update. They get an
//! [`AccessView`], which can iterate rows but cannot add or remove them and
//! has no path to the underlying tables.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};
use tracing::trace;

use crate::component::{Component, ComponentTypeId};
use crate::entity::Entity;
use crate::error::ComponentError;
use crate::query::{SetOp, SetSpec};
use crate::table::{ComponentRef, ComponentTables, SharedTable};

/// One admitted entity and its components of the set's declared types.
#[derive(Debug, Clone)]
pub struct EntityRow {
    entity: Entity,
    components: Vec<ComponentRef>,
}

impl EntityRow {
    /// The entity this row belongs to.
    #[must_use]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// The captured component of `type_id`, if the entity owns one.
    #[must_use]
    pub fn get(&self, type_id: ComponentTypeId) -> Option<&ComponentRef> {
        self.components.iter().find(|c| c.type_id() == type_id)
    }

    /// Returns `true` if the row captured a component of type `T`.
    #[must_use]
    pub fn has<T: Component>(&self) -> bool {
        self.get(T::component_type_id()).is_some()
    }

    /// Shared access to the row's `T` component.
    #[must_use]
    pub fn read<T: Component>(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        self.get(T::component_type_id())?.read::<T>()
    }

    /// Exclusive access to the row's `T` component.
    ///
    /// Only the component's fields can be changed this way; adding or
    /// removing components goes through commands.
    #[must_use]
    pub fn write<T: Component>(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        self.get(T::component_type_id())?.write::<T>()
    }

    /// Every captured component, ordered by the set's declared types.
    #[must_use]
    pub fn components(&self) -> &[ComponentRef] {
        &self.components
    }
}

/// A declared set bound to its tables, plus the rows it currently admits.
#[derive(Debug)]
pub struct ComponentSet {
    spec: SetSpec,
    tables: Vec<SharedTable>,
    rows: BTreeMap<Entity, EntityRow>,
}

impl ComponentSet {
    /// Bind `spec` to the tables of its declared types.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::EmptySet`] if the spec declares no types,
    /// or [`ComponentError::UnknownType`] if a declared type has no table.
    pub fn materialize(
        owner: &str,
        spec: SetSpec,
        source: &ComponentTables,
    ) -> Result<Self, ComponentError> {
        if spec.is_empty() {
            return Err(ComponentError::EmptySet {
                owner: owner.to_owned(),
            });
        }

        let tables = spec
            .types
            .iter()
            .map(|&type_id| {
                source
                    .get(type_id)
                    .cloned()
                    .ok_or(ComponentError::UnknownType(type_id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            spec,
            tables,
            rows: BTreeMap::new(),
        })
    }

    /// The declaration this set was built from.
    #[must_use]
    pub fn spec(&self) -> &SetSpec {
        &self.spec
    }

    /// The set operation.
    #[must_use]
    pub fn op(&self) -> SetOp {
        self.spec.op
    }

    /// Re-evaluate `entity` against the set predicate.
    ///
    /// Admitted entities get a fresh row capturing their current
    /// components; an entity that no longer qualifies loses its row.
    /// Returns `true` if the entity is a member afterwards.
    pub fn register_entity(&mut self, entity: Entity) -> bool {
        let components: Vec<ComponentRef> = self
            .tables
            .iter()
            .filter_map(|table| table.read().find(entity).cloned())
            .collect();

        let owned: Vec<ComponentTypeId> = components.iter().map(ComponentRef::type_id).collect();
        if self.spec.matches(&owned) {
            self.rows.insert(entity, EntityRow { entity, components });
            true
        } else {
            self.rows.remove(&entity);
            false
        }
    }

    /// Drop `entity`'s row. Returns `true` if it was a member.
    pub fn unregister_entity(&mut self, entity: Entity) -> bool {
        self.rows.remove(&entity).is_some()
    }

    /// Returns `true` if `entity` is currently admitted.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.rows.contains_key(&entity)
    }

    /// The row of `entity`, if admitted.
    #[must_use]
    pub fn row(&self, entity: Entity) -> Option<&EntityRow> {
        self.rows.get(&entity)
    }

    /// Admitted rows in entity order.
    pub fn rows(&self) -> impl Iterator<Item = &EntityRow> {
        self.rows.values()
    }

    /// Number of admitted entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if no entity is admitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Every live set of one pipeline node, with the driver-side read-write
/// operations.
#[derive(Debug, Default)]
pub struct ComponentAccess {
    sets: Vec<ComponentSet>,
}

impl ComponentAccess {
    /// An access object with no sets (for nodes without a system).
    #[must_use]
    pub fn new() -> Self {
        Self { sets: Vec::new() }
    }

    /// Materialize one live set per spec.
    ///
    /// # Errors
    ///
    /// Propagates the first [`ComponentSet::materialize`] failure.
    pub fn materialize(
        owner: &str,
        specs: &[SetSpec],
        source: &ComponentTables,
    ) -> Result<Self, ComponentError> {
        let sets = specs
            .iter()
            .map(|spec| ComponentSet::materialize(owner, spec.clone(), source))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sets })
    }

    /// Offer `entity` to every set. Returns `true` if at least one set
    /// admitted it.
    pub fn register_entity(&mut self, entity: Entity) -> bool {
        let mut accepted = false;
        for set in &mut self.sets {
            accepted |= set.register_entity(entity);
        }
        trace!(%entity, accepted, "entity offered to component sets");
        accepted
    }

    /// Remove `entity` from every set holding it.
    pub fn unregister_entity(&mut self, entity: Entity) {
        for set in &mut self.sets {
            set.unregister_entity(entity);
        }
    }

    /// Returns `true` if any set currently admits `entity`.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.sets.iter().any(|set| set.contains(entity))
    }

    /// Number of live sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Number of distinct entities admitted into at least one set.
    #[must_use]
    pub fn admitted_count(&self) -> usize {
        match self.sets.as_slice() {
            [] => 0,
            [only] => only.len(),
            sets => sets
                .iter()
                .flat_map(|set| set.rows.keys())
                .collect::<BTreeSet<_>>()
                .len(),
        }
    }

    /// Returns `true` if the node declares no sets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// The live set at `index`.
    #[must_use]
    pub fn set(&self, index: usize) -> Option<&ComponentSet> {
        self.sets.get(index)
    }

    /// The read-only view handed to systems.
    #[must_use]
    pub fn view(&self) -> AccessView<'_> {
        AccessView { access: self }
    }
}

/// Read-only access to a node's sets.
#[derive(Debug, Clone, Copy)]
pub struct AccessView<'a> {
    access: &'a ComponentAccess,
}

impl<'a> AccessView<'a> {
    /// Number of sets the system declared.
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.access.len()
    }

    /// The set at `index`, in declaration order.
    #[must_use]
    pub fn set(&self, index: usize) -> Option<SetView<'a>> {
        self.access.set(index).map(|set| SetView { set })
    }

    /// Rows of the set at `index`; empty if the index is out of range.
    pub fn rows(&self, index: usize) -> impl Iterator<Item = &'a EntityRow> + 'a {
        self.access
            .set(index)
            .into_iter()
            .flat_map(ComponentSet::rows)
    }
}

/// Read-only access to one set.
#[derive(Debug, Clone, Copy)]
pub struct SetView<'a> {
    set: &'a ComponentSet,
}

impl<'a> SetView<'a> {
    /// The set operation.
    #[must_use]
    pub fn op(&self) -> SetOp {
        self.set.op()
    }

    /// The declared component types.
    #[must_use]
    pub fn types(&self) -> &'a [ComponentTypeId] {
        &self.set.spec().types
    }

    /// Admitted rows in entity order.
    pub fn rows(&self) -> impl Iterator<Item = &'a EntityRow> + 'a {
        self.set.rows()
    }

    /// The row of `entity`, if admitted.
    #[must_use]
    pub fn row(&self, entity: Entity) -> Option<&'a EntityRow> {
        self.set.row(entity)
    }

    /// Returns `true` if `entity` is admitted.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.set.contains(entity)
    }

    /// Number of admitted entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Returns `true` if no entity is admitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
