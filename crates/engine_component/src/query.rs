//! Component-set declarations.
//!
//! A [`SetSpec`] is what a system declares up front: a list of component
//! types and whether an entity must own all of them ([`SetOp::Intersect`])
//! or at least one ([`SetOp::Unite`]) to be admitted into the live set.

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentTypeId};

/// How a set combines its declared component types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetOp {
    /// The entity must own every declared type.
    Intersect,
    /// The entity must own at least one declared type.
    Unite,
}

impl SetOp {
    /// Decide membership from the number of declared types and how many of
    /// them the entity owns.
    #[must_use]
    pub fn admits(self, declared: usize, owned: usize) -> bool {
        match self {
            SetOp::Intersect => declared > 0 && owned == declared,
            SetOp::Unite => owned > 0,
        }
    }
}

/// A declared component set: the types it ranges over and its [`SetOp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSpec {
    /// Set operation.
    pub op: SetOp,
    /// Declared component types, sorted and without duplicates.
    pub types: Vec<ComponentTypeId>,
}

impl SetSpec {
    /// Create a new empty spec with the given operation.
    #[must_use]
    pub fn new(op: SetOp) -> Self {
        Self {
            op,
            types: Vec::new(),
        }
    }

    /// A spec over `types` admitting entities that own all of them.
    #[must_use]
    pub fn intersect(types: impl IntoIterator<Item = ComponentTypeId>) -> Self {
        types.into_iter().fold(Self::new(SetOp::Intersect), Self::with)
    }

    /// A spec over `types` admitting entities that own any of them.
    #[must_use]
    pub fn unite(types: impl IntoIterator<Item = ComponentTypeId>) -> Self {
        types.into_iter().fold(Self::new(SetOp::Unite), Self::with)
    }

    /// Add a component type.
    #[must_use]
    pub fn with(mut self, type_id: ComponentTypeId) -> Self {
        if let Err(index) = self.types.binary_search(&type_id) {
            self.types.insert(index, type_id);
        }
        self
    }

    /// Add the component type `T`.
    #[must_use]
    pub fn with_component<T: Component>(self) -> Self {
        self.with(T::component_type_id())
    }

    /// Returns `true` if the spec declares `type_id`.
    #[must_use]
    pub fn declares(&self, type_id: ComponentTypeId) -> bool {
        self.types.binary_search(&type_id).is_ok()
    }

    /// Returns `true` if no component type has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Evaluate the set predicate against the types an entity owns.
    #[must_use]
    pub fn matches(&self, owned: &[ComponentTypeId]) -> bool {
        let present = self
            .types
            .iter()
            .filter(|declared| owned.contains(*declared))
            .count();
        self.op.admits(self.types.len(), present)
    }
}
