//! Component registry: the set of component types a world knows about.
//!
//! Components arrive inside commands as [`ComponentRecord`]s. The registry
//! maps each [`ComponentTypeId`] to a decoder so the driver can rebuild the
//! value; an id that was never registered is rejected instead of guessed.

use std::collections::HashMap;

use crate::component::{BoxedComponent, Component, ComponentRecord, ComponentTypeId};
use crate::error::ComponentError;

/// Metadata about a registered component type.
#[derive(Debug, Clone, Copy)]
pub struct ComponentMeta {
    /// The unique type identifier.
    pub type_id: ComponentTypeId,
    /// The human-readable name of the component (e.g. `"Position"`).
    pub name: &'static str,
    decode_fn: fn(&[u8]) -> Result<BoxedComponent, rmp_serde::decode::Error>,
}

impl ComponentMeta {
    /// Metadata for the Rust component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: T::component_type_id(),
            name: T::type_name(),
            decode_fn: |bytes: &[u8]| {
                let value: T = rmp_serde::from_slice(bytes)?;
                Ok(Box::new(value) as BoxedComponent)
            },
        }
    }

    /// Decode `record` into a boxed component of this type.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::TypeMismatch`] if the record is for another
    /// type, or [`ComponentError::Decode`] if the payload is malformed.
    pub fn decode(&self, record: &ComponentRecord) -> Result<BoxedComponent, ComponentError> {
        if record.type_id != self.type_id {
            return Err(ComponentError::TypeMismatch {
                expected: self.type_id,
                actual: record.type_id,
            });
        }
        Ok((self.decode_fn)(&record.data)?)
    }
}

/// Registry of all component types known to a world.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    /// Component metadata keyed by type id.
    metas: HashMap<ComponentTypeId, ComponentMeta>,
}

impl ComponentRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            metas: HashMap::new(),
        }
    }

    /// Register `T`. Registering the same type twice is a no-op.
    ///
    /// Returns `true` if the type was newly registered.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::TypeIdCollision`] if a differently named
    /// type already owns the same id.
    pub fn register<T: Component>(&mut self) -> Result<bool, ComponentError> {
        self.register_meta(ComponentMeta::of::<T>())
    }

    /// Register pre-built metadata.
    ///
    /// # Errors
    ///
    /// See [`ComponentRegistry::register`].
    pub fn register_meta(&mut self, meta: ComponentMeta) -> Result<bool, ComponentError> {
        if let Some(existing) = self.metas.get(&meta.type_id) {
            if existing.name == meta.name {
                return Ok(false);
            }
            return Err(ComponentError::TypeIdCollision {
                existing: existing.name,
                new: meta.name,
            });
        }
        self.metas.insert(meta.type_id, meta);
        Ok(true)
    }

    /// Returns metadata for a type id.
    #[must_use]
    pub fn get(&self, type_id: ComponentTypeId) -> Option<&ComponentMeta> {
        self.metas.get(&type_id)
    }

    /// Returns `true` if the type id has been registered.
    #[must_use]
    pub fn contains(&self, type_id: ComponentTypeId) -> bool {
        self.metas.contains_key(&type_id)
    }

    /// Decode a record through the metadata of its type.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::UnknownType`] for unregistered ids, or the
    /// decode error of [`ComponentMeta::decode`].
    pub fn decode(&self, record: &ComponentRecord) -> Result<BoxedComponent, ComponentError> {
        self.metas
            .get(&record.type_id)
            .ok_or(ComponentError::UnknownType(record.type_id))?
            .decode(record)
    }

    /// Returns an iterator over all registered component types.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentMeta> {
        self.metas.values()
    }

    /// Returns the number of registered component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    /// Returns `true` if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Mass(f32);

    impl Component for Mass {
        fn type_name() -> &'static str {
            "Mass"
        }
    }

    #[test]
    fn test_register_new_type() {
        let mut registry = ComponentRegistry::new();
        assert!(registry.register::<Mass>().unwrap());
        assert!(registry.contains(Mass::component_type_id()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_twice_is_noop() {
        let mut registry = ComponentRegistry::new();
        assert!(registry.register::<Mass>().unwrap());
        assert!(!registry.register::<Mass>().unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_collision_is_rejected() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Mass>().unwrap();

        let mut forged = ComponentMeta::of::<Mass>();
        forged.name = "NotMass";
        let err = registry.register_meta(forged).unwrap_err();
        assert!(matches!(err, ComponentError::TypeIdCollision { existing: "Mass", .. }));
    }

    #[test]
    fn test_decode_roundtrip_through_registry() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Mass>().unwrap();

        let record = ComponentRecord::encode(&Mass(4.5)).unwrap();
        let value = registry.decode(&record).unwrap();
        assert_eq!(value.as_any().downcast_ref::<Mass>(), Some(&Mass(4.5)));
    }

    #[test]
    fn test_decode_unknown_type() {
        let registry = ComponentRegistry::new();
        let record = ComponentRecord::encode(&Mass(1.0)).unwrap();
        let err = registry.decode(&record).unwrap_err();
        assert!(matches!(err, ComponentError::UnknownType(id) if id == Mass::component_type_id()));
    }
}
