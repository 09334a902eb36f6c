//! Core [`Component`] trait, the type-erased [`AnyComponent`] view, and
//! serialised [`ComponentRecord`]s.
//!
//! Every piece of data stored in a component table implements [`Component`].
//! The trait requires `Send + Sync + 'static` so components can be shared with
//! systems running on worker threads, and serde so they can travel inside
//! commands.
//!
//! ## Type Identity
//!
//! [`ComponentTypeId`] is derived from the component's **string name** using
//! the FNV-1a 64-bit hash algorithm, so it is stable across runs and builds.

use std::any::Any;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ComponentError;

/// A unique identifier for a component type, derived from its string name
/// using the FNV-1a 64-bit hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the [`ComponentTypeId`] from a component's string name.
    ///
    /// # Algorithm (FNV-1a 64-bit)
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325          (offset basis)
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3  (prime)
    /// return hash
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Compute the [`ComponentTypeId`] for a Rust component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self::from_name(T::type_name())
    }
}

impl std::fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// The core component trait.
///
/// # Examples
///
/// ```rust
/// use serde::{Serialize, Deserialize};
/// use engine_component::Component;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Health {
///     current: f32,
///     max: f32,
/// }
///
/// impl Component for Health {
///     fn type_name() -> &'static str { "Health" }
/// }
/// ```
pub trait Component: Send + Sync + 'static + Serialize + DeserializeOwned {
    /// A human-readable name for this component type.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentTypeId`] for this component.
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::from_name(Self::type_name())
    }
}

/// Object-safe view over any [`Component`].
pub trait AnyComponent: Send + Sync + 'static {
    /// The type id of the concrete component.
    fn type_id_dyn(&self) -> ComponentTypeId;

    /// The registered name of the concrete component.
    fn component_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Serialise the component into a [`ComponentRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Encode`] if MessagePack encoding fails.
    fn to_record(&self) -> Result<ComponentRecord, ComponentError>;
}

impl<T: Component> AnyComponent for T {
    fn type_id_dyn(&self) -> ComponentTypeId {
        T::component_type_id()
    }

    fn component_name(&self) -> &'static str {
        T::type_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn to_record(&self) -> Result<ComponentRecord, ComponentError> {
        ComponentRecord::encode(self)
    }
}

/// An owned, type-erased component value.
pub type BoxedComponent = Box<dyn AnyComponent>;

impl std::fmt::Debug for dyn AnyComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.component_name())
    }
}

/// A component serialised to MessagePack, tagged with its type id.
///
/// Records are how components travel inside commands; the driver turns them
/// back into values through the component registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// The component type the payload decodes to.
    pub type_id: ComponentTypeId,
    /// MessagePack-encoded component bytes.
    pub data: Vec<u8>,
}

impl ComponentRecord {
    /// Encode a typed component.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Encode`] if MessagePack encoding fails.
    pub fn encode<T: Component>(component: &T) -> Result<Self, ComponentError> {
        Ok(Self {
            type_id: T::component_type_id(),
            data: rmp_serde::to_vec_named(component)?,
        })
    }

    /// Decode the payload as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::TypeMismatch`] if the record holds another
    /// type, or [`ComponentError::Decode`] if the payload is malformed.
    pub fn decode<T: Component>(&self) -> Result<T, ComponentError> {
        let expected = T::component_type_id();
        if self.type_id != expected {
            return Err(ComponentError::TypeMismatch {
                expected,
                actual: self.type_id,
            });
        }
        Ok(rmp_serde::from_slice(&self.data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Health {
        current: f32,
        max: f32,
    }

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    #[test]
    fn test_component_type_id_matches_from_name() {
        assert_eq!(
            Health::component_type_id(),
            ComponentTypeId::from_name("Health")
        );
        assert_eq!(ComponentTypeId::of::<Health>(), Health::component_type_id());
    }

    #[test]
    fn test_component_type_id_differs_between_types() {
        assert_ne!(Health::component_type_id(), Velocity::component_type_id());
    }

    #[test]
    fn test_fnv1a_known_vector() {
        // FNV-1a 64-bit of empty string is the offset basis itself.
        assert_eq!(
            ComponentTypeId::from_name(""),
            ComponentTypeId(0xcbf2_9ce4_8422_2325)
        );
    }

    #[test]
    fn test_any_component_downcast() {
        let boxed: BoxedComponent = Box::new(Health {
            current: 1.0,
            max: 2.0,
        });
        assert_eq!(boxed.type_id_dyn(), Health::component_type_id());
        assert_eq!(boxed.component_name(), "Health");
        assert!(boxed.as_any().downcast_ref::<Health>().is_some());
        assert!(boxed.as_any().downcast_ref::<Velocity>().is_none());
    }

    #[test]
    fn test_static_and_erased_type_ids_agree() {
        // Both traits in scope: the associated fn must still resolve.
        let health = Health {
            current: 1.0,
            max: 1.0,
        };
        assert_eq!(health.type_id_dyn(), Health::component_type_id());
        assert_eq!(
            <Health as AnyComponent>::type_id_dyn(&health),
            ComponentTypeId::of::<Health>()
        );
    }

    #[test]
    fn test_record_decode_checks_type() {
        let record = ComponentRecord::encode(&Health {
            current: 80.0,
            max: 100.0,
        })
        .unwrap();
        assert_eq!(record.type_id, Health::component_type_id());

        let err = record.decode::<Velocity>().unwrap_err();
        assert!(matches!(err, ComponentError::TypeMismatch { .. }));

        let health: Health = record.decode().unwrap();
        assert_eq!(health.current, 80.0);
    }

    #[test]
    fn test_boxed_component_to_record() {
        let boxed: BoxedComponent = Box::new(Velocity { x: 1.0, y: -1.0 });
        let record = boxed.to_record().unwrap();
        assert_eq!(record.type_id, Velocity::component_type_id());
    }
}
