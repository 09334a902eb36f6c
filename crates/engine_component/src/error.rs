//! Component-layer error types.

use crate::component::ComponentTypeId;

/// Errors raised by component registration, storage, and set construction.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// The component type was never registered.
    #[error("unknown component type {0}")]
    UnknownType(ComponentTypeId),

    /// Two different component names hash to the same type id.
    #[error("component type id collision between '{existing}' and '{new}'")]
    TypeIdCollision {
        /// Name already registered under the id.
        existing: &'static str,
        /// Name that attempted to register.
        new: &'static str,
    },

    /// A value or record of one type was used where another was expected.
    #[error("component type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ComponentTypeId,
        actual: ComponentTypeId,
    },

    /// A component set declared no component types.
    #[error("component set declared by '{owner}' has no component types")]
    EmptySet {
        /// Name of the system that declared the set.
        owner: String,
    },

    /// Failed to encode a component to MessagePack.
    #[error("failed to encode component: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a component from MessagePack.
    #[error("failed to decode component: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
