//! # engine_component
//!
//! The "E" and "C" of the tick engine — entities, components, the shared
//! per-type component tables, and the set algebra that decides which
//! entities each system can see.
//!
//! This crate provides:
//!
//! - [`Entity`] / [`EntityAllocator`] — `u64` ids recycled through a free list.
//! - [`Component`] / [`AnyComponent`] — typed and type-erased component data.
//! - [`ComponentRegistry`] — decoders for serialised [`ComponentRecord`]s.
//! - [`ComponentTable`] / [`ComponentTables`] — per-type storage shared by
//!   reference across a whole pipeline tree.
//! - [`SetSpec`] — `intersect` / `unite` declarations over component types.
//! - [`ComponentSet`] / [`ComponentAccess`] — live, incrementally maintained
//!   sets, and the read-only [`AccessView`] given to systems.

pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod registry;
pub mod set;
pub mod table;

pub use component::{AnyComponent, BoxedComponent, Component, ComponentRecord, ComponentTypeId};
pub use entity::{Entity, EntityAllocator};
pub use error::ComponentError;
pub use query::{SetOp, SetSpec};
pub use registry::{ComponentMeta, ComponentRegistry};
pub use set::{AccessView, ComponentAccess, ComponentSet, EntityRow, SetView};
pub use table::{ComponentRef, ComponentTable, ComponentTables, SharedTable};
