//! Entity identifiers and the recycling id generator.
//!
//! An [`Entity`] is a lightweight `u64` key with no data of its own. Ids are
//! handed out by the driver's [`EntityAllocator`], which recycles released
//! ids through a free list.

use serde::{Deserialize, Serialize};

/// A unique entity identifier.
///
/// Entities are pure keys; components attached to them through the
/// component tables give them meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(pub u64);

impl Entity {
    /// The null / invalid entity sentinel.
    pub const INVALID: Entity = Entity(0);

    /// Create an entity from a raw `u64` identifier.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is a valid (non-zero) entity.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Generates entity ids in O(1), reusing released ids first.
///
/// Callers are responsible for releasing each id at most once; the world
/// only releases entities it has just removed from its entity table.
#[derive(Debug)]
pub struct EntityAllocator {
    next_id: u64,
    free: Vec<u64>,
}

impl EntityAllocator {
    /// Creates a new allocator. IDs start at 1 (0 is reserved for [`Entity::INVALID`]).
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            free: Vec::new(),
        }
    }

    /// Allocates an entity id, preferring the most recently released one.
    pub fn allocate(&mut self) -> Entity {
        if let Some(id) = self.free.pop() {
            return Entity(id);
        }
        let id = self.next_id;
        self.next_id += 1;
        Entity(id)
    }

    /// Returns `entity`'s id to the free list.
    pub fn release(&mut self, entity: Entity) {
        if entity.is_valid() && entity.0 < self.next_id {
            self.free.push(entity.0);
        }
    }

    /// Returns the number of ids currently handed out.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.next_id - 1 - self.free.len() as u64
    }

    /// Returns the number of ids waiting to be recycled.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_creation() {
        let e = Entity::from_raw(42);
        assert_eq!(e.id(), 42);
        assert!(e.is_valid());
    }

    #[test]
    fn test_entity_invalid() {
        assert!(!Entity::INVALID.is_valid());
        assert_eq!(Entity::INVALID.id(), 0);
    }

    #[test]
    fn test_allocator_produces_unique_ids() {
        let mut alloc = EntityAllocator::new();
        let e1 = alloc.allocate();
        let e2 = alloc.allocate();
        let e3 = alloc.allocate();
        assert_eq!(e1.id(), 1);
        assert_eq!(e2.id(), 2);
        assert_eq!(e3.id(), 3);
        assert_eq!(alloc.count(), 3);
    }

    #[test]
    fn test_released_ids_are_recycled() {
        let mut alloc = EntityAllocator::new();
        let e1 = alloc.allocate();
        let e2 = alloc.allocate();
        alloc.release(e1);
        assert_eq!(alloc.count(), 1);
        assert_eq!(alloc.free_count(), 1);

        let reused = alloc.allocate();
        assert_eq!(reused, e1);
        assert_ne!(reused, e2);
        assert_eq!(alloc.allocate().id(), 3);
        assert_eq!(alloc.free_count(), 0);
    }

    #[test]
    fn test_release_ignores_foreign_ids() {
        let mut alloc = EntityAllocator::new();
        alloc.release(Entity::INVALID);
        alloc.release(Entity::from_raw(99));
        assert_eq!(alloc.free_count(), 0);
        assert_eq!(alloc.allocate().id(), 1);
    }

    #[test]
    fn test_entity_serialization_roundtrip() {
        let entity = Entity::from_raw(999);
        let bytes = rmp_serde::to_vec(&entity).unwrap();
        let restored: Entity = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(entity, restored);
    }
}
