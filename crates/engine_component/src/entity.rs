//! Entity identifiers.
//!
//! IDs are handed out by the store's [`EntityAllocator`] starting at 1 and are
//! retired on removal, never recycled. Zero is never issued.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unique entity identifier. Carries no data; the store maps it to an
/// archetype row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(pub u64);

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Monotonic ID source for one store.
///
/// The high-water mark is part of a store snapshot, so a restored world keeps
/// allocating past every ID it has issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityAllocator {
    next: u64,
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl EntityAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Entity {
        let entity = Entity(self.next);
        self.next += 1;
        entity
    }

    /// Number of IDs issued so far, including retired ones.
    #[must_use]
    pub fn issued_count(&self) -> u64 {
        self.next - 1
    }

    /// Whether `entity` was ever handed out by this allocator.
    #[must_use]
    pub fn issued(&self, entity: Entity) -> bool {
        entity.0 != 0 && entity.0 < self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one() {
        let mut alloc = EntityAllocator::new();
        let ids: Vec<Entity> = (0..3).map(|_| alloc.allocate()).collect();
        assert_eq!(ids, vec![Entity(1), Entity(2), Entity(3)]);
        assert_eq!(alloc.issued_count(), 3);
        assert!(alloc.issued(Entity(3)));
        assert!(!alloc.issued(Entity(4)));
        assert!(!alloc.issued(Entity(0)));
    }

    #[test]
    fn test_high_water_mark_survives_encoding() {
        let mut alloc = EntityAllocator::new();
        alloc.allocate();
        alloc.allocate();
        let bytes = rmp_serde::to_vec(&alloc).unwrap();
        let mut restored: EntityAllocator = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(restored.allocate(), Entity(3));
    }

    #[test]
    fn test_display() {
        assert_eq!(Entity(12).to_string(), "Entity(12)");
    }
}
