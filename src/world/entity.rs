//! Entity and Player Identifiers
//!
//! `EntityId` is an arena slot plus a generation. Freeing a slot bumps its
//! generation, so an id held across a despawn never resolves to the entity
//! that later reuses the slot.

use std::fmt;
use serde::{Serialize, Deserialize};

// =============================================================================
// ENTITY ID
// =============================================================================

/// Opaque entity handle.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId {
    /// Slot in the component columns
    pub index: u32,
    /// Generation of the slot when this id was issued
    pub generation: u32,
}

impl EntityId {
    /// Create an id from its parts.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

/// Generational slot allocator.
#[derive(Clone, Debug, Default)]
pub struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: Vec<u32>,
}

impl EntityAllocator {
    /// Create an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id, reusing the lowest freed slot first.
    pub fn allocate(&mut self) -> EntityId {
        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            self.alive[slot] = true;
            return EntityId::new(index, self.generations[slot]);
        }

        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        EntityId::new(index, 0)
    }

    /// Free an id. Returns false if it was already stale.
    pub fn free(&mut self, id: EntityId) -> bool {
        if !self.is_live(id) {
            return false;
        }
        let slot = id.index as usize;
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(id.index);
        // Keep reuse order deterministic: lowest index on top
        self.free.sort_unstable_by(|a, b| b.cmp(a));
        true
    }

    /// True if `id` refers to a live entity.
    pub fn is_live(&self, id: EntityId) -> bool {
        let slot = id.index as usize;
        slot < self.generations.len() && self.alive[slot] && self.generations[slot] == id.generation
    }

    /// Number of live entities.
    pub fn live_count(&self) -> usize {
        self.alive.iter().filter(|a| **a).count()
    }
}

// =============================================================================
// PLAYER ID
// =============================================================================

/// Stable player identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create a random (v4) id.
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 4 bytes are enough to tell players apart in logs
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sequential() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_eq!(a, EntityId::new(0, 0));
        assert_eq!(b, EntityId::new(1, 0));
        assert_eq!(alloc.live_count(), 2);
    }

    #[test]
    fn test_stale_id_after_reuse() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        assert!(alloc.free(a));
        assert!(!alloc.free(a));

        let b = alloc.allocate();
        assert_eq!(b.index, a.index);
        assert_ne!(b.generation, a.generation);
        assert!(!alloc.is_live(a));
        assert!(alloc.is_live(b));
    }

    #[test]
    fn test_lowest_slot_reused_first() {
        let mut alloc = EntityAllocator::new();
        let ids: Vec<_> = (0..4).map(|_| alloc.allocate()).collect();
        alloc.free(ids[3]);
        alloc.free(ids[1]);

        assert_eq!(alloc.allocate().index, 1);
        assert_eq!(alloc.allocate().index, 3);
    }

    #[test]
    fn test_player_id_ordering() {
        let id1 = PlayerId::new([0; 16]);
        let id2 = PlayerId::new([1; 16]);
        assert!(id1 < id2);
    }

    #[test]
    fn test_player_id_uuid_roundtrip() {
        let id = PlayerId::random();
        let parsed = PlayerId::from_uuid_str(&id.to_uuid_string());
        assert_eq!(parsed, Some(id));
        assert!(PlayerId::from_uuid_str("not-a-uuid").is_none());
    }
}
