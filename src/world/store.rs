//! World State Store
//!
//! Entity-component arena. Each component kind lives in its own dense column
//! indexed by entity slot, so every lookup is O(1) and generation-checked.
//! This is the only place simulation state is mutated.

use std::collections::BTreeMap;
use tracing::debug;

use crate::combat::effects::EffectSet;
use crate::world::components::{DamageLog, Health, PhysicsBody, Player, Position};
use crate::world::entity::{EntityAllocator, EntityId, PlayerId};

// =============================================================================
// COMPONENT COLUMN
// =============================================================================

/// Dense storage for one component kind.
#[derive(Clone, Debug)]
pub struct ComponentColumn<T> {
    slots: Vec<Option<(u32, T)>>,
}

impl<T> Default for ComponentColumn<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> ComponentColumn<T> {
    /// Component of `id`, if present for this generation.
    pub fn get(&self, id: EntityId) -> Option<&T> {
        match self.slots.get(id.index as usize) {
            Some(Some((generation, value))) if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    /// Mutable component of `id`, if present for this generation.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        match self.slots.get_mut(id.index as usize) {
            Some(Some((generation, value))) if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    /// Attach or replace the component of `id`.
    pub fn insert(&mut self, id: EntityId, value: T) {
        let slot = id.index as usize;
        if slot >= self.slots.len() {
            self.slots.resize_with(slot + 1, || None);
        }
        self.slots[slot] = Some((id.generation, value));
    }

    /// Detach the component of `id`.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        let current = matches!(slot, Some((generation, _)) if *generation == id.generation);
        if current {
            slot.take().map(|(_, value)| value)
        } else {
            None
        }
    }

    /// True if `id` has this component.
    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    /// All present components in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|(generation, value)| (EntityId::new(index as u32, *generation), value))
        })
    }

    /// Number of present components.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// True if no component is present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// WORLD STORE
// =============================================================================

/// Everything a new player entity needs, created in one step.
#[derive(Clone, Debug)]
pub struct PlayerBundle {
    /// Transform
    pub position: Position,
    /// Physics description
    pub body: PhysicsBody,
    /// Hit points
    pub health: Health,
    /// Identity and stats
    pub player: Player,
}

/// All entities and their components.
#[derive(Clone, Debug)]
pub struct WorldStore {
    entities: EntityAllocator,
    positions: ComponentColumn<Position>,
    bodies: ComponentColumn<PhysicsBody>,
    health: ComponentColumn<Health>,
    players: ComponentColumn<Player>,
    effects: ComponentColumn<EffectSet>,
    damage_logs: ComponentColumn<DamageLog>,
    player_index: BTreeMap<PlayerId, EntityId>,
    damage_log_capacity: usize,
}

impl Default for WorldStore {
    fn default() -> Self {
        Self::new(20)
    }
}

impl WorldStore {
    /// Empty world. Damage logs keep the last `damage_log_capacity` hits.
    pub fn new(damage_log_capacity: usize) -> Self {
        Self {
            entities: EntityAllocator::new(),
            positions: ComponentColumn::default(),
            bodies: ComponentColumn::default(),
            health: ComponentColumn::default(),
            players: ComponentColumn::default(),
            effects: ComponentColumn::default(),
            damage_logs: ComponentColumn::default(),
            player_index: BTreeMap::new(),
            damage_log_capacity,
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Create a player entity with all four core components.
    ///
    /// Returns None if the player id is already present.
    pub fn spawn_player(&mut self, bundle: PlayerBundle) -> Option<EntityId> {
        let player_id = bundle.player.id;
        if self.player_index.contains_key(&player_id) {
            return None;
        }

        let id = self.entities.allocate();
        self.positions.insert(id, bundle.position);
        self.bodies.insert(id, bundle.body);
        self.health.insert(id, bundle.health);
        self.players.insert(id, bundle.player);
        self.player_index.insert(player_id, id);

        debug!(entity = ?id, player = %player_id, "Spawned player entity");
        Some(id)
    }

    /// Create a piece of static map geometry.
    pub fn spawn_static(&mut self, position: Position, body: PhysicsBody) -> EntityId {
        let id = self.entities.allocate();
        self.positions.insert(id, position);
        self.bodies.insert(id, body);
        id
    }

    /// Remove an entity and every component it has.
    ///
    /// Returns false for a stale id.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if !self.entities.is_live(id) {
            return false;
        }

        if let Some(player) = self.players.remove(id) {
            self.player_index.remove(&player.id);
        }
        self.positions.remove(id);
        self.bodies.remove(id);
        self.health.remove(id);
        self.effects.remove(id);
        self.damage_logs.remove(id);
        self.entities.free(id);

        debug!(entity = ?id, "Despawned entity");
        true
    }

    /// True if `id` is live.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.is_live(id)
    }

    /// Number of live entities, players and geometry alike.
    pub fn entity_count(&self) -> usize {
        self.entities.live_count()
    }

    // -------------------------------------------------------------------------
    // Players
    // -------------------------------------------------------------------------

    /// Entity of a player.
    pub fn entity_of(&self, player_id: &PlayerId) -> Option<EntityId> {
        self.player_index.get(player_id).copied()
    }

    /// Player ids in ascending order.
    pub fn player_ids(&self) -> impl Iterator<Item = &PlayerId> {
        self.player_index.keys()
    }

    /// (player id, entity) pairs in ascending player order.
    pub fn player_entities(&self) -> impl Iterator<Item = (PlayerId, EntityId)> + '_ {
        self.player_index.iter().map(|(p, e)| (*p, *e))
    }

    /// Number of players.
    pub fn player_count(&self) -> usize {
        self.player_index.len()
    }

    // -------------------------------------------------------------------------
    // Component access
    // -------------------------------------------------------------------------

    /// Position of `id`.
    pub fn position(&self, id: EntityId) -> Option<&Position> {
        self.positions.get(id)
    }

    /// Mutable position of `id`.
    pub fn position_mut(&mut self, id: EntityId) -> Option<&mut Position> {
        self.positions.get_mut(id)
    }

    /// Physics body of `id`.
    pub fn body(&self, id: EntityId) -> Option<&PhysicsBody> {
        self.bodies.get(id)
    }

    /// Mutable physics body of `id`.
    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut PhysicsBody> {
        self.bodies.get_mut(id)
    }

    /// All bodies in slot order.
    pub fn bodies(&self) -> impl Iterator<Item = (EntityId, &PhysicsBody)> {
        self.bodies.iter()
    }

    /// Health of `id`.
    pub fn health(&self, id: EntityId) -> Option<&Health> {
        self.health.get(id)
    }

    /// Mutable health of `id`.
    pub fn health_mut(&mut self, id: EntityId) -> Option<&mut Health> {
        self.health.get_mut(id)
    }

    /// Player component of `id`.
    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Mutable player component of `id`.
    pub fn player_mut(&mut self, id: EntityId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// True if `id` is a player that is currently alive.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.players.get(id).map(|p| p.is_alive).unwrap_or(false)
    }

    /// Effect set of `id`, if one was ever created.
    pub fn effects(&self, id: EntityId) -> Option<&EffectSet> {
        self.effects.get(id)
    }

    /// Mutable effect set of `id`, if one exists.
    pub fn effects_mut(&mut self, id: EntityId) -> Option<&mut EffectSet> {
        self.effects.get_mut(id)
    }

    /// Effect set of `id`, created empty on first use.
    ///
    /// None only for a stale id.
    pub fn effects_mut_or_default(&mut self, id: EntityId) -> Option<&mut EffectSet> {
        if !self.entities.is_live(id) {
            return None;
        }
        if !self.effects.contains(id) {
            self.effects.insert(id, EffectSet::default());
        }
        self.effects.get_mut(id)
    }

    /// Drop the effect set of `id`.
    pub fn clear_effects(&mut self, id: EntityId) {
        self.effects.remove(id);
    }

    /// Entities carrying a non-empty effect set, in slot order.
    pub fn entities_with_effects(&self) -> Vec<EntityId> {
        self.effects
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    /// Damage log of `id`.
    pub fn damage_log(&self, id: EntityId) -> Option<&DamageLog> {
        self.damage_logs.get(id)
    }

    /// Damage log of `id`, created empty on first use.
    pub fn damage_log_mut_or_default(&mut self, id: EntityId) -> Option<&mut DamageLog> {
        if !self.entities.is_live(id) {
            return None;
        }
        if !self.damage_logs.contains(id) {
            self.damage_logs.insert(id, DamageLog::new(self.damage_log_capacity));
        }
        self.damage_logs.get_mut(id)
    }

    /// Forget the damage log of `id`.
    pub fn clear_damage_log(&mut self, id: EntityId) {
        self.damage_logs.remove(id);
    }

    /// Entities with health, in slot order.
    pub fn entities_with_health(&self) -> Vec<EntityId> {
        self.health.iter().map(|(id, _)| id).collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
