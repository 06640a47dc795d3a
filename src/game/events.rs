//! Event Bus and Notifications
//!
//! Producers and consumers inside a tick are connected by typed queues, one
//! per edge, all owned by [`EventBus`]. The set of consumers of each event
//! kind is therefore visible at compile time.
//!
//! ```text
//!   physics ──hits──────────▶ combat
//!   intents ──spells────────▶ combat
//!   combat  ──area_damage───▶ combat
//!   physics ──contacts──────▶ (observers)
//!   combat  ──deaths────────▶ match controller
//!   all     ──outbound──────▶ network layer
//! ```

use std::collections::VecDeque;
use serde::{Serialize, Deserialize};

use crate::combat::damage::{BodyPart, DamageType};
use crate::combat::effects::{EffectOutcome, EffectType};
use crate::core::clock::SimTime;
use crate::core::vec3::Vec3;
use crate::game::intent::RejectReason;
use crate::game::lifecycle::{MatchPhase, MatchResults};
use crate::game::snapshot::GameSnapshot;
use crate::physics::backend::ContactEvent;
use crate::world::components::Team;
use crate::world::entity::{EntityId, PlayerId};

// =============================================================================
// INTERNAL EVENTS
// =============================================================================

/// A projectile struck a living player.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HitEvent {
    /// Shooter
    pub attacker: PlayerId,
    /// Struck entity
    pub target: EntityId,
    /// Weapon table id
    pub weapon_id: u32,
    /// Impact point
    pub point: Vec3,
    /// Muzzle-to-impact distance
    pub distance: f32,
}

/// A validated spell cast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpellEvent {
    /// Caster
    pub caster: PlayerId,
    /// Spell table id
    pub spell_id: u32,
    /// Cast point
    pub position: Vec3,
    /// Cast direction
    pub direction: Vec3,
    /// Explicit targets
    pub targets: Vec<PlayerId>,
}

/// Damage to everyone within a radius.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AreaDamageEvent {
    /// Who caused it
    pub source: Option<PlayerId>,
    /// Spell that caused it
    pub spell_id: u32,
    /// Center
    pub center: Vec3,
    /// Radius
    pub radius: f32,
    /// Damage at the center
    pub amount: f32,
    /// Element
    pub damage_type: DamageType,
}

/// A player's health reached zero this tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeathEvent {
    /// Dead player
    pub victim: EntityId,
    /// Credited killer, if any
    pub killer: Option<PlayerId>,
    /// When the killing blow landed
    pub time: SimTime,
}

/// FIFO queue for one producer→consumer edge.
#[derive(Clone, Debug)]
pub struct Channel<T> {
    queue: VecDeque<T>,
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self { queue: VecDeque::new() }
    }
}

impl<T> Channel<T> {
    /// Enqueue an event.
    pub fn publish(&mut self, event: T) {
        self.queue.push_back(event);
    }

    /// Take every queued event in publish order.
    pub fn drain(&mut self) -> Vec<T> {
        self.queue.drain(..).collect()
    }

    /// Drop queued events that fail `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.queue.retain(keep);
    }

    /// Queued events without consuming them.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.queue.iter()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Every in-process event queue.
#[derive(Clone, Debug, Default)]
pub struct EventBus {
    /// Projectile hits for the combat resolver
    pub hits: Channel<HitEvent>,
    /// Spell casts for the combat resolver
    pub spells: Channel<SpellEvent>,
    /// Area damage for the combat resolver
    pub area_damage: Channel<AreaDamageEvent>,
    /// Contacts from the last physics step
    pub contacts: Channel<ContactEvent>,
    /// Deaths for the match controller
    pub deaths: Channel<DeathEvent>,
    /// Notifications for the network layer
    pub outbound: Channel<Notification>,
}

impl EventBus {
    /// Empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outbound notification.
    pub fn notify(&mut self, notification: Notification) {
        self.outbound.publish(notification);
    }

    /// Drop every queued internal event that references `entity` or
    /// `player`. Outbound notifications are kept.
    pub fn retract(&mut self, entity: EntityId, player: PlayerId) {
        self.hits.retain(|h| h.target != entity && h.attacker != player);
        self.spells.retain(|s| s.caster != player);
        self.area_damage.retain(|a| a.source != Some(player));
        self.contacts.retain(|c| c.a != entity && c.b != entity);
        self.deaths.retain(|d| d.victim != entity);
        for spell in self.spells.queue.iter_mut() {
            spell.targets.retain(|t| *t != player);
        }
    }
}

// =============================================================================
// OUTBOUND NOTIFICATIONS
// =============================================================================

/// Processing priority within a tick. Lower value = earlier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NotificationPriority {
    /// Roster changes first
    Roster = 0,
    /// Server overrides of client state
    Correction = 1,
    /// Health changes
    Damage = 2,
    /// Deaths
    Death = 3,
    /// Effects
    Effect = 4,
    /// Respawns
    Respawn = 5,
    /// Match phase
    Match = 6,
    /// Snapshot last
    Snapshot = 7,
}

/// Notification payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationData {
    /// Player joined
    PlayerJoined {
        /// Player
        player_id: PlayerId,
        /// Display name
        name: String,
        /// Assigned team
        team: Team,
    },

    /// Player moved to the other team to rebalance
    TeamChanged {
        /// Player
        player_id: PlayerId,
        /// New team
        team: Team,
    },

    /// Player left
    PlayerLeft {
        /// Player
        player_id: PlayerId,
    },

    /// Server overrode a client position
    PositionCorrected {
        /// Player
        player_id: PlayerId,
        /// Authoritative position
        position: Vec3,
    },

    /// Intent refused
    IntentRejected {
        /// Sender
        player_id: PlayerId,
        /// Why it was refused
        reason: RejectReason,
    },

    /// Jump allowed
    JumpAccepted {
        /// Jumper
        player_id: PlayerId,
    },

    /// Damage resolved. `blocked` hits changed nothing.
    DamageApplied {
        /// Damaged player
        target: PlayerId,
        /// Attacker, None for environment
        attacker: Option<PlayerId>,
        /// Damage dealt after modifiers
        amount: u32,
        /// Element
        damage_type: DamageType,
        /// Hit location for weapon hits
        body_part: Option<BodyPart>,
        /// Headshot
        critical: bool,
        /// Suppressed by an effect
        blocked: bool,
        /// Health afterwards
        health: f32,
    },

    /// Healing resolved
    Healed {
        /// Healed player
        target: PlayerId,
        /// Healer, None for effects
        source: Option<PlayerId>,
        /// Health restored
        amount: f32,
        /// Health afterwards
        health: f32,
    },

    /// Player died
    PlayerDied {
        /// Dead player
        victim: PlayerId,
        /// Credited killer
        killer: Option<PlayerId>,
        /// Assisting players
        assists: Vec<PlayerId>,
        /// Scheduled respawn time
        respawn_at: SimTime,
    },

    /// Player respawned
    PlayerRespawned {
        /// Player
        player_id: PlayerId,
        /// Spawn point
        position: Vec3,
    },

    /// Effect added, strengthened or extended
    EffectApplied {
        /// Affected player
        target: PlayerId,
        /// Kind
        effect_type: EffectType,
        /// Strength now active
        power: f32,
        /// Lifetime now active
        duration: u64,
        /// How the stacking policy resolved
        outcome: EffectOutcome,
    },

    /// Effect removed on request
    EffectRemoved {
        /// Affected player
        target: PlayerId,
        /// Kind
        effect_type: EffectType,
    },

    /// Effect ran out
    EffectExpired {
        /// Affected player
        target: PlayerId,
        /// Kind
        effect_type: EffectType,
    },

    /// Countdown started
    MatchStarting {
        /// Countdown length
        countdown_ms: u64,
    },

    /// Countdown aborted
    MatchAborted,

    /// Round live
    MatchStarted {
        /// Round number
        match_number: u32,
    },

    /// Round over
    MatchEnded {
        /// Final results
        results: MatchResults,
    },

    /// Round reset after the restart delay
    MatchReset {
        /// Phase after the reset
        phase: MatchPhase,
    },

    /// Periodic full-state snapshot
    Snapshot {
        /// Full state
        snapshot: GameSnapshot,
    },
}

/// Outbound notification with its ordering key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    /// Tick it was produced on
    pub tick: u64,
    /// Ordering within the tick
    pub priority: NotificationPriority,
    /// Player concerned (tie-breaker and routing hint)
    pub player_id: Option<PlayerId>,
    /// Payload
    pub data: NotificationData,
}

impl Notification {
    /// Create a notification; priority and player come from the payload.
    pub fn new(tick: u64, data: NotificationData) -> Self {
        use NotificationData::*;
        let (priority, player_id) = match &data {
            PlayerJoined { player_id, .. } => (NotificationPriority::Roster, Some(*player_id)),
            PlayerLeft { player_id } => (NotificationPriority::Roster, Some(*player_id)),
            TeamChanged { player_id, .. } => (NotificationPriority::Roster, Some(*player_id)),
            PositionCorrected { player_id, .. } => (NotificationPriority::Correction, Some(*player_id)),
            IntentRejected { player_id, .. } => (NotificationPriority::Correction, Some(*player_id)),
            JumpAccepted { player_id } => (NotificationPriority::Correction, Some(*player_id)),
            DamageApplied { target, .. } => (NotificationPriority::Damage, Some(*target)),
            Healed { target, .. } => (NotificationPriority::Damage, Some(*target)),
            PlayerDied { victim, .. } => (NotificationPriority::Death, Some(*victim)),
            EffectApplied { target, .. } => (NotificationPriority::Effect, Some(*target)),
            EffectRemoved { target, .. } => (NotificationPriority::Effect, Some(*target)),
            EffectExpired { target, .. } => (NotificationPriority::Effect, Some(*target)),
            PlayerRespawned { player_id, .. } => (NotificationPriority::Respawn, Some(*player_id)),
            MatchStarting { .. } | MatchAborted | MatchStarted { .. } | MatchEnded { .. } | MatchReset { .. } => {
                (NotificationPriority::Match, None)
            }
            Snapshot { .. } => (NotificationPriority::Snapshot, None),
        };

        Self { tick, priority, player_id, data }
    }
}

impl PartialEq for Notification {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick
            && self.priority == other.priority
            && self.player_id == other.player_id
    }
}

impl Eq for Notification {}

impl PartialOrd for Notification {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Notification {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Sort by: tick, then priority, then player_id
        self.tick
            .cmp(&other.tick)
            .then(self.priority.cmp(&other.priority))
            .then(self.player_id.cmp(&other.player_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_ordering() {
        let id1 = PlayerId::new([1; 16]);
        let id2 = PlayerId::new([2; 16]);

        let died = Notification::new(10, NotificationData::PlayerDied {
            victim: id2,
            killer: None,
            assists: vec![],
            respawn_at: 0,
        });
        let joined = Notification::new(10, NotificationData::PlayerJoined {
            player_id: id2,
            name: "b".into(),
            team: Team::Blue,
        });
        let left = Notification::new(10, NotificationData::PlayerLeft { player_id: id1 });

        // Same tick: roster before death
        assert!(joined < died);
        // Same tick and priority: lower player first
        assert!(left < joined);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let id = PlayerId::new([1; 16]);
        let mut batch = vec![
            Notification::new(5, NotificationData::Healed { target: id, source: None, amount: 1.0, health: 51.0 }),
            Notification::new(4, NotificationData::MatchAborted),
            Notification::new(5, NotificationData::Healed { target: id, source: None, amount: 2.0, health: 53.0 }),
        ];
        batch.sort();

        assert_eq!(batch[0].tick, 4);
        assert!(matches!(batch[1].data, NotificationData::Healed { amount, .. } if amount == 1.0));
        assert!(matches!(batch[2].data, NotificationData::Healed { amount, .. } if amount == 2.0));
    }

    #[test]
    fn test_channel_fifo() {
        let mut channel = Channel::default();
        channel.publish(1);
        channel.publish(2);
        channel.publish(3);
        assert_eq!(channel.len(), 3);
        assert_eq!(channel.drain(), vec![1, 2, 3]);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_retract_player() {
        let gone = PlayerId::new([9; 16]);
        let other = PlayerId::new([1; 16]);
        let gone_entity = EntityId::new(4, 0);

        let mut bus = EventBus::new();
        bus.hits.publish(HitEvent {
            attacker: other,
            target: gone_entity,
            weapon_id: 1,
            point: Vec3::ZERO,
            distance: 1.0,
        });
        bus.spells.publish(SpellEvent {
            caster: other,
            spell_id: 2,
            position: Vec3::ZERO,
            direction: Vec3::ZERO,
            targets: vec![gone, other],
        });
        bus.deaths.publish(DeathEvent { victim: gone_entity, killer: None, time: 0 });

        bus.retract(gone_entity, gone);

        assert!(bus.hits.is_empty());
        assert!(bus.deaths.is_empty());
        let spells = bus.spells.drain();
        assert_eq!(spells[0].targets, vec![other]);
    }
}
