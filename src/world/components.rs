//! Component Kinds
//!
//! The fixed set of per-entity components. Players always carry Position,
//! PhysicsBody, Health and Player together; effects and the damage log are
//! attached on demand.

use std::collections::VecDeque;
use serde::{Serialize, Deserialize};

use crate::core::clock::SimTime;
use crate::core::vec3::{Rotation, Vec3};
use crate::combat::damage::{BodyPart, DamageType};
use crate::world::entity::PlayerId;

// =============================================================================
// TEAM
// =============================================================================

/// Team a player fights for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Team {
    /// Red team
    Red = 0,
    /// Blue team
    Blue = 1,
}

impl Team {
    /// Both teams in a fixed order.
    pub const ALL: [Team; 2] = [Team::Red, Team::Blue];

    /// The other team.
    pub fn opponent(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }

    /// Index into per-team arrays.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

// =============================================================================
// POSITION
// =============================================================================

/// World transform. Written only by the physics layer after validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Translation in world units
    pub translation: Vec3,
    /// View rotation
    pub rotation: Rotation,
}

impl Position {
    /// Position at `translation` with no rotation.
    pub fn at(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Rotation::default(),
        }
    }
}

// =============================================================================
// PHYSICS BODY
// =============================================================================

/// Collision group bits.
pub mod groups {
    /// Static map geometry
    pub const WORLD: u32 = 1 << 0;
    /// Player capsules
    pub const PLAYER: u32 = 1 << 1;
    /// Loose props
    pub const PROP: u32 = 1 << 2;
    /// Everything
    pub const ALL: u32 = u32::MAX;
}

/// Collision shape descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Shape {
    /// Axis-aligned box
    Box {
        /// Half extents along each axis
        half_extents: Vec3,
    },
    /// Sphere
    Sphere {
        /// Radius
        radius: f32,
    },
    /// Vertical capsule
    Capsule {
        /// Half height of the cylindrical part
        half_height: f32,
        /// Radius of the caps
        radius: f32,
    },
}

impl Shape {
    /// Distance from the shape's center to its lowest point.
    pub fn half_height(&self) -> f32 {
        match *self {
            Shape::Box { half_extents } => half_extents.y,
            Shape::Sphere { radius } => radius,
            Shape::Capsule { half_height, radius } => half_height + radius,
        }
    }
}

/// Physical properties of an entity. Owned by the physics validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicsBody {
    /// Mass in kg. Zero means immovable.
    pub mass: f32,
    /// Friction coefficient
    pub friction: f32,
    /// Restitution (bounciness)
    pub restitution: f32,
    /// Linear velocity damping
    pub linear_damping: f32,
    /// Angular velocity damping
    pub angular_damping: f32,
    /// Groups this body belongs to
    pub collision_group: u32,
    /// Groups this body collides with
    pub collision_mask: u32,
    /// Shape
    pub shape: Shape,
    /// Never moves
    pub is_static: bool,
    /// Moved by the server, not by forces
    pub is_kinematic: bool,
    /// Standing on something as of the last physics step
    pub grounded: bool,
    /// Last time `grounded` was observed true
    pub last_grounded: Option<SimTime>,
    /// Last accepted velocity
    pub velocity: Vec3,
}

impl PhysicsBody {
    /// Kinematic capsule for a player.
    pub fn player(half_height: f32, radius: f32, mass: f32) -> Self {
        Self {
            mass,
            friction: 0.0,
            restitution: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            collision_group: groups::PLAYER,
            collision_mask: groups::ALL,
            shape: Shape::Capsule { half_height, radius },
            is_static: false,
            is_kinematic: true,
            grounded: false,
            last_grounded: None,
            velocity: Vec3::ZERO,
        }
    }

    /// Immovable piece of map geometry.
    pub fn fixed(shape: Shape) -> Self {
        Self {
            mass: 0.0,
            friction: 0.8,
            restitution: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            collision_group: groups::WORLD,
            collision_mask: groups::ALL,
            shape,
            is_static: true,
            is_kinematic: false,
            grounded: false,
            last_grounded: None,
            velocity: Vec3::ZERO,
        }
    }

    /// True if forces can never move this body.
    #[inline]
    pub fn is_immovable(&self) -> bool {
        self.is_static || self.mass <= 0.0
    }
}

// =============================================================================
// HEALTH
// =============================================================================

/// Hit points. `0 <= current <= max` at every observation point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Health {
    /// Current hit points
    pub current: f32,
    /// Maximum hit points
    pub max: f32,
    /// Passive regeneration per second
    pub regen_rate: f32,
    /// Last time damage landed
    pub last_damage_time: Option<SimTime>,
}

impl Health {
    /// Full health.
    pub fn new(max: f32, regen_rate: f32) -> Self {
        Self {
            current: max,
            max,
            regen_rate,
            last_damage_time: None,
        }
    }

    /// Refill and forget the last hit.
    pub fn reset(&mut self) {
        self.current = self.max;
        self.last_damage_time = None;
    }

    /// True if at or below zero.
    #[inline]
    pub fn is_depleted(&self) -> bool {
        self.current <= 0.0
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// Player identity, team, life state and round statistics.
///
/// `is_alive` decides whether the entity takes part in hit detection and
/// damage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Stable player id
    pub id: PlayerId,
    /// Display name
    pub name: String,
    /// Team
    pub team: Team,
    /// Participates in hit detection and damage
    pub is_alive: bool,
    /// When the player last died
    pub death_time: Option<SimTime>,
    /// When the pending respawn is due
    pub respawn_time: Option<SimTime>,
    /// Kills this round
    pub kills: u32,
    /// Deaths this round
    pub deaths: u32,
    /// Assists this round
    pub assists: u32,
    /// Score this round
    pub score: u32,
}

impl Player {
    /// A live player with clean statistics.
    pub fn new(id: PlayerId, name: impl Into<String>, team: Team) -> Self {
        Self {
            id,
            name: name.into(),
            team,
            is_alive: true,
            death_time: None,
            respawn_time: None,
            kills: 0,
            deaths: 0,
            assists: 0,
            score: 0,
        }
    }

    /// Clear round statistics.
    pub fn reset_stats(&mut self) {
        self.kills = 0;
        self.deaths = 0;
        self.assists = 0;
        self.score = 0;
    }
}

// =============================================================================
// DAMAGE LOG
// =============================================================================

/// What dealt a logged hit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DamageSource {
    /// Weapon shot
    Weapon {
        /// Weapon table id
        weapon_id: u32,
        /// Region that was hit
        body_part: BodyPart,
        /// Headshot
        critical: bool,
    },
    /// Spell, direct or area
    Spell {
        /// Spell table id
        spell_id: u32,
    },
    /// Damage-over-time pulse
    Effect,
}

/// One entry in the damage log.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DamageRecord {
    /// Who dealt it, if anyone
    pub attacker: Option<PlayerId>,
    /// Damage after modifiers. Zero for a blocked hit.
    pub amount: u32,
    /// Damage type
    pub damage_type: DamageType,
    /// When it landed
    pub timestamp: SimTime,
    /// Where it came from
    pub source: DamageSource,
}

/// Capped FIFO of recent hits, used for kill and assist attribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DamageLog {
    entries: VecDeque<DamageRecord>,
    capacity: usize,
}

impl DamageLog {
    /// Empty log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append, evicting the oldest entry when full.
    pub fn push(&mut self, record: DamageRecord) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &DamageRecord> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent attacker that actually dealt damage.
    pub fn latest_attacker(&self) -> Option<PlayerId> {
        self.entries
            .iter()
            .rev()
            .filter(|r| r.amount > 0)
            .find_map(|r| r.attacker)
    }

    /// Distinct attackers that dealt damage at or after `since`, sorted.
    pub fn attackers_since(&self, since: SimTime) -> Vec<PlayerId> {
        let mut attackers: Vec<PlayerId> = self.entries
            .iter()
            .filter(|r| r.timestamp >= since && r.amount > 0)
            .filter_map(|r| r.attacker)
            .collect();
        attackers.sort();
        attackers.dedup();
        attackers
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(attacker: u8, amount: u32, timestamp: SimTime) -> DamageRecord {
        DamageRecord {
            attacker: Some(PlayerId::new([attacker; 16])),
            amount,
            damage_type: DamageType::Physical,
            timestamp,
            source: DamageSource::Effect,
        }
    }

    #[test]
    fn test_team_opponent() {
        assert_eq!(Team::Red.opponent(), Team::Blue);
        assert_eq!(Team::Blue.opponent(), Team::Red);
        assert_eq!(Team::Blue.index(), 1);
    }

    #[test]
    fn test_shape_half_height() {
        let capsule = Shape::Capsule { half_height: 1.2, radius: 0.5 };
        assert!((capsule.half_height() - 1.7).abs() < 1e-6);
        assert_eq!(Shape::Sphere { radius: 2.0 }.half_height(), 2.0);
    }

    #[test]
    fn test_fixed_body_is_immovable() {
        let body = PhysicsBody::fixed(Shape::Sphere { radius: 1.0 });
        assert!(body.is_immovable());
        assert!(!PhysicsBody::player(1.2, 0.5, 80.0).is_immovable());
    }

    #[test]
    fn test_damage_log_evicts_fifo() {
        let mut log = DamageLog::new(20);
        for i in 0..25u64 {
            log.push(record(1, 10, i));
        }
        assert_eq!(log.len(), 20);
        assert_eq!(log.iter().next().map(|r| r.timestamp), Some(5));
        assert_eq!(log.iter().last().map(|r| r.timestamp), Some(24));
    }

    #[test]
    fn test_latest_attacker_skips_blocked_hits() {
        let mut log = DamageLog::new(20);
        log.push(record(1, 10, 0));
        log.push(record(2, 0, 1));
        assert_eq!(log.latest_attacker(), Some(PlayerId::new([1; 16])));
    }

    #[test]
    fn test_attackers_since() {
        let mut log = DamageLog::new(20);
        log.push(record(3, 10, 100));
        log.push(record(1, 10, 5000));
        log.push(record(2, 10, 6000));
        log.push(record(1, 10, 7000));

        let attackers = log.attackers_since(1000);
        assert_eq!(attackers, vec![PlayerId::new([1; 16]), PlayerId::new([2; 16])]);
    }

    #[test]
    fn test_player_reset_stats() {
        let mut p = Player::new(PlayerId::new([1; 16]), "a", Team::Red);
        p.kills = 3;
        p.score = 300;
        p.reset_stats();
        assert_eq!(p.kills, 0);
        assert_eq!(p.score, 0);
    }
}
