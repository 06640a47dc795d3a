//! Inbound Intents
//!
//! Client requests arrive between ticks and are buffered here, so every
//! validation in a tick sees the same world. Moves collapse to the newest
//! per player; everything else keeps arrival order.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::vec3::{Rotation, Vec3};
use crate::world::entity::PlayerId;

/// Longest accepted display name.
pub const MAX_NAME_LEN: usize = 32;

// =============================================================================
// INTENT TYPES
// =============================================================================

/// Client-reported movement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveIntent {
    /// Mover
    pub player_id: PlayerId,
    /// Requested position
    pub position: Vec3,
    /// Reported velocity
    pub velocity: Vec3,
    /// View rotation
    pub rotation: Rotation,
    /// Client timestamp (ms), used to drop reordered packets
    pub timestamp: u64,
}

/// Weapon fire.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShootIntent {
    /// Shooter
    pub player_id: PlayerId,
    /// Weapon table id
    pub weapon_id: u32,
    /// Muzzle position
    pub origin: Vec3,
    /// Aim direction
    pub direction: Vec3,
    /// Client timestamp (ms)
    pub timestamp: u64,
}

/// Spell cast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CastIntent {
    /// Caster
    pub player_id: PlayerId,
    /// Spell table id
    pub spell_id: u32,
    /// Cast point
    pub position: Vec3,
    /// Cast direction
    pub direction: Vec3,
    /// Explicit targets
    pub targets: Vec<PlayerId>,
}

/// Anything a client can ask the simulation to do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// Enter the match
    Join {
        /// Joining player
        player_id: PlayerId,
        /// Display name
        name: String,
    },
    /// Move
    Move(MoveIntent),
    /// Fire a weapon
    Shoot(ShootIntent),
    /// Jump
    Jump {
        /// Jumping player
        player_id: PlayerId,
    },
    /// Cast a spell
    CastSpell(CastIntent),
    /// Leave the match
    Leave {
        /// Leaving player
        player_id: PlayerId,
    },
}

impl Intent {
    /// Player that sent the intent.
    pub fn player_id(&self) -> PlayerId {
        match self {
            Intent::Join { player_id, .. } => *player_id,
            Intent::Move(m) => m.player_id,
            Intent::Shoot(s) => s.player_id,
            Intent::Jump { player_id } => *player_id,
            Intent::CastSpell(c) => c.player_id,
            Intent::Leave { player_id } => *player_id,
        }
    }
}

/// Why an intent was refused. Sent back to the client.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Roster is full
    #[error("match is full")]
    MatchFull,
    /// Player id already in the match
    #[error("player already joined")]
    AlreadyJoined,
    /// Display name empty or too long
    #[error("invalid display name")]
    InvalidName,
    /// Player id not in the match
    #[error("unknown player")]
    UnknownPlayer,
    /// Dead players cannot act
    #[error("player is dead")]
    PlayerDead,
    /// Combat is not live
    #[error("match is not active")]
    MatchNotActive,
    /// Malformed or non-finite values
    #[error("invalid input: {detail}")]
    InvalidInput {
        /// What was wrong
        detail: String,
    },
    /// Weapon id not in the table
    #[error("unknown weapon {weapon_id}")]
    UnknownWeapon {
        /// Requested id
        weapon_id: u32,
    },
    /// Spell id not in the table
    #[error("unknown spell {spell_id}")]
    UnknownSpell {
        /// Requested id
        spell_id: u32,
    },
    /// Fired or cast too soon
    #[error("on cooldown")]
    OnCooldown,
    /// Jump without ground under the feet
    #[error("not grounded")]
    NotGrounded,
    /// Target or origin too far away
    #[error("out of range")]
    OutOfRange,
}

impl RejectReason {
    /// Shorthand for [`RejectReason::InvalidInput`].
    pub fn invalid(detail: impl Into<String>) -> Self {
        RejectReason::InvalidInput { detail: detail.into() }
    }
}

/// Validate a display name.
pub fn validate_name(name: &str) -> Result<String, RejectReason> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        return Err(RejectReason::InvalidName);
    }
    Ok(trimmed.to_string())
}

// =============================================================================
// INTENT QUEUE
// =============================================================================

/// Intents for one tick, grouped by processing stage.
#[derive(Clone, Debug, Default)]
pub struct TickIntents {
    /// Joins and leaves in arrival order
    pub roster: Vec<Intent>,
    /// Latest move per player, in player order
    pub moves: Vec<MoveIntent>,
    /// Jumps, shots and casts in arrival order
    pub actions: Vec<Intent>,
}

/// Buffer between the network layer and the tick.
#[derive(Clone, Debug, Default)]
pub struct IntentQueue {
    roster: Vec<Intent>,
    moves: BTreeMap<PlayerId, MoveIntent>,
    actions: Vec<Intent>,
}

impl IntentQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an intent for the next tick.
    pub fn push(&mut self, intent: Intent) {
        match intent {
            Intent::Join { .. } | Intent::Leave { .. } => self.roster.push(intent),
            Intent::Move(m) => {
                let stale = self
                    .moves
                    .get(&m.player_id)
                    .map(|prev| prev.timestamp > m.timestamp)
                    .unwrap_or(false);
                if !stale {
                    self.moves.insert(m.player_id, m);
                }
            }
            Intent::Shoot(_) | Intent::Jump { .. } | Intent::CastSpell(_) => self.actions.push(intent),
        }
    }

    /// Drop every buffered move and action of `player_id`.
    pub fn retract(&mut self, player_id: &PlayerId) {
        self.moves.remove(player_id);
        self.actions.retain(|i| i.player_id() != *player_id);
    }

    /// Take everything buffered.
    pub fn drain(&mut self) -> TickIntents {
        TickIntents {
            roster: std::mem::take(&mut self.roster),
            moves: std::mem::take(&mut self.moves).into_values().collect(),
            actions: std::mem::take(&mut self.actions),
        }
    }

    /// Number of buffered intents.
    pub fn len(&self) -> usize {
        self.roster.len() + self.moves.len() + self.actions.len()
    }

    /// True if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// TESTS
// =============================================================================
