//! Game State Snapshots
//!
//! Full outward-facing state, built only after a tick has committed. The
//! SHA-256 state hash lets clients detect divergence.

use serde::{Serialize, Deserialize};

use crate::core::clock::TickStamp;
use crate::core::hash::compute_state_hash;
use crate::core::vec3::{Rotation, Vec3};
use crate::game::lifecycle::{MatchController, MatchPhase};
use crate::world::components::Team;
use crate::world::entity::PlayerId;
use crate::world::store::WorldStore;

/// One player row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Player
    pub player_id: PlayerId,
    /// Display name
    pub name: String,
    /// Team
    pub team: Team,
    /// Position
    pub position: Vec3,
    /// View rotation
    pub rotation: Rotation,
    /// Current health
    pub health: f32,
    /// Alive
    pub alive: bool,
    /// Kills
    pub kills: u32,
    /// Deaths
    pub deaths: u32,
    /// Score
    pub score: u32,
}

/// Periodic full-state snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Tick it was taken on
    pub tick: u64,
    /// Match phase
    pub phase: MatchPhase,
    /// Time left in a timed phase
    pub time_remaining_ms: Option<u64>,
    /// Team scores, indexed by [`Team::index`]
    pub team_scores: [u32; 2],
    /// Every player, in player id order
    pub players: Vec<PlayerSnapshot>,
    /// Hex SHA-256 over the rows above
    pub state_hash: String,
}

impl GameSnapshot {
    /// Capture the committed state.
    pub fn capture(world: &WorldStore, controller: &MatchController, stamp: TickStamp) -> Self {
        let players: Vec<PlayerSnapshot> = world
            .player_entities()
            .filter_map(|(_, entity)| {
                let player = world.player(entity)?;
                let position = world.position(entity)?;
                let health = world.health(entity)?;
                Some(PlayerSnapshot {
                    player_id: player.id,
                    name: player.name.clone(),
                    team: player.team,
                    position: position.translation,
                    rotation: position.rotation,
                    health: health.current,
                    alive: player.is_alive,
                    kills: player.kills,
                    deaths: player.deaths,
                    score: player.score,
                })
            })
            .collect();

        let phase = controller.phase();
        let team_scores = controller.team_scores();

        let hash = compute_state_hash(stamp.tick, controller.match_seed(), |h| {
            h.update_u8(phase.tag());
            h.update_u32(team_scores[0]);
            h.update_u32(team_scores[1]);
            h.update_u32(players.len() as u32);
            for p in &players {
                h.update_uuid(p.player_id.as_bytes());
                h.update_u8(p.team.index() as u8);
                h.update_vec3(p.position);
                h.update_f32(p.rotation.pitch);
                h.update_f32(p.rotation.yaw);
                h.update_f32(p.health);
                h.update_bool(p.alive);
                h.update_u32(p.kills);
                h.update_u32(p.deaths);
                h.update_u32(p.score);
            }
        });

        Self {
            tick: stamp.tick,
            phase,
            time_remaining_ms: controller.time_remaining(stamp.now),
            team_scores,
            players,
            state_hash: hex::encode(hash),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
