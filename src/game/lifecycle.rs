//! Match Lifecycle
//!
//! ```text
//!   Waiting ──enough players──▶ Starting ──countdown──▶ Active
//!      ▲                           │                      │
//!      │◀────too few players───────┘          time / score / empty team
//!      │                                                  ▼
//!      └───────────────restart delay, full reset──────── Ended
//! ```
//!
//! The controller also owns scoring, the death queue drain and respawn
//! scheduling.

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::config::{MatchRules, ServerConfig};
use crate::core::clock::{SimTime, TickStamp};
use crate::core::rng::{derive_match_seed, DeterministicRng};
use crate::core::vec3::Vec3;
use crate::game::events::{EventBus, Notification, NotificationData};
use crate::game::intent::RejectReason;
use crate::game::map::ArenaMap;
use crate::physics::validator::PhysicsValidator;
use crate::world::components::Team;
use crate::world::entity::{EntityId, PlayerId};
use crate::world::store::WorldStore;

// =============================================================================
// MATCH PHASE
// =============================================================================

/// Round lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum MatchPhase {
    /// Not enough players
    #[default]
    Waiting,
    /// Countdown running
    Starting {
        /// When the round goes live
        ends_at: SimTime,
    },
    /// Combat is live
    Active {
        /// Round start time
        started_at: SimTime,
    },
    /// Results shown, waiting for the restart
    Ended {
        /// When the round ended
        ended_at: SimTime,
    },
}

impl MatchPhase {
    /// Stable numeric tag for hashing.
    pub fn tag(self) -> u8 {
        match self {
            MatchPhase::Waiting => 0,
            MatchPhase::Starting { .. } => 1,
            MatchPhase::Active { .. } => 2,
            MatchPhase::Ended { .. } => 3,
        }
    }
}

/// Why a round ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchEndReason {
    /// Max duration reached
    TimeLimit,
    /// A team reached the score limit
    ScoreLimit,
    /// A team has no players left
    TeamEliminated,
}

/// Final line for one player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerResult {
    /// Player
    pub player_id: PlayerId,
    /// Display name
    pub name: String,
    /// Team
    pub team: Team,
    /// Kills
    pub kills: u32,
    /// Deaths
    pub deaths: u32,
    /// Assists
    pub assists: u32,
    /// Score
    pub score: u32,
}

/// Outcome of a round, handed to the results sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResults {
    /// Round number since process start
    pub match_number: u32,
    /// Winning team, None for a draw
    pub winner: Option<Team>,
    /// Final team scores, indexed by [`Team::index`]
    pub team_scores: [u32; 2],
    /// Players by score, highest first
    pub players: Vec<PlayerResult>,
    /// Round length in simulation milliseconds
    pub duration_ms: u64,
    /// End condition that fired
    pub reason: MatchEndReason,
    /// Wall-clock end time
    pub ended_at: DateTime<Utc>,
}

// =============================================================================
// MATCH CONTROLLER
// =============================================================================

/// Phase machine, scores and respawn queue. Lives for the whole process
/// and is reset between rounds.
#[derive(Clone, Debug)]
pub struct MatchController {
    rules: MatchRules,
    server_seed: u64,
    map: ArenaMap,
    rng: DeterministicRng,
    phase: MatchPhase,
    match_number: u32,
    team_scores: [u32; 2],
    respawn_queue: BTreeMap<PlayerId, SimTime>,
}

impl MatchController {
    /// Controller in the Waiting phase.
    pub fn new(config: &ServerConfig, map: ArenaMap) -> Self {
        let server_seed = config.simulation.seed;
        Self {
            rules: config.match_rules.clone(),
            server_seed,
            map,
            rng: DeterministicRng::new(derive_match_seed(server_seed, 0)),
            phase: MatchPhase::Waiting,
            match_number: 0,
            team_scores: [0; 2],
            respawn_queue: BTreeMap::new(),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// True while combat is live.
    pub fn is_active(&self) -> bool {
        matches!(self.phase, MatchPhase::Active { .. })
    }

    /// Rounds started so far.
    pub fn match_number(&self) -> u32 {
        self.match_number
    }

    /// Seed of the current round.
    pub fn match_seed(&self) -> u64 {
        derive_match_seed(self.server_seed, self.match_number)
    }

    /// Team scores, indexed by [`Team::index`].
    pub fn team_scores(&self) -> [u32; 2] {
        self.team_scores
    }

    /// Milliseconds left in the current phase, if it is timed.
    pub fn time_remaining(&self, now: SimTime) -> Option<u64> {
        match self.phase {
            MatchPhase::Waiting => None,
            MatchPhase::Starting { ends_at } => Some(ends_at.saturating_sub(now)),
            MatchPhase::Active { started_at } => {
                Some((started_at + self.rules.max_duration_ms).saturating_sub(now))
            }
            MatchPhase::Ended { ended_at } => {
                Some((ended_at + self.rules.restart_delay_ms).saturating_sub(now))
            }
        }
    }

    /// Pending respawn of `player`, if any.
    pub fn respawn_due(&self, player: &PlayerId) -> Option<SimTime> {
        self.respawn_queue.get(player).copied()
    }

    /// Number of pending respawns.
    pub fn pending_respawns(&self) -> usize {
        self.respawn_queue.len()
    }

    // -------------------------------------------------------------------------
    // Roster
    // -------------------------------------------------------------------------

    /// Reject a join when the roster is full.
    pub fn check_capacity(&self, world: &WorldStore) -> Result<(), RejectReason> {
        if world.player_count() >= self.rules.max_players {
            return Err(RejectReason::MatchFull);
        }
        Ok(())
    }

    /// Team for a new player: the smaller one, Red on a tie.
    pub fn assign_team(&self, world: &WorldStore) -> Team {
        let [red, blue] = team_counts(world);
        if blue < red {
            Team::Blue
        } else {
            Team::Red
        }
    }

    /// Random point in the team's spawn area.
    pub fn spawn_point(&mut self, team: Team) -> Vec3 {
        self.map.spawn_point(team, &mut self.rng)
    }

    /// Drop a departing player from every pending structure.
    pub fn retract(&mut self, player: &PlayerId) {
        if self.respawn_queue.remove(player).is_some() {
            debug!(player = %player, "Pending respawn cancelled");
        }
    }

    // -------------------------------------------------------------------------
    // Deaths and respawns
    // -------------------------------------------------------------------------

    /// Drain the death queue.
    ///
    /// A victim already marked dead is skipped, so a player queued twice
    /// dies once.
    pub fn process_death_queue(&mut self, world: &mut WorldStore, bus: &mut EventBus, stamp: TickStamp) {
        let now = stamp.now;
        let active = self.is_active();

        for death in bus.deaths.drain() {
            let Some(victim) = world.player(death.victim) else {
                warn!(entity = ?death.victim, "Death of stale entity skipped");
                continue;
            };
            if !victim.is_alive {
                debug!(player = %victim.id, "Duplicate death skipped");
                continue;
            }
            let victim_id = victim.id;
            let victim_team = victim.team;
            let killer = death.killer.filter(|k| *k != victim_id);
            let respawn_at = now + self.rules.respawn_delay_ms;

            if let Some(p) = world.player_mut(death.victim) {
                p.is_alive = false;
                p.death_time = Some(death.time);
                p.respawn_time = Some(respawn_at);
                p.deaths += 1;
            }

            if let Some(killer_player) = killer.and_then(|k| world.entity_of(&k)).and_then(|e| world.player_mut(e)) {
                killer_player.kills += 1;
                killer_player.score += self.rules.kill_score;
                if active && killer_player.team != victim_team {
                    self.team_scores[killer_player.team.index()] += 1;
                }
            }

            let since = now.saturating_sub(self.rules.assist_window_ms);
            let assists: Vec<PlayerId> = world
                .damage_log(death.victim)
                .map(|log| log.attackers_since(since))
                .unwrap_or_default()
                .into_iter()
                .filter(|a| Some(*a) != killer && *a != victim_id)
                .collect();
            for assist in &assists {
                if let Some(p) = world.entity_of(assist).and_then(|e| world.player_mut(e)) {
                    p.assists += 1;
                    p.score += self.rules.assist_score;
                }
            }

            self.respawn_queue.insert(victim_id, respawn_at);
            bus.notify(Notification::new(stamp.tick, NotificationData::PlayerDied {
                victim: victim_id,
                killer,
                assists,
                respawn_at,
            }));
            info!(
                victim = %victim_id,
                killer = %killer.map(|k| k.to_string()).unwrap_or_else(|| "-".into()),
                respawn_at,
                "Player died"
            );
        }
    }

    /// Respawn every player whose timer has elapsed. Paused while Ended.
    pub fn process_respawns(
        &mut self,
        world: &mut WorldStore,
        physics: &mut PhysicsValidator,
        bus: &mut EventBus,
        stamp: TickStamp,
    ) {
        if matches!(self.phase, MatchPhase::Ended { .. }) {
            return;
        }

        let due: Vec<PlayerId> = self
            .respawn_queue
            .iter()
            .filter(|(_, &at)| at <= stamp.now)
            .map(|(id, _)| *id)
            .collect();

        for player_id in due {
            self.respawn_queue.remove(&player_id);
            match world.entity_of(&player_id) {
                Some(entity) => self.respawn(world, physics, bus, stamp, entity),
                None => warn!(player = %player_id, "Respawn of unknown player skipped"),
            }
        }
    }

    /// Bring a player back at a team spawn point with full health and no
    /// effects.
    pub fn respawn(
        &mut self,
        world: &mut WorldStore,
        physics: &mut PhysicsValidator,
        bus: &mut EventBus,
        stamp: TickStamp,
        entity: EntityId,
    ) {
        let Some(player) = world.player_mut(entity) else {
            warn!(entity = ?entity, "Respawn of non-player skipped");
            return;
        };
        player.is_alive = true;
        player.death_time = None;
        player.respawn_time = None;
        let (player_id, team) = (player.id, player.team);

        if let Some(health) = world.health_mut(entity) {
            health.reset();
        }
        world.clear_effects(entity);
        world.clear_damage_log(entity);

        let position = self.spawn_point(team);
        physics.teleport(world, entity, position);

        bus.notify(Notification::new(stamp.tick, NotificationData::PlayerRespawned { player_id, position }));
        debug!(player = %player_id, %position, "Player respawned");
    }

    // -------------------------------------------------------------------------
    // Phase machine
    // -------------------------------------------------------------------------

    /// Advance the phase machine. Returns the results when a round ends.
    pub fn update(
        &mut self,
        world: &mut WorldStore,
        physics: &mut PhysicsValidator,
        bus: &mut EventBus,
        stamp: TickStamp,
    ) -> Option<MatchResults> {
        let now = stamp.now;

        match self.phase {
            MatchPhase::Waiting => {
                for entity in self.rebalance_teams(world, bus, stamp) {
                    if let Some(player) = world.player(entity) {
                        self.respawn_queue.remove(&player.id);
                    }
                    self.respawn(world, physics, bus, stamp, entity);
                }
                self.try_begin_countdown(world, bus, stamp);
            }
            MatchPhase::Starting { ends_at } => {
                if world.player_count() < self.rules.min_players {
                    self.phase = MatchPhase::Waiting;
                    bus.notify(Notification::new(stamp.tick, NotificationData::MatchAborted));
                    info!(players = world.player_count(), "Countdown aborted");
                } else if now >= ends_at {
                    self.start_round(bus, stamp);
                }
            }
            MatchPhase::Active { started_at } => {
                if let Some(reason) = self.end_condition(world, started_at, now) {
                    return Some(self.end_round(world, bus, stamp, started_at, reason));
                }
            }
            MatchPhase::Ended { ended_at } => {
                if now >= ended_at + self.rules.restart_delay_ms {
                    self.reset_round(world, physics, bus, stamp);
                }
            }
        }
        None
    }

    /// Move players from the larger team until the sizes differ by at most
    /// one. The highest ids move first. Returns the moved entities.
    fn rebalance_teams(&mut self, world: &mut WorldStore, bus: &mut EventBus, stamp: TickStamp) -> Vec<EntityId> {
        let mut moved = Vec::new();
        let [red, blue] = team_counts(world);
        if red.abs_diff(blue) <= 1 {
            return moved;
        }
        let (from, excess) = if red > blue { (Team::Red, (red - blue) / 2) } else { (Team::Blue, (blue - red) / 2) };

        let candidates: Vec<EntityId> = world
            .player_entities()
            .filter(|(_, e)| world.player(*e).is_some_and(|p| p.team == from))
            .map(|(_, e)| e)
            .collect();
        for entity in candidates.into_iter().rev().take(excess) {
            let Some(player) = world.player_mut(entity) else { continue };
            player.team = from.opponent();
            bus.notify(Notification::new(stamp.tick, NotificationData::TeamChanged {
                player_id: player.id,
                team: player.team,
            }));
            info!(player = %player.id, team = ?player.team, "Team rebalanced");
            moved.push(entity);
        }
        moved
    }

    fn try_begin_countdown(&mut self, world: &WorldStore, bus: &mut EventBus, stamp: TickStamp) {
        if world.player_count() < self.rules.min_players {
            return;
        }
        self.phase = MatchPhase::Starting { ends_at: stamp.now + self.rules.countdown_ms };
        bus.notify(Notification::new(stamp.tick, NotificationData::MatchStarting {
            countdown_ms: self.rules.countdown_ms,
        }));
        info!(players = world.player_count(), countdown_ms = self.rules.countdown_ms, "Match starting");
    }

    fn start_round(&mut self, bus: &mut EventBus, stamp: TickStamp) {
        self.match_number += 1;
        self.team_scores = [0; 2];
        self.rng = DeterministicRng::new(derive_match_seed(self.server_seed, self.match_number));
        self.phase = MatchPhase::Active { started_at: stamp.now };

        bus.notify(Notification::new(stamp.tick, NotificationData::MatchStarted {
            match_number: self.match_number,
        }));
        info!(match_number = self.match_number, "Match started");
    }

    fn end_condition(&self, world: &WorldStore, started_at: SimTime, now: SimTime) -> Option<MatchEndReason> {
        if now.saturating_sub(started_at) >= self.rules.max_duration_ms {
            return Some(MatchEndReason::TimeLimit);
        }
        if self.team_scores.iter().any(|&s| s >= self.rules.score_limit) {
            return Some(MatchEndReason::ScoreLimit);
        }
        if team_counts(world).contains(&0) {
            return Some(MatchEndReason::TeamEliminated);
        }
        None
    }

    fn end_round(
        &mut self,
        world: &WorldStore,
        bus: &mut EventBus,
        stamp: TickStamp,
        started_at: SimTime,
        reason: MatchEndReason,
    ) -> MatchResults {
        self.phase = MatchPhase::Ended { ended_at: stamp.now };

        let [red, blue] = self.team_scores;
        let winner = match red.cmp(&blue) {
            std::cmp::Ordering::Greater => Some(Team::Red),
            std::cmp::Ordering::Less => Some(Team::Blue),
            std::cmp::Ordering::Equal => None,
        };

        let mut players: Vec<PlayerResult> = world
            .player_entities()
            .filter_map(|(_, e)| world.player(e))
            .map(|p| PlayerResult {
                player_id: p.id,
                name: p.name.clone(),
                team: p.team,
                kills: p.kills,
                deaths: p.deaths,
                assists: p.assists,
                score: p.score,
            })
            .collect();
        // Tie-break by kills, then ID
        players.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(b.kills.cmp(&a.kills))
                .then(a.player_id.cmp(&b.player_id))
        });

        let results = MatchResults {
            match_number: self.match_number,
            winner,
            team_scores: self.team_scores,
            players,
            duration_ms: stamp.now.saturating_sub(started_at),
            reason,
            ended_at: Utc::now(),
        };

        bus.notify(Notification::new(stamp.tick, NotificationData::MatchEnded { results: results.clone() }));
        info!(
            match_number = self.match_number,
            winner = ?winner,
            red,
            blue,
            reason = ?reason,
            "Match ended"
        );
        results
    }

    fn reset_round(
        &mut self,
        world: &mut WorldStore,
        physics: &mut PhysicsValidator,
        bus: &mut EventBus,
        stamp: TickStamp,
    ) {
        self.team_scores = [0; 2];
        self.respawn_queue.clear();
        self.phase = MatchPhase::Waiting;
        self.rebalance_teams(world, bus, stamp);

        let entities: Vec<EntityId> = world.player_entities().map(|(_, e)| e).collect();
        for entity in entities {
            if let Some(player) = world.player_mut(entity) {
                player.reset_stats();
            }
            self.respawn(world, physics, bus, stamp, entity);
        }

        self.try_begin_countdown(world, bus, stamp);
        bus.notify(Notification::new(stamp.tick, NotificationData::MatchReset { phase: self.phase }));
        info!(phase = ?self.phase, "Match reset");
    }
}

/// Players per team, indexed by [`Team::index`].
fn team_counts(world: &WorldStore) -> [usize; 2] {
    let mut counts = [0; 2];
    for (_, entity) in world.player_entities() {
        if let Some(p) = world.player(entity) {
            counts[p.team.index()] += 1;
        }
    }
    counts
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use crate::game::events::DeathEvent;
    use crate::physics::rapier::RapierBackend;
    use crate::world::components::{DamageRecord, DamageSource, Health, PhysicsBody, Player, Position};
    use crate::combat::damage::DamageType;
    use crate::world::store::PlayerBundle;

    struct Harness {
        world: WorldStore,
        physics: PhysicsValidator,
        bus: EventBus,
        controller: MatchController,
    }

    fn harness(rules: MatchRules) -> Harness {
        let mut config = ServerConfig::default();
        config.match_rules = rules;
        let mut world = WorldStore::default();
        let mut physics = PhysicsValidator::new(Box::new(RapierBackend::new(-9.81)), PhysicsConfig::default(), 60, 5);
        let map = ArenaMap::build(&config.map, &mut world, &mut physics).unwrap();
        Harness {
            world,
            physics,
            bus: EventBus::new(),
            controller: MatchController::new(&config, map),
        }
    }

    fn join(h: &mut Harness, byte: u8) -> EntityId {
        let id = PlayerId::new([byte; 16]);
        let team = h.controller.assign_team(&h.world);
        let at = h.controller.spawn_point(team);
        let entity = h
            .world
            .spawn_player(PlayerBundle {
                position: Position::at(at),
                body: PhysicsBody::player(1.2, 0.5, 80.0),
                health: Health::new(100.0, 5.0),
                player: Player::new(id, format!("p{byte}"), team),
            })
            .unwrap();
        h.physics.register(&h.world, entity).unwrap();
        entity
    }

    fn run(h: &mut Harness, tick: u64, now: SimTime) -> Option<MatchResults> {
        let stamp = TickStamp::new(tick, now);
        h.controller.update(&mut h.world, &mut h.physics, &mut h.bus, stamp)
    }

    fn activate(h: &mut Harness) {
        let countdown = h.controller.rules.countdown_ms;
        run(h, 1, 0);
        run(h, 2, countdown);
        assert!(h.controller.is_active());
    }

    #[test]
    fn test_team_balancing() {
        let mut h = harness(MatchRules::default());
        let a = join(&mut h, 1);
        let b = join(&mut h, 2);
        let c = join(&mut h, 3);

        assert_eq!(h.world.player(a).unwrap().team, Team::Red);
        assert_eq!(h.world.player(b).unwrap().team, Team::Blue);
        assert_eq!(h.world.player(c).unwrap().team, Team::Red);
    }

    #[test]
    fn test_capacity() {
        let mut h = harness(MatchRules { max_players: 2, ..MatchRules::default() });
        join(&mut h, 1);
        assert!(h.controller.check_capacity(&h.world).is_ok());
        join(&mut h, 2);
        assert_eq!(h.controller.check_capacity(&h.world), Err(RejectReason::MatchFull));
    }

    #[test]
    fn test_countdown_then_active() {
        let mut h = harness(MatchRules::default());
        join(&mut h, 1);
        run(&mut h, 1, 0);
        assert_eq!(h.controller.phase(), MatchPhase::Waiting);

        join(&mut h, 2);
        run(&mut h, 2, 100);
        assert_eq!(h.controller.phase(), MatchPhase::Starting { ends_at: 5_100 });

        run(&mut h, 3, 5_099);
        assert!(!h.controller.is_active());
        run(&mut h, 4, 5_100);
        assert_eq!(h.controller.phase(), MatchPhase::Active { started_at: 5_100 });
        assert_eq!(h.controller.match_number(), 1);
    }

    #[test]
    fn test_countdown_aborts_when_player_leaves() {
        let mut h = harness(MatchRules::default());
        join(&mut h, 1);
        let b = join(&mut h, 2);
        run(&mut h, 1, 0);

        h.world.despawn(b);
        run(&mut h, 2, 1_000);

        assert_eq!(h.controller.phase(), MatchPhase::Waiting);
        assert!(h
            .bus
            .outbound
            .iter()
            .any(|n| matches!(n.data, NotificationData::MatchAborted)));
    }

    #[test]
    fn test_death_processed_once() {
        let mut h = harness(MatchRules::default());
        let a = join(&mut h, 1);
        let b = join(&mut h, 2);
        activate(&mut h);
        let killer = h.world.player(a).unwrap().id;

        h.world.health_mut(b).unwrap().current = 0.0;
        for _ in 0..2 {
            h.bus.deaths.publish(DeathEvent { victim: b, killer: Some(killer), time: 6_000 });
        }
        h.controller.process_death_queue(&mut h.world, &mut h.bus, TickStamp::new(10, 6_000));

        let victim = h.world.player(b).unwrap();
        assert!(!victim.is_alive);
        assert_eq!(victim.deaths, 1);
        assert_eq!(victim.respawn_time, Some(9_000));
        assert_eq!(h.world.player(a).unwrap().kills, 1);
        assert_eq!(h.world.player(a).unwrap().score, 100);
        assert_eq!(h.controller.team_scores(), [1, 0]);
        assert_eq!(h.controller.pending_respawns(), 1);

        let died = h
            .bus
            .outbound
            .iter()
            .filter(|n| matches!(n.data, NotificationData::PlayerDied { .. }))
            .count();
        assert_eq!(died, 1);
    }

    #[test]
    fn test_assists_credited() {
        let mut h = harness(MatchRules::default());
        let a = join(&mut h, 1);
        let b = join(&mut h, 2);
        let c = join(&mut h, 3);
        activate(&mut h);
        let (killer, helper) = (h.world.player(a).unwrap().id, h.world.player(c).unwrap().id);

        h.world.damage_log_mut_or_default(b).unwrap().push(DamageRecord {
            attacker: Some(helper),
            amount: 40,
            damage_type: DamageType::Physical,
            timestamp: 5_500,
            source: DamageSource::Effect,
        });
        h.bus.deaths.publish(DeathEvent { victim: b, killer: Some(killer), time: 6_000 });
        h.controller.process_death_queue(&mut h.world, &mut h.bus, TickStamp::new(10, 6_000));

        let helper_stats = h.world.player(c).unwrap();
        assert_eq!(helper_stats.assists, 1);
        assert_eq!(helper_stats.score, 50);
    }

    #[test]
    fn test_self_kill_awards_nothing() {
        let mut h = harness(MatchRules::default());
        let a = join(&mut h, 1);
        join(&mut h, 2);
        activate(&mut h);
        let own = h.world.player(a).unwrap().id;

        h.bus.deaths.publish(DeathEvent { victim: a, killer: Some(own), time: 6_000 });
        h.controller.process_death_queue(&mut h.world, &mut h.bus, TickStamp::new(10, 6_000));

        let p = h.world.player(a).unwrap();
        assert_eq!((p.kills, p.deaths, p.score), (0, 1, 0));
        assert_eq!(h.controller.team_scores(), [0, 0]);
    }

    #[test]
    fn test_respawn_after_delay() {
        let mut h = harness(MatchRules::default());
        join(&mut h, 1);
        let b = join(&mut h, 2);
        activate(&mut h);

        h.world.health_mut(b).unwrap().current = 0.0;
        h.bus.deaths.publish(DeathEvent { victim: b, killer: None, time: 6_000 });
        h.controller.process_death_queue(&mut h.world, &mut h.bus, TickStamp::new(10, 6_000));

        h.controller.process_respawns(&mut h.world, &mut h.physics, &mut h.bus, TickStamp::new(11, 8_999));
        assert!(!h.world.is_alive(b));

        h.controller.process_respawns(&mut h.world, &mut h.physics, &mut h.bus, TickStamp::new(12, 9_000));
        assert!(h.world.is_alive(b));
        assert_eq!(h.world.health(b).unwrap().current, 100.0);
        assert_eq!(h.controller.pending_respawns(), 0);

        let area = *h.controller.map.spawn_area(Team::Blue).unwrap();
        let pos = h.world.position(b).unwrap().translation;
        assert!(pos.horizontal().distance(area.center.horizontal()) <= area.radius + 1e-4);
    }

    #[test]
    fn test_retract_cancels_respawn() {
        let mut h = harness(MatchRules::default());
        join(&mut h, 1);
        let b = join(&mut h, 2);
        let id = h.world.player(b).unwrap().id;

        h.bus.deaths.publish(DeathEvent { victim: b, killer: None, time: 0 });
        h.controller.process_death_queue(&mut h.world, &mut h.bus, TickStamp::new(1, 0));
        assert!(h.controller.respawn_due(&id).is_some());

        h.controller.retract(&id);
        assert!(h.controller.respawn_due(&id).is_none());
    }

    #[test]
    fn test_score_limit_ends_once() {
        let mut h = harness(MatchRules { score_limit: 30, ..MatchRules::default() });
        join(&mut h, 1);
        join(&mut h, 2);
        activate(&mut h);

        h.controller.team_scores = [30, 12];
        let results = run(&mut h, 10, 6_000).expect("round should end");
        assert_eq!(results.winner, Some(Team::Red));
        assert_eq!(results.reason, MatchEndReason::ScoreLimit);
        assert_eq!(results.team_scores, [30, 12]);
        assert_eq!(results.duration_ms, 1_000);

        assert!(run(&mut h, 11, 6_016).is_none());
        assert!(run(&mut h, 12, 6_033).is_none());
        let ended = h
            .bus
            .outbound
            .iter()
            .filter(|n| matches!(n.data, NotificationData::MatchEnded { .. }))
            .count();
        assert_eq!(ended, 1);
    }

    #[test]
    fn test_tie_is_draw() {
        let mut h = harness(MatchRules { max_duration_ms: 1_000, ..MatchRules::default() });
        join(&mut h, 1);
        join(&mut h, 2);
        activate(&mut h);

        h.controller.team_scores = [4, 4];
        let results = run(&mut h, 10, 6_000).unwrap();
        assert_eq!(results.winner, None);
        assert_eq!(results.reason, MatchEndReason::TimeLimit);
    }

    #[test]
    fn test_empty_team_ends_round() {
        let mut h = harness(MatchRules::default());
        join(&mut h, 1);
        let b = join(&mut h, 2);
        activate(&mut h);

        h.world.despawn(b);
        let results = run(&mut h, 10, 5_500).unwrap();
        assert_eq!(results.reason, MatchEndReason::TeamEliminated);
    }

    #[test]
    fn test_waiting_rebalances_one_sided_roster() {
        let mut h = harness(MatchRules::default());
        let a = join(&mut h, 1);
        let b = join(&mut h, 2);
        let c = join(&mut h, 3);
        h.world.despawn(b);

        run(&mut h, 1, 0);

        assert_eq!(h.world.player(a).unwrap().team, Team::Red);
        assert_eq!(h.world.player(c).unwrap().team, Team::Blue);
        assert!(h.bus.outbound.iter().any(|n| matches!(
            n.data,
            NotificationData::TeamChanged { team: Team::Blue, .. }
        )));
        assert_eq!(h.controller.phase(), MatchPhase::Starting { ends_at: 5_000 });
    }

    #[test]
    fn test_reset_rebalances_before_next_round() {
        let mut h = harness(MatchRules::default());
        join(&mut h, 1);
        let b = join(&mut h, 2);
        let c = join(&mut h, 3);
        activate(&mut h);

        h.world.despawn(b);
        let results = run(&mut h, 10, 5_500).unwrap();
        assert_eq!(results.reason, MatchEndReason::TeamEliminated);

        run(&mut h, 11, 15_500);
        assert_eq!(h.controller.phase(), MatchPhase::Starting { ends_at: 20_500 });
        assert_eq!(h.world.player(c).unwrap().team, Team::Blue);

        run(&mut h, 12, 20_500);
        assert!(h.controller.is_active());
        // Both teams are populated, so the round does not end at once
        assert!(run(&mut h, 13, 21_000).is_none());
        assert!(h.controller.is_active());
    }

    #[test]
    fn test_results_sorted_by_score() {
        let mut h = harness(MatchRules::default());
        let a = join(&mut h, 1);
        let b = join(&mut h, 2);
        activate(&mut h);
        h.world.player_mut(b).unwrap().score = 300;
        h.world.player_mut(a).unwrap().score = 100;

        h.controller.team_scores = [0, 30];
        let results = run(&mut h, 10, 6_000).unwrap();
        assert_eq!(results.players[0].score, 300);
        assert_eq!(results.players[1].score, 100);
        assert_eq!(results.winner, Some(Team::Blue));
    }

    #[test]
    fn test_reset_after_restart_delay() {
        let mut h = harness(MatchRules::default());
        let a = join(&mut h, 1);
        let b = join(&mut h, 2);
        activate(&mut h);
        h.world.player_mut(a).unwrap().kills = 3;
        h.world.health_mut(b).unwrap().current = 0.0;
        h.world.player_mut(b).unwrap().is_alive = false;

        h.controller.team_scores = [30, 0];
        run(&mut h, 10, 6_000).unwrap();
        assert!(matches!(h.controller.phase(), MatchPhase::Ended { .. }));

        run(&mut h, 11, 15_999);
        assert!(matches!(h.controller.phase(), MatchPhase::Ended { .. }));

        run(&mut h, 12, 16_000);
        // Re-evaluated straight away: both players are still here
        assert_eq!(h.controller.phase(), MatchPhase::Starting { ends_at: 21_000 });
        assert_eq!(h.controller.team_scores(), [0, 0]);
        assert_eq!(h.world.player(a).unwrap().kills, 0);
        assert!(h.world.is_alive(b));
        assert_eq!(h.world.health(b).unwrap().current, 100.0);
    }

    #[test]
    fn test_time_remaining() {
        let mut h = harness(MatchRules::default());
        assert_eq!(h.controller.time_remaining(0), None);
        join(&mut h, 1);
        join(&mut h, 2);
        activate(&mut h);
        assert_eq!(h.controller.time_remaining(65_000), Some(540_000));
    }
}
