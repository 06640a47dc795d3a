//! Authoritative Simulation Tick
//!
//! One [`Simulation`] owns every piece of mutable state and is driven by a
//! single thread. Intents are buffered between ticks and applied in a fixed
//! order, so all validation inside a tick sees one consistent world:
//!
//! 1. Joins and leaves
//! 2. Moves and jumps
//! 3. Physics step
//! 4. Shots and casts (only while the round is live)
//! 5. Combat resolution of hits, spells and area damage
//! 6. Periodic effects and regeneration (on their own interval)
//! 7. Death queue drain
//! 8. Respawns and the phase machine
//! 9. Throttled snapshot
//!
//! Notifications leave the tick as one sorted batch after everything above
//! has committed.

use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::combat::resolver::CombatResolver;
use crate::config::{ConfigError, ServerConfig};
use crate::core::clock::{FixedStep, SimClock, SimTime, TickStamp};
use crate::game::events::{EventBus, HitEvent, Notification, NotificationData};
use crate::game::intent::{validate_name, CastIntent, Intent, IntentQueue, MoveIntent, RejectReason, ShootIntent};
use crate::game::lifecycle::{MatchController, MatchResults};
use crate::game::map::ArenaMap;
use crate::game::snapshot::GameSnapshot;
use crate::physics::backend::{ContactEvent, PhysicsBackend, PhysicsError};
use crate::physics::rapier::RapierBackend;
use crate::physics::validator::{JumpCheck, PhysicsValidator};
use crate::world::components::{Health, PhysicsBody, Player, Position};
use crate::world::entity::{EntityId, PlayerId};
use crate::world::store::{PlayerBundle, WorldStore};

/// World-level failures. These are fatal; the process should exit and be
/// restarted.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Arena geometry could not be built
    #[error("physics world failed to initialize: {0}")]
    Physics(#[from] PhysicsError),
}

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Tick number
    pub tick: u64,
    /// Notifications, sorted
    pub notifications: Vec<Notification>,
    /// Contacts that started this tick
    pub contacts: Vec<ContactEvent>,
    /// Set on the tick a round ends
    pub results: Option<MatchResults>,
}

/// The authoritative simulation.
pub struct Simulation {
    config: ServerConfig,
    clock: SimClock,
    accumulator: FixedStep,
    world: WorldStore,
    physics: PhysicsValidator,
    combat: CombatResolver,
    controller: MatchController,
    bus: EventBus,
    intents: IntentQueue,
}

impl Simulation {
    /// Build the world over `backend`. Fails only on a world-level error.
    pub fn new(config: ServerConfig, backend: Box<dyn PhysicsBackend>) -> Result<Self, SimulationError> {
        config.validate()?;

        let sim = &config.simulation;
        let mut world = WorldStore::new(config.combat.damage_log_capacity);
        let mut physics = PhysicsValidator::new(backend, config.physics.clone(), sim.tick_rate, sim.max_catch_up_ticks);
        let map = ArenaMap::build(&config.map, &mut world, &mut physics)?;

        info!(
            tick_rate = sim.tick_rate,
            weapons = config.weapons.len(),
            spells = config.spells.len(),
            "Simulation initialized"
        );

        Ok(Self {
            clock: SimClock::new(sim.tick_rate),
            accumulator: FixedStep::new(1.0 / sim.tick_rate as f64, sim.max_catch_up_ticks),
            combat: CombatResolver::new(&config),
            controller: MatchController::new(&config, map),
            world,
            physics,
            bus: EventBus::new(),
            intents: IntentQueue::new(),
            config,
        })
    }

    /// Build over the rapier3d backend.
    pub fn with_rapier(config: ServerConfig) -> Result<Self, SimulationError> {
        let backend = RapierBackend::new(config.physics.gravity);
        Self::new(config, Box::new(backend))
    }

    /// Configuration in use.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// World state.
    pub fn world(&self) -> &WorldStore {
        &self.world
    }

    /// Match controller.
    pub fn controller(&self) -> &MatchController {
        &self.controller
    }

    /// Last completed tick.
    pub fn current_tick(&self) -> u64 {
        self.clock.tick()
    }

    /// Current simulation time.
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// Snapshot of the committed state.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot::capture(&self.world, &self.controller, self.clock.stamp())
    }

    /// Buffer an intent for the next tick.
    pub fn submit(&mut self, intent: Intent) {
        self.intents.push(intent);
    }

    /// Run as many whole ticks as `elapsed` wall time covers, up to the
    /// catch-up cap.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<TickResult> {
        let steps = self.accumulator.accumulate(elapsed.as_secs_f64());
        (0..steps).map(|_| self.tick()).collect()
    }

    /// Run one tick.
    #[instrument(level = "trace", skip(self), fields(tick = self.clock.tick() + 1))]
    pub fn tick(&mut self) -> TickResult {
        self.clock.advance();
        let stamp = self.clock.stamp();
        let batch = self.intents.drain();

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(
            roster = batch.roster.len(),
            moves = batch.moves.len(),
            actions = batch.actions.len(),
            "Intents drained"
        );

        // Roster changes first so this tick never sees a departed player
        let mut departed = BTreeSet::new();
        for intent in batch.roster {
            match intent {
                Intent::Join { player_id, name } => {
                    departed.remove(&player_id);
                    if let Err(reason) = self.handle_join(player_id, &name, stamp) {
                        self.reject(stamp, player_id, reason);
                    }
                }
                Intent::Leave { player_id } => {
                    if self.handle_leave(player_id, stamp) {
                        departed.insert(player_id);
                    }
                }
                _ => {}
            }
        }

        for mv in batch.moves.into_iter().filter(|m| !departed.contains(&m.player_id)) {
            if let Err(reason) = self.handle_move(&mv, stamp) {
                self.reject(stamp, mv.player_id, reason);
            }
        }

        let (jumps, combat_actions): (Vec<Intent>, Vec<Intent>) = batch
            .actions
            .into_iter()
            .filter(|i| !departed.contains(&i.player_id()))
            .partition(|i| matches!(i, Intent::Jump { .. }));

        for jump in jumps {
            let player_id = jump.player_id();
            if let Err(reason) = self.handle_jump(player_id, stamp) {
                self.reject(stamp, player_id, reason);
            }
        }

        let dt = self.clock.dt();
        for contact in self.physics.step(&mut self.world, dt, stamp.now) {
            self.bus.contacts.publish(contact);
        }

        for action in combat_actions {
            let player_id = action.player_id();
            let outcome = match action {
                Intent::Shoot(shot) => self.handle_shoot(&shot, stamp),
                Intent::CastSpell(cast) => self.handle_cast(&cast, stamp),
                _ => Ok(()),
            };
            if let Err(reason) = outcome {
                self.reject(stamp, player_id, reason);
            }
        }

        self.combat.resolve(&mut self.world, &mut self.bus, stamp);
        self.combat.coarse_update(&mut self.world, &mut self.bus, stamp);

        self.controller.process_death_queue(&mut self.world, &mut self.bus, stamp);
        self.controller.process_respawns(&mut self.world, &mut self.physics, &mut self.bus, stamp);
        let results = self.controller.update(&mut self.world, &mut self.physics, &mut self.bus, stamp);
        if results.is_some() {
            self.combat.reset();
        }

        if stamp.tick % self.config.simulation.snapshot_interval_ticks as u64 == 0 {
            let snapshot = GameSnapshot::capture(&self.world, &self.controller, stamp);
            self.bus.notify(Notification::new(stamp.tick, NotificationData::Snapshot { snapshot }));
        }

        let mut notifications = self.bus.outbound.drain();
        notifications.sort();

        TickResult {
            tick: stamp.tick,
            notifications,
            contacts: self.bus.contacts.drain(),
            results,
        }
    }

    // =========================================================================
    // INTENT HANDLERS
    // =========================================================================

    fn reject(&mut self, stamp: TickStamp, player_id: PlayerId, reason: RejectReason) {
        debug!(player = %player_id, %reason, "Intent rejected");
        self.bus.notify(Notification::new(stamp.tick, NotificationData::IntentRejected { player_id, reason }));
    }

    fn living_entity(&self, player_id: &PlayerId) -> Result<EntityId, RejectReason> {
        let entity = self.world.entity_of(player_id).ok_or(RejectReason::UnknownPlayer)?;
        if !self.world.is_alive(entity) {
            return Err(RejectReason::PlayerDead);
        }
        Ok(entity)
    }

    fn handle_join(&mut self, player_id: PlayerId, name: &str, stamp: TickStamp) -> Result<(), RejectReason> {
        if self.world.entity_of(&player_id).is_some() {
            return Err(RejectReason::AlreadyJoined);
        }
        let name = validate_name(name)?;
        self.controller.check_capacity(&self.world)?;

        let team = self.controller.assign_team(&self.world);
        let spawn = self.controller.spawn_point(team);
        let physics = &self.config.physics;
        let combat = &self.config.combat;

        let entity = self
            .world
            .spawn_player(PlayerBundle {
                position: Position::at(spawn),
                body: PhysicsBody::player(physics.player_half_height, physics.player_radius, physics.player_mass),
                health: Health::new(combat.max_health, combat.regen_rate),
                player: Player::new(player_id, name.clone(), team),
            })
            .ok_or(RejectReason::AlreadyJoined)?;

        if let Err(err) = self.physics.register(&self.world, entity) {
            warn!(player = %player_id, error = %err, "Player body rejected by physics");
            self.world.despawn(entity);
            return Err(RejectReason::invalid("player body could not be created"));
        }

        self.bus.notify(Notification::new(stamp.tick, NotificationData::PlayerJoined { player_id, name: name.clone(), team }));
        info!(player = %player_id, name = %name, team = ?team, "Player joined");
        Ok(())
    }

    /// Remove a player and retract it from every pending structure.
    fn handle_leave(&mut self, player_id: PlayerId, stamp: TickStamp) -> bool {
        let Some(entity) = self.world.entity_of(&player_id) else {
            warn!(player = %player_id, "Leave from unknown player");
            return false;
        };

        self.intents.retract(&player_id);
        self.combat.retract(&player_id);
        self.controller.retract(&player_id);
        self.bus.retract(entity, player_id);
        self.physics.unregister(entity);
        self.world.despawn(entity);

        self.bus.notify(Notification::new(stamp.tick, NotificationData::PlayerLeft { player_id }));
        info!(player = %player_id, "Player left");
        true
    }

    fn handle_move(&mut self, mv: &MoveIntent, stamp: TickStamp) -> Result<(), RejectReason> {
        let entity = self.living_entity(&mv.player_id)?;

        match self.physics.validate_movement(&mut self.world, entity, mv.position, mv.velocity, mv.rotation, stamp.now) {
            Ok(validation) if validation.corrected => {
                self.bus.notify(Notification::new(stamp.tick, NotificationData::PositionCorrected {
                    player_id: mv.player_id,
                    position: validation.accepted,
                }));
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(PhysicsError::NonFiniteTransform(_)) => Err(RejectReason::invalid("non-finite movement")),
            // Logged by the validator; one player's broken body must not stall the tick
            Err(_) => Ok(()),
        }
    }

    fn handle_jump(&mut self, player_id: PlayerId, stamp: TickStamp) -> Result<(), RejectReason> {
        let entity = self.living_entity(&player_id)?;

        match self.physics.try_jump(&self.world, entity, stamp.now) {
            JumpCheck::Accepted => {
                self.bus.notify(Notification::new(stamp.tick, NotificationData::JumpAccepted { player_id }));
                Ok(())
            }
            JumpCheck::NotGrounded => Err(RejectReason::NotGrounded),
            JumpCheck::OnCooldown => Err(RejectReason::OnCooldown),
        }
    }

    fn handle_shoot(&mut self, shot: &ShootIntent, stamp: TickStamp) -> Result<(), RejectReason> {
        if !self.controller.is_active() {
            return Err(RejectReason::MatchNotActive);
        }
        let entity = self.living_entity(&shot.player_id)?;

        if !shot.origin.is_finite() || !shot.direction.is_finite() || shot.direction.length_squared() == 0.0 {
            return Err(RejectReason::invalid("bad shot origin or direction"));
        }
        let body_center = self
            .world
            .position(entity)
            .map(|p| p.translation)
            .ok_or(RejectReason::UnknownPlayer)?;
        if body_center.distance(shot.origin) > self.config.physics.max_muzzle_offset {
            return Err(RejectReason::OutOfRange);
        }

        let weapon = self.combat.prepare_shot(shot.player_id, shot.weapon_id, stamp.now)?;
        let result = self
            .physics
            .simulate_projectile(&self.world, shot.origin, shot.direction, weapon.speed, &weapon, entity);

        match result.hit {
            Some(hit) if self.world.is_alive(hit.entity) => {
                self.bus.hits.publish(HitEvent {
                    attacker: shot.player_id,
                    target: hit.entity,
                    weapon_id: weapon.id,
                    point: hit.point,
                    distance: hit.distance,
                });
            }
            _ => {
                debug!(player = %shot.player_id, end = %result.final_position, "Shot missed");
            }
        }
        Ok(())
    }

    fn handle_cast(&mut self, cast: &CastIntent, stamp: TickStamp) -> Result<(), RejectReason> {
        if !self.controller.is_active() {
            return Err(RejectReason::MatchNotActive);
        }
        self.living_entity(&cast.player_id)?;

        if !cast.position.is_finite() || !cast.direction.is_finite() {
            return Err(RejectReason::invalid("bad cast position or direction"));
        }

        let event = self.combat.prepare_cast(&self.world, cast, stamp.now)?;
        debug!(player = %cast.player_id, spell_id = cast.spell_id, targets = event.targets.len(), "Spell cast");
        self.bus.spells.publish(event);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
