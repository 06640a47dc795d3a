//! Physics & Movement Validator
//!
//! Steps the rigid-body world at a fixed cadence and arbitrates between what
//! clients say they did and what is physically plausible:
//!
//! - Moves further than the per-tick bound are clamped toward the request.
//! - Jumps need ground under the feet and an elapsed cooldown.
//! - Shots are traced synchronously against the current world instead of
//!   spawning a fast body that could tunnel through thin geometry.
//!
//! A missing body is a soft failure: logged, then ignored.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::config::{PhysicsConfig, WeaponConfig};
use crate::core::clock::{FixedStep, SimTime};
use crate::core::vec3::{Rotation, Vec3};
use crate::physics::backend::{ContactEvent, PhysicsBackend, PhysicsError};
use crate::world::entity::EntityId;
use crate::world::store::WorldStore;

/// Lift above the feet where the ground probe starts.
const PROBE_LIFT: f32 = 0.05;

/// Result of a movement validation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveValidation {
    /// Position now authoritative for the entity
    pub accepted: Vec3,
    /// True if the request was clamped
    pub corrected: bool,
}

/// Result of a jump check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JumpCheck {
    /// Jump allowed and recorded
    Accepted,
    /// Nothing under the feet
    NotGrounded,
    /// Jumped too recently
    OnCooldown,
}

/// First entity a projectile struck.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectileHit {
    /// Struck entity (player or geometry)
    pub entity: EntityId,
    /// Impact point
    pub point: Vec3,
    /// Surface normal at the impact
    pub normal: Vec3,
    /// Straight-line distance from the muzzle
    pub distance: f32,
}

/// Outcome of [`PhysicsValidator::simulate_projectile`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectileResult {
    /// Where the projectile stopped
    pub final_position: Vec3,
    /// What it hit, if anything
    pub hit: Option<ProjectileHit>,
}

/// Authoritative movement and hit detection over a [`PhysicsBackend`].
pub struct PhysicsValidator {
    backend: Box<dyn PhysicsBackend>,
    config: PhysicsConfig,
    accumulator: FixedStep,
    step_dt: f32,
    last_jump: BTreeMap<EntityId, SimTime>,
}

impl PhysicsValidator {
    /// Validator stepping at `tick_rate` Hz, running at most `max_steps`
    /// catch-up steps per call.
    pub fn new(backend: Box<dyn PhysicsBackend>, config: PhysicsConfig, tick_rate: u32, max_steps: u32) -> Self {
        let step_dt = 1.0 / tick_rate.max(1) as f32;
        Self {
            backend,
            config,
            accumulator: FixedStep::new(step_dt as f64, max_steps),
            step_dt,
            last_jump: BTreeMap::new(),
        }
    }

    /// Fixed timestep in seconds.
    pub fn step_dt(&self) -> f32 {
        self.step_dt
    }

    /// Read access to the backend.
    pub fn backend(&self) -> &dyn PhysicsBackend {
        self.backend.as_ref()
    }

    // =========================================================================
    // BODY LIFECYCLE
    // =========================================================================

    /// Create the backend body for an entity from its components.
    pub fn register(&mut self, world: &WorldStore, entity: EntityId) -> Result<(), PhysicsError> {
        let body = world.body(entity).ok_or(PhysicsError::MissingBody(entity))?;
        let position = world
            .position(entity)
            .map(|p| p.translation)
            .ok_or(PhysicsError::MissingBody(entity))?;
        self.backend.add_body(entity, body, position)
    }

    /// Drop the backend body of an entity. Missing bodies are logged.
    pub fn unregister(&mut self, entity: EntityId) {
        self.last_jump.remove(&entity);
        if let Err(err) = self.backend.remove_body(entity) {
            warn!(entity = ?entity, error = %err, "Unregister skipped");
        }
    }

    /// Move an entity without validation (spawns and respawns).
    pub fn teleport(&mut self, world: &mut WorldStore, entity: EntityId, position: Vec3) {
        let Some(pos) = world.position_mut(entity) else {
            warn!(entity = ?entity, "Teleport of entity without position");
            return;
        };
        pos.translation = position;
        if let Some(body) = world.body_mut(entity) {
            body.velocity = Vec3::ZERO;
        }
        if let Err(err) = self.backend.set_transform(entity, position) {
            warn!(entity = ?entity, error = %err, "Teleport not mirrored in physics");
        }
    }

    // =========================================================================
    // STEPPING
    // =========================================================================

    /// Advance the world by `delta_time` seconds of wall time.
    ///
    /// Time accumulates and only whole fixed steps run; the remainder carries
    /// into the next call. Dynamic bodies are read back into their Position
    /// and every kinematic body's grounded flag is refreshed.
    pub fn step(&mut self, world: &mut WorldStore, delta_time: f32, now: SimTime) -> Vec<ContactEvent> {
        let steps = self.accumulator.accumulate(delta_time as f64);
        if steps == 0 {
            return Vec::new();
        }

        let mut contacts = Vec::new();
        for _ in 0..steps {
            contacts.extend(self.backend.step_world(self.step_dt));
        }

        self.sync_dynamic_bodies(world);
        self.refresh_grounded(world, now);

        if !contacts.is_empty() {
            debug!(count = contacts.len(), steps, "Contacts started");
        }
        contacts
    }

    fn sync_dynamic_bodies(&self, world: &mut WorldStore) {
        let dynamic: Vec<EntityId> = world
            .bodies()
            .filter(|(_, b)| !b.is_immovable() && !b.is_kinematic)
            .map(|(id, _)| id)
            .collect();

        for entity in dynamic {
            if let (Some(t), Some(pos)) = (self.backend.get_transform(entity), world.position_mut(entity)) {
                pos.translation = t;
            }
        }
    }

    fn refresh_grounded(&self, world: &mut WorldStore, now: SimTime) {
        let kinematic: Vec<EntityId> = world
            .bodies()
            .filter(|(_, b)| b.is_kinematic)
            .map(|(id, _)| id)
            .collect();

        for entity in kinematic {
            let grounded = self.is_grounded(world, entity);
            if let Some(body) = world.body_mut(entity) {
                body.grounded = grounded;
                if grounded {
                    body.last_grounded = Some(now);
                }
            }
        }
    }

    // =========================================================================
    // MOVEMENT
    // =========================================================================

    /// Accept or clamp a client-reported move.
    ///
    /// Within the per-tick bound the request is taken verbatim; beyond it the
    /// entity advances toward the request by exactly the bound. Slow effects
    /// shrink the bound.
    pub fn validate_movement(
        &mut self,
        world: &mut WorldStore,
        entity: EntityId,
        requested_position: Vec3,
        requested_velocity: Vec3,
        rotation: Rotation,
        now: SimTime,
    ) -> Result<MoveValidation, PhysicsError> {
        if !requested_position.is_finite() || !requested_velocity.is_finite() || !rotation.is_finite() {
            return Err(PhysicsError::NonFiniteTransform(entity));
        }
        if world.body(entity).is_none() {
            warn!(entity = ?entity, "Move for entity without physics body");
            return Err(PhysicsError::MissingBody(entity));
        }
        let current = world
            .position(entity)
            .map(|p| p.translation)
            .ok_or(PhysicsError::MissingBody(entity))?;

        let factor = world.effects(entity).map(|e| e.movement_factor(now)).unwrap_or(1.0);
        let max_distance = self.config.max_move_per_tick * factor;

        let distance = current.distance(requested_position);
        let (accepted, corrected) = if distance <= max_distance {
            (requested_position, false)
        } else {
            (current.move_towards(requested_position, max_distance), true)
        };

        if let Some(pos) = world.position_mut(entity) {
            pos.translation = accepted;
            pos.rotation = Rotation::new(rotation.pitch, rotation.yaw);
        }
        if let Some(body) = world.body_mut(entity) {
            body.velocity = if corrected { Vec3::ZERO } else { requested_velocity };
        }
        if let Err(err) = self.backend.set_transform(entity, accepted) {
            warn!(entity = ?entity, error = %err, "Accepted move not mirrored in physics");
        }

        if corrected {
            debug!(
                entity = ?entity,
                requested = %requested_position,
                accepted = %accepted,
                distance,
                "Move clamped"
            );
        }
        Ok(MoveValidation { accepted, corrected })
    }

    /// True if there is ground within the probe distance below the feet.
    pub fn is_grounded(&self, world: &WorldStore, entity: EntityId) -> bool {
        let (Some(pos), Some(body)) = (world.position(entity), world.body(entity)) else {
            warn!(entity = ?entity, "Grounded check for entity without body");
            return false;
        };

        let feet = pos.translation - Vec3::UP * body.shape.half_height();
        let origin = feet + Vec3::UP * PROBE_LIFT;
        self.backend
            .raycast(origin, Vec3::DOWN, self.config.ground_probe + PROBE_LIFT, &[entity])
            .is_some()
    }

    /// Gate a jump on ground contact and cooldown. Records accepted jumps.
    pub fn try_jump(&mut self, world: &WorldStore, entity: EntityId, now: SimTime) -> JumpCheck {
        if let Some(last) = self.last_jump.get(&entity) {
            if now.saturating_sub(*last) < self.config.jump_cooldown_ms {
                return JumpCheck::OnCooldown;
            }
        }
        if !self.is_grounded(world, entity) {
            return JumpCheck::NotGrounded;
        }
        self.last_jump.insert(entity, now);
        JumpCheck::Accepted
    }

    // =========================================================================
    // PROJECTILES
    // =========================================================================

    /// Trace a projectile along its ballistic path.
    ///
    /// The horizon is the shorter of the weapon's zero-damage range and the
    /// configured maximum flight time. The shooter and dead players are not
    /// hittable.
    pub fn simulate_projectile(
        &self,
        world: &WorldStore,
        origin: Vec3,
        direction: Vec3,
        speed: f32,
        weapon: &WeaponConfig,
        shooter: EntityId,
    ) -> ProjectileResult {
        let dir = direction.normalize();
        if dir == Vec3::ZERO || !origin.is_finite() || speed <= 0.0 || !speed.is_finite() {
            return ProjectileResult { final_position: origin, hit: None };
        }

        let mut exclude = vec![shooter];
        exclude.extend(
            world
                .player_entities()
                .map(|(_, e)| e)
                .filter(|e| !world.is_alive(*e)),
        );

        let horizon = (weapon.falloff_end / speed)
            .min(self.config.projectile_max_time)
            .max(self.config.projectile_substep);
        let steps = (horizon / self.config.projectile_substep).ceil() as u32;
        let dt = horizon / steps as f32;
        let gravity = Vec3::new(0.0, self.config.gravity, 0.0);

        let mut position = origin;
        let mut velocity = dir * speed;
        for _ in 0..steps {
            let next = position + velocity * dt + gravity * (0.5 * dt * dt);
            let segment = next - position;
            let length = segment.length();

            if let Some(hit) = self.backend.raycast(position, segment, length, &exclude) {
                return ProjectileResult {
                    final_position: hit.point,
                    hit: Some(ProjectileHit {
                        entity: hit.entity,
                        point: hit.point,
                        normal: hit.normal,
                        distance: origin.distance(hit.point),
                    }),
                };
            }

            position = next;
            velocity = velocity + gravity * dt;
        }

        ProjectileResult { final_position: position, hit: None }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    use crate::combat::effects::{ActiveEffect, EffectType};
    use crate::physics::rapier::RapierBackend;
    use crate::world::components::{Health, PhysicsBody, Player, Position, Shape, Team};
    use crate::world::entity::PlayerId;
    use crate::world::store::PlayerBundle;

    fn setup() -> (PhysicsValidator, WorldStore) {
        let config = PhysicsConfig::default();
        let mut validator = PhysicsValidator::new(Box::new(RapierBackend::new(config.gravity)), config, 60, 5);
        let mut world = WorldStore::default();

        let floor = world.spawn_static(
            Position::at(Vec3::new(0.0, -0.5, 0.0)),
            PhysicsBody::fixed(Shape::Box { half_extents: Vec3::new(100.0, 0.5, 100.0) }),
        );
        validator.register(&world, floor).unwrap();
        (validator, world)
    }

    fn spawn(validator: &mut PhysicsValidator, world: &mut WorldStore, byte: u8, at: Vec3) -> EntityId {
        let entity = world
            .spawn_player(PlayerBundle {
                position: Position::at(at),
                body: PhysicsBody::player(1.2, 0.5, 80.0),
                health: Health::new(100.0, 5.0),
                player: Player::new(PlayerId::new([byte; 16]), "p", Team::Red),
            })
            .unwrap();
        validator.register(world, entity).unwrap();
        entity
    }

    fn rifle() -> WeaponConfig {
        WeaponConfig {
            id: 1,
            base_damage: 25.0,
            speed: 900.0,
            falloff_start: 30.0,
            falloff_end: 80.0,
            ..WeaponConfig::default()
        }
    }

    #[test]
    fn test_small_move_accepted_verbatim() {
        let (mut validator, mut world) = setup();
        let e = spawn(&mut validator, &mut world, 1, Vec3::new(0.0, 1.7, 0.0));

        let target = Vec3::new(0.3, 1.7, 0.0);
        let result = validator
            .validate_movement(&mut world, e, target, Vec3::ZERO, Rotation::default(), 0)
            .unwrap();

        assert_eq!(result.accepted, target);
        assert!(!result.corrected);
        assert_eq!(world.position(e).unwrap().translation, target);
    }

    #[test]
    fn test_teleport_clamped_to_bound() {
        let (mut validator, mut world) = setup();
        let e = spawn(&mut validator, &mut world, 1, Vec3::new(0.0, 1.7, 0.0));

        let result = validator
            .validate_movement(&mut world, e, Vec3::new(100.0, 1.7, 0.0), Vec3::ZERO, Rotation::default(), 0)
            .unwrap();

        assert!(result.corrected);
        assert!((result.accepted.x - 0.5).abs() < 1e-5);
        assert_eq!(result.accepted.y, 1.7);
    }

    #[test]
    fn test_slow_shrinks_bound() {
        let (mut validator, mut world) = setup();
        let e = spawn(&mut validator, &mut world, 1, Vec3::new(0.0, 1.7, 0.0));
        world.effects_mut_or_default(e).unwrap().apply(
            ActiveEffect {
                effect_type: EffectType::Slow,
                power: 50.0,
                duration: 10_000,
                start_time: 0,
                last_tick_time: None,
                tick_interval: None,
                source: None,
            },
            0,
        );

        let result = validator
            .validate_movement(&mut world, e, Vec3::new(0.4, 1.7, 0.0), Vec3::ZERO, Rotation::default(), 100)
            .unwrap();
        assert!(result.corrected);
        assert!((result.accepted.x - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_non_finite_move_rejected() {
        let (mut validator, mut world) = setup();
        let e = spawn(&mut validator, &mut world, 1, Vec3::new(0.0, 1.7, 0.0));

        let result = validator.validate_movement(
            &mut world,
            e,
            Vec3::new(f32::NAN, 0.0, 0.0),
            Vec3::ZERO,
            Rotation::default(),
            0,
        );
        assert_eq!(result, Err(PhysicsError::NonFiniteTransform(e)));
        assert_eq!(world.position(e).unwrap().translation, Vec3::new(0.0, 1.7, 0.0));
    }

    #[test]
    fn test_missing_body_is_soft_failure() {
        let (mut validator, mut world) = setup();
        let ghost = EntityId::new(99, 0);

        assert!(validator
            .validate_movement(&mut world, ghost, Vec3::ZERO, Vec3::ZERO, Rotation::default(), 0)
            .is_err());
        assert!(!validator.is_grounded(&world, ghost));
        validator.unregister(ghost);
    }

    #[test]
    fn test_grounded_and_jump_gate() {
        let (mut validator, mut world) = setup();
        let standing = spawn(&mut validator, &mut world, 1, Vec3::new(0.0, 1.7, 0.0));
        let flying = spawn(&mut validator, &mut world, 2, Vec3::new(10.0, 6.0, 0.0));
        validator.step(&mut world, 1.0 / 60.0, 16);

        assert!(validator.is_grounded(&world, standing));
        assert!(world.body(standing).unwrap().grounded);
        assert_eq!(world.body(standing).unwrap().last_grounded, Some(16));
        assert!(!validator.is_grounded(&world, flying));

        assert_eq!(validator.try_jump(&world, standing, 100), JumpCheck::Accepted);
        assert_eq!(validator.try_jump(&world, standing, 200), JumpCheck::OnCooldown);
        assert_eq!(validator.try_jump(&world, standing, 700), JumpCheck::Accepted);
        assert_eq!(validator.try_jump(&world, flying, 100), JumpCheck::NotGrounded);
    }

    #[test]
    fn test_step_accumulates_drift() {
        let (mut validator, mut world) = setup();
        let dt = validator.step_dt();

        // Two half steps make one whole step
        validator.step(&mut world, dt * 0.5, 0);
        assert!(validator.accumulator.remainder() > 0.0);
        validator.step(&mut world, dt * 0.5 + 1e-6, 0);
        assert!(validator.accumulator.remainder() < dt as f64 * 0.5);
    }

    #[test]
    fn test_projectile_hits_target_and_skips_shooter() {
        let (mut validator, mut world) = setup();
        let shooter = spawn(&mut validator, &mut world, 1, Vec3::new(0.0, 1.7, 0.0));
        let target = spawn(&mut validator, &mut world, 2, Vec3::new(20.0, 1.7, 0.0));
        validator.step(&mut world, 1.0 / 60.0, 0);

        let result = validator.simulate_projectile(
            &world,
            Vec3::new(0.0, 1.7, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            900.0,
            &rifle(),
            shooter,
        );

        let hit = result.hit.unwrap();
        assert_eq!(hit.entity, target);
        assert!((hit.distance - 19.5).abs() < 0.1);
        assert!(hit.normal.x < -0.5);
    }

    #[test]
    fn test_projectile_ignores_dead_players() {
        let (mut validator, mut world) = setup();
        let shooter = spawn(&mut validator, &mut world, 1, Vec3::new(0.0, 1.7, 0.0));
        let target = spawn(&mut validator, &mut world, 2, Vec3::new(20.0, 1.7, 0.0));
        validator.step(&mut world, 1.0 / 60.0, 0);
        world.player_mut(target).unwrap().is_alive = false;

        let result = validator.simulate_projectile(
            &world,
            Vec3::new(0.0, 1.7, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            900.0,
            &rifle(),
            shooter,
        );
        assert!(result.hit.is_none());
    }

    #[test]
    fn test_projectile_horizon_bounded_by_falloff() {
        let (mut validator, mut world) = setup();
        let shooter = spawn(&mut validator, &mut world, 1, Vec3::new(0.0, 1.7, 0.0));
        // Beyond the rifle's zero-damage range
        spawn(&mut validator, &mut world, 2, Vec3::new(0.0, 1.7, 120.0));
        validator.step(&mut world, 1.0 / 60.0, 0);

        let result = validator.simulate_projectile(
            &world,
            Vec3::new(0.0, 1.7, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            900.0,
            &rifle(),
            shooter,
        );
        assert!(result.hit.is_none());
        assert!((result.final_position.z - 80.0).abs() < 1.0);
    }

    #[test]
    fn test_projectile_stopped_by_wall() {
        let (mut validator, mut world) = setup();
        let shooter = spawn(&mut validator, &mut world, 1, Vec3::new(0.0, 1.7, 0.0));
        let wall = world.spawn_static(
            Position::at(Vec3::new(10.0, 2.0, 0.0)),
            PhysicsBody::fixed(Shape::Box { half_extents: Vec3::new(0.1, 2.0, 5.0) }),
        );
        validator.register(&world, wall).unwrap();
        spawn(&mut validator, &mut world, 2, Vec3::new(20.0, 1.7, 0.0));
        validator.step(&mut world, 1.0 / 60.0, 0);

        let result = validator.simulate_projectile(
            &world,
            Vec3::new(0.0, 1.7, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            900.0,
            &rifle(),
            shooter,
        );
        assert_eq!(result.hit.map(|h| h.entity), Some(wall));
    }

    proptest! {
        #[test]
        fn prop_accepted_move_within_bound(
            x in -1000.0f32..1000.0,
            y in -1000.0f32..1000.0,
            z in -1000.0f32..1000.0,
        ) {
            let (mut validator, mut world) = setup();
            let start = Vec3::new(0.0, 1.7, 0.0);
            let e = spawn(&mut validator, &mut world, 1, start);
            let max = PhysicsConfig::default().max_move_per_tick;

            let result = validator
                .validate_movement(&mut world, e, Vec3::new(x, y, z), Vec3::ZERO, Rotation::default(), 0)
                .unwrap();
            prop_assert!(result.accepted.distance(start) <= max + 1e-3);
        }
    }
}
