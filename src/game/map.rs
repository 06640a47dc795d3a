//! Arena Geometry
//!
//! Floor, obstacles and team spawn areas. Geometry becomes static entities
//! in the world store with fixed bodies in the physics backend; spawn
//! areas are discs sampled with the match RNG.

use tracing::debug;

use crate::config::{MapConfig, SpawnAreaConfig};
use crate::core::rng::DeterministicRng;
use crate::core::vec3::Vec3;
use crate::physics::backend::PhysicsError;
use crate::physics::validator::PhysicsValidator;
use crate::world::components::{PhysicsBody, Position, Shape, Team};
use crate::world::entity::EntityId;
use crate::world::store::WorldStore;

/// The built arena.
#[derive(Clone, Debug)]
pub struct ArenaMap {
    spawn_areas: Vec<SpawnAreaConfig>,
    static_entities: Vec<EntityId>,
}

impl ArenaMap {
    /// Create the floor (top face at y = 0) and every obstacle.
    pub fn build(config: &MapConfig, world: &mut WorldStore, physics: &mut PhysicsValidator) -> Result<Self, PhysicsError> {
        let mut static_entities = Vec::with_capacity(config.obstacles.len() + 1);

        let floor_center = Vec3::new(0.0, -config.floor_half_extents.y, 0.0);
        static_entities.push(Self::add_box(world, physics, floor_center, config.floor_half_extents)?);

        for obstacle in &config.obstacles {
            static_entities.push(Self::add_box(world, physics, obstacle.center, obstacle.half_extents)?);
        }

        debug!(pieces = static_entities.len(), "Arena built");
        Ok(Self {
            spawn_areas: config.spawn_areas.clone(),
            static_entities,
        })
    }

    fn add_box(
        world: &mut WorldStore,
        physics: &mut PhysicsValidator,
        center: Vec3,
        half_extents: Vec3,
    ) -> Result<EntityId, PhysicsError> {
        let id = world.spawn_static(Position::at(center), PhysicsBody::fixed(Shape::Box { half_extents }));
        if let Err(err) = physics.register(world, id) {
            world.despawn(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Spawn area of `team`.
    pub fn spawn_area(&self, team: Team) -> Option<&SpawnAreaConfig> {
        self.spawn_areas.iter().find(|a| a.team == team)
    }

    /// Random point inside the team's spawn disc, at the area's height.
    pub fn spawn_point(&self, team: Team, rng: &mut DeterministicRng) -> Vec3 {
        match self.spawn_area(team) {
            Some(area) => rng.point_in_disc(area.center, area.radius),
            None => Vec3::UP,
        }
    }

    /// Every static entity the arena created.
    pub fn static_entities(&self) -> &[EntityId] {
        &self.static_entities
    }
}

// =============================================================================
// TESTS
// =============================================================================
