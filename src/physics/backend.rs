//! Physics Backend Capability
//!
//! The rest of the server talks to the rigid-body engine only through this
//! trait. Entity ids and plain geometric values cross it; engine handles
//! never do.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::vec3::Vec3;
use crate::world::components::PhysicsBody;
use crate::world::entity::EntityId;

/// Backend errors. All of them are soft: callers log and carry on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// Entity already has a body
    #[error("entity {0:?} already has a physics body")]
    DuplicateBody(EntityId),

    /// Entity has no body
    #[error("entity {0:?} has no physics body")]
    MissingBody(EntityId),

    /// Shape dimensions are unusable
    #[error("invalid shape for entity {0:?}: {1}")]
    InvalidShape(EntityId, String),

    /// Position contains NaN or infinity
    #[error("non-finite transform for entity {0:?}")]
    NonFiniteTransform(EntityId),
}

/// First surface hit by a ray.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaycastHit {
    /// Entity owning the hit collider
    pub entity: EntityId,
    /// World-space impact point
    pub point: Vec3,
    /// Surface normal at the impact
    pub normal: Vec3,
    /// Distance along the ray
    pub distance: f32,
}

/// A contact that started during a step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactEvent {
    /// Lower entity id of the pair
    pub a: EntityId,
    /// Higher entity id of the pair
    pub b: EntityId,
    /// World-space contact point
    pub point: Vec3,
    /// Contact normal, pointing from `a` to `b`
    pub normal: Vec3,
    /// Impulse applied by the solver
    pub impulse: f32,
}

/// Minimal rigid-body engine interface.
pub trait PhysicsBackend: Send {
    /// Advance the world by `dt` seconds and return contacts that started,
    /// sorted by entity pair.
    fn step_world(&mut self, dt: f32) -> Vec<ContactEvent>;

    /// Insert a body for `entity` centered at `position`.
    fn add_body(&mut self, entity: EntityId, body: &PhysicsBody, position: Vec3) -> Result<(), PhysicsError>;

    /// Remove the body of `entity`.
    fn remove_body(&mut self, entity: EntityId) -> Result<(), PhysicsError>;

    /// Cast a ray and return the closest hit, ignoring `exclude`.
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        exclude: &[EntityId],
    ) -> Option<RaycastHit>;

    /// Current center of `entity`'s body.
    fn get_transform(&self, entity: EntityId) -> Option<Vec3>;

    /// Teleport `entity`'s body to `position`.
    fn set_transform(&mut self, entity: EntityId, position: Vec3) -> Result<(), PhysicsError>;

    /// Number of bodies.
    fn body_count(&self) -> usize;
}
