//! Physics and movement validation.
//!
//! [`PhysicsBackend`] is the capability boundary around the rigid-body
//! engine; [`RapierBackend`] implements it with rapier3d and
//! [`PhysicsValidator`] builds the authoritative movement rules on top.

pub mod backend;
pub mod rapier;
pub mod validator;

pub use backend::{ContactEvent, PhysicsBackend, PhysicsError, RaycastHit};
pub use rapier::RapierBackend;
pub use validator::{JumpCheck, MoveValidation, PhysicsValidator, ProjectileHit, ProjectileResult};
