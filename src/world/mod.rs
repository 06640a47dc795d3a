//! World state.
//!
//! Entities are opaque generational ids; all data lives in per-kind
//! component columns owned by [`WorldStore`].

pub mod entity;
pub mod components;
pub mod store;

pub use entity::{EntityId, PlayerId};
pub use components::{
    DamageLog, DamageRecord, DamageSource, Health, PhysicsBody, Player, Position, Shape, Team,
};
pub use store::{PlayerBundle, WorldStore};
