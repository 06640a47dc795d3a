//! Core primitives.
//!
//! Geometry, seeded randomness, snapshot hashing and the simulation clock.
//! Everything above this layer builds on these types.

pub mod vec3;
pub mod rng;
pub mod hash;
pub mod clock;

// Re-export core types
pub use vec3::{Vec3, Rotation};
pub use rng::DeterministicRng;
pub use hash::{StateHash, compute_state_hash};
pub use clock::{SimClock, SimTime, TickStamp, FixedStep};
