//! # Strikezone Server
//!
//! Authoritative simulation core for a team-based arena shooter.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    STRIKEZONE SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── vec3.rs     - 3D vector and view rotation               │
//! │  ├── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │  ├── hash.rs     - Snapshot state hashing                    │
//! │  └── clock.rs    - Simulation clock, fixed-step accumulator  │
//! │                                                              │
//! │  world/          - Entity-component store                    │
//! │  physics/        - Backend trait, rapier3d, move validation  │
//! │  combat/         - Damage, effects, resolution               │
//! │                                                              │
//! │  game/           - Authoritative tick                        │
//! │  ├── intent.rs   - Client intents and rejections             │
//! │  ├── events.rs   - Typed event bus, notifications            │
//! │  ├── lifecycle.rs- Match phases, scoring, respawns           │
//! │  ├── map.rs      - Arena geometry, spawn areas               │
//! │  ├── snapshot.rs - Full-state snapshots                      │
//! │  └── tick.rs     - Simulation                                │
//! │                                                              │
//! │  network/        - Async plumbing                            │
//! │  ├── session.rs  - Fixed-rate session task                   │
//! │  └── results.rs  - Match results sink                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering Guarantee
//!
//! One task owns the simulation. Every subsystem iterates entities and
//! players in id order (BTreeMap and dense columns, never HashMap) and all
//! randomness comes from a seeded generator, so the same config, seed and
//! intent stream reproduce the same snapshots and state hashes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod world;
pub mod physics;
pub mod combat;
pub mod game;
pub mod network;
pub mod config;

// Re-export commonly used types
pub use config::{ConfigError, ServerConfig};
pub use core::vec3::{Rotation, Vec3};
pub use core::rng::DeterministicRng;
pub use game::intent::{Intent, RejectReason};
pub use game::tick::{Simulation, SimulationError, TickResult};
pub use world::entity::{EntityId, PlayerId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
