//! Game Logic Module
//!
//! Everything that runs inside the authoritative tick.
//!
//! ## Module Structure
//!
//! - `intent`: Client intents, rejection reasons, per-tick buffering
//! - `events`: Typed event channels and outbound notifications
//! - `map`: Arena geometry and spawn areas
//! - `lifecycle`: Match phases, scoring, respawns, results
//! - `snapshot`: Full-state snapshots with state hash
//! - `tick`: The simulation and its fixed tick order

pub mod intent;
pub mod events;
pub mod map;
pub mod lifecycle;
pub mod snapshot;
pub mod tick;

// Re-export key types
pub use intent::{CastIntent, Intent, IntentQueue, MoveIntent, RejectReason, ShootIntent};
pub use events::{EventBus, Notification, NotificationData, NotificationPriority};
pub use map::ArenaMap;
pub use lifecycle::{MatchController, MatchEndReason, MatchPhase, MatchResults, PlayerResult};
pub use snapshot::{GameSnapshot, PlayerSnapshot};
pub use tick::{Simulation, SimulationError, TickResult};
