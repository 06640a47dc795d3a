//! Combat resolution.
//!
//! - `damage`: body parts, distance falloff, per-hit damage
//! - `effects`: timed effects and the stacking policy
//! - `resolver`: health changes, periodic effects, event consumption

pub mod damage;
pub mod effects;
pub mod resolver;

pub use damage::{calculate_damage, BodyPart, BodyPartMultipliers, DamageRoll, DamageType};
pub use effects::{ActiveEffect, EffectOutcome, EffectSet, EffectType};
pub use resolver::{CombatResolver, DamageOutcome, DamageRequest};
