//! Status Effects
//!
//! An effect type is unique per target. Re-applying an active type follows
//! "strongest or longest wins": a strictly stronger instance replaces the
//! current one, an instance that would outlast it extends it, anything else
//! is ignored.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};

use crate::combat::damage::DamageType;
use crate::core::clock::SimTime;
use crate::world::entity::PlayerId;

// =============================================================================
// EFFECT TYPES
// =============================================================================

/// Kind of timed modifier. Power semantics depend on the kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "damage_type", rename_all = "snake_case")]
pub enum EffectType {
    /// Blocks all damage
    Invulnerability,
    /// Reduces damage of one type by `power` percent; 100 blocks it
    Resistance(DamageType),
    /// Increases damage of one type by `power` percent
    Vulnerability(DamageType),
    /// Deals `power` damage per pulse
    DamageOverTime(DamageType),
    /// Heals `power` per pulse
    HealOverTime,
    /// Reduces allowed movement by `power` percent
    Slow,
    /// Cancels slow by `power` percent
    Haste,
}

impl EffectType {
    /// Stable numeric tag for hashing.
    pub fn tag(self) -> u8 {
        let damage_tag = |dt: DamageType| dt as u8;
        match self {
            EffectType::Invulnerability => 0,
            EffectType::Resistance(dt) => 0x10 | damage_tag(dt),
            EffectType::Vulnerability(dt) => 0x20 | damage_tag(dt),
            EffectType::DamageOverTime(dt) => 0x30 | damage_tag(dt),
            EffectType::HealOverTime => 0x40,
            EffectType::Slow => 0x50,
            EffectType::Haste => 0x60,
        }
    }
}

/// One active effect instance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveEffect {
    /// Kind
    pub effect_type: EffectType,
    /// Strength
    pub power: f32,
    /// Lifetime in ms, counted from `start_time`
    pub duration: u64,
    /// When the current instance started
    pub start_time: SimTime,
    /// Last periodic pulse
    pub last_tick_time: Option<SimTime>,
    /// Pulse interval for periodic effects
    pub tick_interval: Option<u64>,
    /// Who applied it
    pub source: Option<PlayerId>,
}

impl ActiveEffect {
    /// Time left at `now`.
    pub fn remaining(&self, now: SimTime) -> u64 {
        self.duration.saturating_sub(now.saturating_sub(self.start_time))
    }

    /// True once `now - start >= duration`.
    pub fn is_expired(&self, now: SimTime) -> bool {
        now.saturating_sub(self.start_time) >= self.duration
    }

    /// True if a periodic pulse should fire at `now`.
    pub fn pulse_due(&self, now: SimTime) -> bool {
        match self.tick_interval {
            Some(interval) if interval > 0 => {
                let since = self.last_tick_time.unwrap_or(self.start_time);
                now.saturating_sub(since) >= interval
            }
            _ => false,
        }
    }
}

/// Result of [`EffectSet::apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectOutcome {
    /// Type was not active; added
    Applied,
    /// Stronger instance replaced the active one
    Strengthened,
    /// Longer instance extended the active one
    Extended,
    /// Neither stronger nor longer; dropped
    Ignored,
    /// Target is immune to this type
    Immune,
}

impl EffectOutcome {
    /// True if the set changed.
    pub fn changed(self) -> bool {
        matches!(self, EffectOutcome::Applied | EffectOutcome::Strengthened | EffectOutcome::Extended)
    }
}

// =============================================================================
// EFFECT SET
// =============================================================================

/// Active effects and immunities of one entity.
///
/// Ordered by effect type so iteration is deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectSet {
    effects: BTreeMap<EffectType, ActiveEffect>,
    immunities: BTreeSet<EffectType>,
}

impl EffectSet {
    /// Apply `effect` under the strongest/longest-wins policy.
    pub fn apply(&mut self, effect: ActiveEffect, now: SimTime) -> EffectOutcome {
        if self.immunities.contains(&effect.effect_type) {
            return EffectOutcome::Immune;
        }

        // An expired instance awaiting the sweep counts as absent
        let current = match self.effects.get_mut(&effect.effect_type) {
            Some(current) if !current.is_expired(now) => current,
            _ => {
                self.effects.insert(effect.effect_type, ActiveEffect { start_time: now, ..effect });
                return EffectOutcome::Applied;
            }
        };

        if effect.power > current.power {
            *current = ActiveEffect {
                start_time: now,
                last_tick_time: None,
                ..effect
            };
            return EffectOutcome::Strengthened;
        }

        if effect.duration > current.remaining(now) {
            // Power stays; the clock restarts with the new lifetime
            current.duration = effect.duration;
            current.start_time = now;
            return EffectOutcome::Extended;
        }

        EffectOutcome::Ignored
    }

    /// Remove an effect. None if it was not active.
    pub fn remove(&mut self, effect_type: EffectType) -> Option<ActiveEffect> {
        self.effects.remove(&effect_type)
    }

    /// Active effect of a type.
    pub fn get(&self, effect_type: EffectType) -> Option<&ActiveEffect> {
        self.effects.get(&effect_type)
    }

    /// Mutable active effect of a type.
    pub fn get_mut(&mut self, effect_type: EffectType) -> Option<&mut ActiveEffect> {
        self.effects.get_mut(&effect_type)
    }

    /// All effects in type order.
    pub fn iter(&self) -> impl Iterator<Item = &ActiveEffect> {
        self.effects.values()
    }

    /// Number of active effects.
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// An empty set is the same as no set.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Make the entity immune to a type.
    pub fn add_immunity(&mut self, effect_type: EffectType) {
        self.immunities.insert(effect_type);
    }

    /// True if immune to a type.
    pub fn is_immune_to(&self, effect_type: EffectType) -> bool {
        self.immunities.contains(&effect_type)
    }

    /// True if an active effect suppresses `damage_type` entirely.
    pub fn blocks_damage(&self, damage_type: DamageType, now: SimTime) -> bool {
        self.effects.values().filter(|e| !e.is_expired(now)).any(|e| match e.effect_type {
            EffectType::Invulnerability => true,
            EffectType::Resistance(dt) => dt == damage_type && e.power >= 100.0,
            _ => false,
        })
    }

    /// Product of every resistance and vulnerability for `damage_type`.
    pub fn damage_multiplier(&self, damage_type: DamageType, now: SimTime) -> f32 {
        self.effects
            .values()
            .filter(|e| !e.is_expired(now))
            .fold(1.0, |acc, e| match e.effect_type {
                EffectType::Resistance(dt) if dt == damage_type => {
                    acc * (1.0 - e.power / 100.0).max(0.0)
                }
                EffectType::Vulnerability(dt) if dt == damage_type => {
                    acc * (1.0 + e.power / 100.0)
                }
                _ => acc,
            })
    }

    /// Movement allowance factor in [0, 1] from slow and haste.
    pub fn movement_factor(&self, now: SimTime) -> f32 {
        let power_of = |kind: EffectType| {
            self.effects
                .get(&kind)
                .filter(|e| !e.is_expired(now))
                .map(|e| e.power)
                .unwrap_or(0.0)
        };
        let slow = (power_of(EffectType::Slow) - power_of(EffectType::Haste)).clamp(0.0, 100.0);
        1.0 - slow / 100.0
    }
}

// =============================================================================
// TESTS
// =============================================================================
