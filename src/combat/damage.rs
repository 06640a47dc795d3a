//! Damage Computation
//!
//! `damage = base × body_part_multiplier × distance_falloff`, rounded to the
//! nearest integer with a floor of 1. The body part comes from the vertical
//! offset between the impact point and the target's center.

use serde::{Serialize, Deserialize};

use crate::config::WeaponConfig;

// =============================================================================
// BODY PART BANDS
// =============================================================================

/// Impact offsets above this hit the head.
pub const HEAD_BAND: f32 = 1.5;
/// Impact offsets above this (and not head) hit the chest.
pub const CHEST_BAND: f32 = 0.5;
/// Impact offsets above this (and not chest) hit the torso.
pub const TORSO_BAND: f32 = -0.5;
/// Impact offsets above this (and not torso) hit the legs. Below: feet.
pub const LEGS_BAND: f32 = -1.0;

/// Damage element. Resistances and vulnerabilities key on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageType {
    /// Bullets, blades
    Physical,
    /// Fire
    Fire,
    /// Frost
    Frost,
    /// Poison
    Poison,
    /// Arcane
    Arcane,
}

/// Coarse vertical region of a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyPart {
    /// Head (critical)
    Head,
    /// Upper chest
    Chest,
    /// Torso
    Torso,
    /// Legs
    Legs,
    /// Feet
    Feet,
}

impl BodyPart {
    /// Region for an impact `offset` units above the target center.
    pub fn from_offset(offset: f32) -> Self {
        if offset > HEAD_BAND {
            BodyPart::Head
        } else if offset > CHEST_BAND {
            BodyPart::Chest
        } else if offset > TORSO_BAND {
            BodyPart::Torso
        } else if offset > LEGS_BAND {
            BodyPart::Legs
        } else {
            BodyPart::Feet
        }
    }

    /// Head hits are always critical.
    #[inline]
    pub fn is_critical(self) -> bool {
        matches!(self, BodyPart::Head)
    }
}

/// Damage multiplier per body part.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyPartMultipliers {
    /// Head
    pub head: f32,
    /// Chest
    pub chest: f32,
    /// Torso
    pub torso: f32,
    /// Legs
    pub legs: f32,
    /// Feet
    pub feet: f32,
}

impl Default for BodyPartMultipliers {
    fn default() -> Self {
        Self {
            head: 2.5,
            chest: 1.25,
            torso: 1.0,
            legs: 0.75,
            feet: 0.5,
        }
    }
}

impl BodyPartMultipliers {
    /// Multiplier for `part`.
    pub fn get(&self, part: BodyPart) -> f32 {
        match part {
            BodyPart::Head => self.head,
            BodyPart::Chest => self.chest,
            BodyPart::Torso => self.torso,
            BodyPart::Legs => self.legs,
            BodyPart::Feet => self.feet,
        }
    }
}

// =============================================================================
// CALCULATION
// =============================================================================

/// Outcome of [`calculate_damage`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DamageRoll {
    /// Integer damage, at least 1
    pub amount: u32,
    /// Region that was hit
    pub body_part: BodyPart,
    /// Headshot
    pub critical: bool,
}

/// Linear falloff: 1 up to `start`, 0 at `end` and beyond.
pub fn distance_falloff(distance: f32, start: f32, end: f32) -> f32 {
    if distance <= start {
        return 1.0;
    }
    if end <= start || distance >= end {
        return 0.0;
    }
    (1.0 - (distance - start) / (end - start)).clamp(0.0, 1.0)
}

/// Damage of one weapon hit.
///
/// `offset` is the impact height relative to the target center.
pub fn calculate_damage(
    weapon: &WeaponConfig,
    multipliers: &BodyPartMultipliers,
    offset: f32,
    distance: f32,
) -> DamageRoll {
    let body_part = BodyPart::from_offset(offset);
    let falloff = distance_falloff(distance, weapon.falloff_start, weapon.falloff_end);
    let raw = weapon.base_damage * multipliers.get(body_part) * falloff;

    DamageRoll {
        amount: round_damage(raw),
        body_part,
        critical: body_part.is_critical(),
    }
}

/// Round to the nearest integer with a floor of 1.
#[inline]
pub fn round_damage(raw: f32) -> u32 {
    if !raw.is_finite() || raw <= 0.0 {
        return 1;
    }
    (raw.round() as u32).max(1)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rifle() -> WeaponConfig {
        WeaponConfig {
            base_damage: 25.0,
            falloff_start: 30.0,
            falloff_end: 80.0,
            ..WeaponConfig::default()
        }
    }

    #[test]
    fn test_body_part_bands() {
        assert_eq!(BodyPart::from_offset(1.6), BodyPart::Head);
        assert_eq!(BodyPart::from_offset(1.5), BodyPart::Chest);
        assert_eq!(BodyPart::from_offset(0.6), BodyPart::Chest);
        assert_eq!(BodyPart::from_offset(0.0), BodyPart::Torso);
        assert_eq!(BodyPart::from_offset(-0.7), BodyPart::Legs);
        assert_eq!(BodyPart::from_offset(-1.0), BodyPart::Feet);
        assert_eq!(BodyPart::from_offset(-3.0), BodyPart::Feet);
    }

    #[test]
    fn test_headshot_damage() {
        let roll = calculate_damage(&rifle(), &BodyPartMultipliers::default(), 1.6, 10.0);
        assert_eq!(roll.amount, 63);
        assert_eq!(roll.body_part, BodyPart::Head);
        assert!(roll.critical);
    }

    #[test]
    fn test_distance_falloff_damage() {
        let roll = calculate_damage(&rifle(), &BodyPartMultipliers::default(), 0.0, 55.0);
        assert_eq!(roll.amount, 13);
        assert_eq!(roll.body_part, BodyPart::Torso);
        assert!(!roll.critical);
    }

    #[test]
    fn test_falloff_curve() {
        assert_eq!(distance_falloff(0.0, 30.0, 80.0), 1.0);
        assert_eq!(distance_falloff(30.0, 30.0, 80.0), 1.0);
        assert!((distance_falloff(55.0, 30.0, 80.0) - 0.5).abs() < 1e-6);
        assert_eq!(distance_falloff(80.0, 30.0, 80.0), 0.0);
        assert_eq!(distance_falloff(500.0, 30.0, 80.0), 0.0);
    }

    #[test]
    fn test_damage_floor_of_one() {
        // Beyond falloff end the raw damage is zero, but a hit still deals 1
        let roll = calculate_damage(&rifle(), &BodyPartMultipliers::default(), 0.0, 200.0);
        assert_eq!(roll.amount, 1);
        assert_eq!(round_damage(0.2), 1);
        assert_eq!(round_damage(f32::NAN), 1);
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round_damage(62.5), 63);
        assert_eq!(round_damage(12.5), 13);
        assert_eq!(round_damage(12.49), 12);
    }
}
