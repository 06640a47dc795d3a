//! Server Configuration
//!
//! Static tuning consumed by the simulation: tick cadence, match rules,
//! combat constants, physics limits, the weapon and spell tables and the
//! map. Loaded from an optional TOML file; every field has a default so a
//! partial file only overrides what it names.

use std::path::Path;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::info;

use crate::combat::damage::{BodyPartMultipliers, DamageType};
use crate::combat::effects::EffectType;
use crate::core::vec3::Vec3;
use crate::world::components::Team;

// =============================================================================
// ERRORS
// =============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent
    #[error("invalid config: {0}")]
    Invalid(String),
}

// =============================================================================
// ROOT
// =============================================================================

/// Complete server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Tick cadence and broadcast throttling
    pub simulation: SimulationConfig,
    /// Match rules
    pub match_rules: MatchRules,
    /// Combat constants
    pub combat: CombatConfig,
    /// Physics limits
    pub physics: PhysicsConfig,
    /// Weapon ballistics table
    pub weapons: Vec<WeaponConfig>,
    /// Spell table
    pub spells: Vec<SpellConfig>,
    /// Arena layout
    pub map: MapConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            match_rules: MatchRules::default(),
            combat: CombatConfig::default(),
            physics: PhysicsConfig::default(),
            weapons: default_weapons(),
            spells: default_spells(),
            map: MapConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse from TOML text and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.tick_rate == 0 || sim.tick_rate > 1000 {
            return Err(ConfigError::Invalid(format!("tick_rate {} out of range 1..=1000", sim.tick_rate)));
        }
        if sim.snapshot_interval_ticks == 0 {
            return Err(ConfigError::Invalid("snapshot_interval_ticks must be positive".into()));
        }
        if sim.effect_interval_ms == 0 {
            return Err(ConfigError::Invalid("effect_interval_ms must be positive".into()));
        }

        let rules = &self.match_rules;
        if rules.min_players == 0 || rules.min_players > rules.max_players {
            return Err(ConfigError::Invalid(format!(
                "player bounds {}..={} are inconsistent",
                rules.min_players, rules.max_players
            )));
        }

        let combat = &self.combat;
        if combat.max_health <= 0.0 || !combat.max_health.is_finite() {
            return Err(ConfigError::Invalid("max_health must be positive".into()));
        }
        if combat.regen_rate < 0.0 {
            return Err(ConfigError::Invalid("regen_rate must not be negative".into()));
        }
        if combat.damage_log_capacity == 0 {
            return Err(ConfigError::Invalid("damage_log_capacity must be positive".into()));
        }

        let physics = &self.physics;
        if physics.max_move_per_tick <= 0.0 {
            return Err(ConfigError::Invalid("max_move_per_tick must be positive".into()));
        }
        if physics.projectile_substep <= 0.0 || physics.projectile_max_time <= 0.0 {
            return Err(ConfigError::Invalid("projectile timing must be positive".into()));
        }

        let mut weapon_ids: Vec<u32> = self.weapons.iter().map(|w| w.id).collect();
        weapon_ids.sort_unstable();
        if weapon_ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(ConfigError::Invalid("duplicate weapon id".into()));
        }
        for weapon in &self.weapons {
            if weapon.falloff_end < weapon.falloff_start {
                return Err(ConfigError::Invalid(format!(
                    "weapon {} falloff_end is before falloff_start",
                    weapon.id
                )));
            }
            if weapon.speed <= 0.0 {
                return Err(ConfigError::Invalid(format!("weapon {} speed must be positive", weapon.id)));
            }
        }

        let mut spell_ids: Vec<u32> = self.spells.iter().map(|s| s.id).collect();
        spell_ids.sort_unstable();
        if spell_ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(ConfigError::Invalid("duplicate spell id".into()));
        }
        for spell in &self.spells {
            if spell.kind == SpellKind::Effect && spell.effect.is_none() {
                return Err(ConfigError::Invalid(format!("spell {} has no effect", spell.id)));
            }
            if !spell.immunities.is_empty() && spell.kind != SpellKind::Effect {
                return Err(ConfigError::Invalid(format!("spell {} grants immunities but is not an effect spell", spell.id)));
            }
            if let Some(effect) = spell.effect {
                if spell.immunities.contains(&effect.effect_type) {
                    return Err(ConfigError::Invalid(format!("spell {} is immune to its own effect", spell.id)));
                }
            }
        }

        for team in Team::ALL {
            if !self.map.spawn_areas.iter().any(|a| a.team == team) {
                return Err(ConfigError::Invalid(format!("no spawn area for team {:?}", team)));
            }
        }

        Ok(())
    }

    /// Weapon by id.
    pub fn weapon(&self, id: u32) -> Option<&WeaponConfig> {
        self.weapons.iter().find(|w| w.id == id)
    }

    /// Spell by id.
    pub fn spell(&self, id: u32) -> Option<&SpellConfig> {
        self.spells.iter().find(|s| s.id == id)
    }
}

// =============================================================================
// SECTIONS
// =============================================================================

/// Tick cadence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Ticks per second
    pub tick_rate: u32,
    /// Broadcast a snapshot every N ticks
    pub snapshot_interval_ticks: u32,
    /// Periodic effect / regeneration interval
    pub effect_interval_ms: u64,
    /// Most ticks run for one wall-clock delta
    pub max_catch_up_ticks: u32,
    /// Server seed for respawn placement
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            snapshot_interval_ticks: 3,
            effect_interval_ms: 250,
            max_catch_up_ticks: 5,
            seed: 0x5EED,
        }
    }
}

/// Match rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRules {
    /// Players needed to start the countdown
    pub min_players: usize,
    /// Joins beyond this are rejected
    pub max_players: usize,
    /// Countdown length
    pub countdown_ms: u64,
    /// Round time limit
    pub max_duration_ms: u64,
    /// Team score that ends the round
    pub score_limit: u32,
    /// Player score per kill
    pub kill_score: u32,
    /// Player score per assist
    pub assist_score: u32,
    /// Delay between death and respawn
    pub respawn_delay_ms: u64,
    /// Delay between round end and reset
    pub restart_delay_ms: u64,
    /// Attackers within this window before a death earn an assist
    pub assist_window_ms: u64,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 16,
            countdown_ms: 5_000,
            max_duration_ms: 600_000,
            score_limit: 30,
            kill_score: 100,
            assist_score: 50,
            respawn_delay_ms: 3_000,
            restart_delay_ms: 10_000,
            assist_window_ms: 10_000,
        }
    }
}

/// Combat constants.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Damage multiplier per body part
    pub body_parts: BodyPartMultipliers,
    /// Player max health
    pub max_health: f32,
    /// Passive regeneration per second
    pub regen_rate: f32,
    /// Time without damage before regeneration starts
    pub regen_delay_ms: u64,
    /// Entries kept per damage log
    pub damage_log_capacity: usize,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            body_parts: BodyPartMultipliers::default(),
            max_health: 100.0,
            regen_rate: 5.0,
            regen_delay_ms: 5_000,
            damage_log_capacity: 20,
        }
    }
}

/// Physics limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Vertical gravity (negative is down)
    pub gravity: f32,
    /// Furthest a validated move may go from the last accepted position
    pub max_move_per_tick: f32,
    /// Player capsule half height (cylinder part)
    pub player_half_height: f32,
    /// Player capsule radius
    pub player_radius: f32,
    /// Player mass
    pub player_mass: f32,
    /// Ray length below the feet that still counts as grounded
    pub ground_probe: f32,
    /// Minimum time between accepted jumps
    pub jump_cooldown_ms: u64,
    /// Longest a projectile is simulated
    pub projectile_max_time: f32,
    /// Projectile integration step
    pub projectile_substep: f32,
    /// Furthest a shot origin may be from the shooter
    pub max_muzzle_offset: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: -9.81,
            max_move_per_tick: 0.5,
            player_half_height: 1.2,
            player_radius: 0.5,
            player_mass: 80.0,
            ground_probe: 0.15,
            jump_cooldown_ms: 500,
            projectile_max_time: 0.5,
            projectile_substep: 1.0 / 240.0,
            max_muzzle_offset: 2.5,
        }
    }
}

/// One row of the weapon ballistics table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponConfig {
    /// Weapon id used by shoot intents
    pub id: u32,
    /// Display name
    pub name: String,
    /// Damage before multipliers
    pub base_damage: f32,
    /// Muzzle speed (units/s)
    pub speed: f32,
    /// Armor penetration, reported to clients
    pub penetration: f32,
    /// Full damage up to this distance
    pub falloff_start: f32,
    /// Zero damage from this distance
    pub falloff_end: f32,
    /// Recoil, reported to clients
    pub recoil: f32,
    /// Minimum time between shots
    pub fire_interval_ms: u64,
    /// Damage element
    pub damage_type: DamageType,
}

impl Default for WeaponConfig {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            base_damage: 25.0,
            speed: 900.0,
            penetration: 0.0,
            falloff_start: 30.0,
            falloff_end: 80.0,
            recoil: 0.0,
            fire_interval_ms: 100,
            damage_type: DamageType::Physical,
        }
    }
}

fn default_weapons() -> Vec<WeaponConfig> {
    vec![
        WeaponConfig {
            id: 1,
            name: "rifle".into(),
            base_damage: 25.0,
            speed: 900.0,
            penetration: 0.3,
            falloff_start: 30.0,
            falloff_end: 80.0,
            recoil: 0.4,
            fire_interval_ms: 100,
            damage_type: DamageType::Physical,
        },
        WeaponConfig {
            id: 2,
            name: "pistol".into(),
            base_damage: 20.0,
            speed: 400.0,
            penetration: 0.1,
            falloff_start: 15.0,
            falloff_end: 50.0,
            recoil: 0.2,
            fire_interval_ms: 250,
            damage_type: DamageType::Physical,
        },
        WeaponConfig {
            id: 3,
            name: "sniper".into(),
            base_damage: 80.0,
            speed: 1_200.0,
            penetration: 0.8,
            falloff_start: 100.0,
            falloff_end: 300.0,
            recoil: 1.5,
            fire_interval_ms: 1_200,
            damage_type: DamageType::Physical,
        },
    ]
}

/// How a spell resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellKind {
    /// Direct damage to each target
    Damage,
    /// Heal each target (caster if none)
    Heal,
    /// Apply the spell's effect to each target (caster if none)
    Effect,
    /// Damage everyone within `radius` of the cast position
    Area,
}

/// Effect carried by a spell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpellEffect {
    /// Kind
    pub effect_type: EffectType,
    /// Strength
    pub power: f32,
    /// Lifetime
    pub duration_ms: u64,
    /// Pulse interval for periodic effects
    #[serde(default)]
    pub tick_interval_ms: Option<u64>,
}

/// One row of the spell table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpellConfig {
    /// Spell id used by cast intents
    pub id: u32,
    /// Display name
    pub name: String,
    /// Resolution
    pub kind: SpellKind,
    /// Damage element
    #[serde(default = "default_spell_damage_type")]
    pub damage_type: DamageType,
    /// Damage or heal amount
    #[serde(default)]
    pub amount: f32,
    /// Area radius
    #[serde(default)]
    pub radius: f32,
    /// Furthest target or cast point from the caster
    pub range: f32,
    /// Minimum time between casts
    pub cooldown_ms: u64,
    /// Effect applied by `Effect` spells
    #[serde(default)]
    pub effect: Option<SpellEffect>,
    /// Effect types `Effect` spells make their targets immune to until
    /// the next respawn
    #[serde(default)]
    pub immunities: Vec<EffectType>,
}

fn default_spell_damage_type() -> DamageType {
    DamageType::Arcane
}

fn default_spells() -> Vec<SpellConfig> {
    vec![
        SpellConfig {
            id: 1,
            name: "fireball".into(),
            kind: SpellKind::Area,
            damage_type: DamageType::Fire,
            amount: 40.0,
            radius: 4.0,
            range: 40.0,
            cooldown_ms: 2_000,
            effect: None,
            immunities: Vec::new(),
        },
        SpellConfig {
            id: 2,
            name: "mend".into(),
            kind: SpellKind::Heal,
            damage_type: DamageType::Arcane,
            amount: 30.0,
            radius: 0.0,
            range: 20.0,
            cooldown_ms: 5_000,
            effect: None,
            immunities: Vec::new(),
        },
        SpellConfig {
            id: 3,
            name: "ignite".into(),
            kind: SpellKind::Effect,
            damage_type: DamageType::Fire,
            amount: 0.0,
            radius: 0.0,
            range: 30.0,
            cooldown_ms: 6_000,
            effect: Some(SpellEffect {
                effect_type: EffectType::DamageOverTime(DamageType::Fire),
                power: 5.0,
                duration_ms: 4_000,
                tick_interval_ms: Some(1_000),
            }),
            immunities: Vec::new(),
        },
        SpellConfig {
            id: 4,
            name: "ward".into(),
            kind: SpellKind::Effect,
            damage_type: DamageType::Arcane,
            amount: 0.0,
            radius: 0.0,
            range: 20.0,
            cooldown_ms: 15_000,
            effect: Some(SpellEffect {
                effect_type: EffectType::Resistance(DamageType::Physical),
                power: 100.0,
                duration_ms: 3_000,
                tick_interval_ms: None,
            }),
            immunities: vec![EffectType::Slow],
        },
        SpellConfig {
            id: 5,
            name: "frost_bolt".into(),
            kind: SpellKind::Damage,
            damage_type: DamageType::Frost,
            amount: 20.0,
            radius: 0.0,
            range: 35.0,
            cooldown_ms: 1_500,
            effect: None,
            immunities: Vec::new(),
        },
    ]
}

/// Box of static geometry.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstacleConfig {
    /// Box center
    pub center: Vec3,
    /// Half extents
    pub half_extents: Vec3,
}

/// Disc where a team's players (re)spawn.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnAreaConfig {
    /// Owning team
    pub team: Team,
    /// Disc center; y is the spawn height of the player's center
    pub center: Vec3,
    /// Disc radius
    pub radius: f32,
}

/// Arena layout.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Floor half extents; the floor's top face sits at y = 0
    pub floor_half_extents: Vec3,
    /// Extra static boxes
    pub obstacles: Vec<ObstacleConfig>,
    /// Team spawn areas
    pub spawn_areas: Vec<SpawnAreaConfig>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            floor_half_extents: Vec3::new(60.0, 0.5, 60.0),
            obstacles: vec![
                ObstacleConfig {
                    center: Vec3::new(0.0, 1.5, 0.0),
                    half_extents: Vec3::new(2.0, 1.5, 8.0),
                },
                ObstacleConfig {
                    center: Vec3::new(-20.0, 1.0, 15.0),
                    half_extents: Vec3::new(3.0, 1.0, 1.0),
                },
                ObstacleConfig {
                    center: Vec3::new(20.0, 1.0, -15.0),
                    half_extents: Vec3::new(3.0, 1.0, 1.0),
                },
            ],
            spawn_areas: vec![
                SpawnAreaConfig {
                    team: Team::Red,
                    center: Vec3::new(-40.0, 1.7, 0.0),
                    radius: 5.0,
                },
                SpawnAreaConfig {
                    team: Team::Blue,
                    center: Vec3::new(40.0, 1.7, 0.0),
                    radius: 5.0,
                },
            ],
        }
    }
}

/// Logging output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error)
    pub level: String,
    /// Emit JSON lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.tick_rate, 60);
        assert_eq!(config.combat.body_parts.head, 2.5);
        assert!(config.weapon(1).is_some());
        assert!(config.spell(3).is_some());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            [match_rules]
            score_limit = 10

            [simulation]
            tick_rate = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.match_rules.score_limit, 10);
        assert_eq!(config.match_rules.min_players, 2);
        assert_eq!(config.simulation.tick_rate, 30);
        assert_eq!(config.weapons.len(), 3);
    }

    #[test]
    fn test_weapon_table_override() {
        let config = ServerConfig::from_toml(
            r#"
            [[weapons]]
            id = 7
            name = "shotgun"
            base_damage = 12.0
            falloff_start = 5.0
            falloff_end = 20.0
            damage_type = "physical"
            "#,
        )
        .unwrap();

        assert_eq!(config.weapons.len(), 1);
        let shotgun = config.weapon(7).unwrap();
        assert_eq!(shotgun.base_damage, 12.0);
        assert_eq!(shotgun.speed, 900.0);
    }

    #[test]
    fn test_invalid_player_bounds() {
        let result = ServerConfig::from_toml(
            r#"
            [match_rules]
            min_players = 10
            max_players = 4
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_inverted_falloff_rejected() {
        let mut config = ServerConfig::default();
        config.weapons[0].falloff_end = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_immunity_rules() {
        let mut config = ServerConfig::default();
        config.spells[1].immunities = vec![EffectType::Slow];
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.spells[3].immunities.push(EffectType::Resistance(DamageType::Physical));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        let result = ServerConfig::from_toml("this is = = not toml");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"\njson = true").unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_missing_file() {
        let result = ServerConfig::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
