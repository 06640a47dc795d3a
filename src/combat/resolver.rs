//! Combat Resolver
//!
//! Turns hits, spells and area damage into health and effect changes.
//!
//! ## Damage Order
//!
//! 1. Immunity: invulnerability or a full resistance blocks the hit. The
//!    hit is still logged and reported, with zero damage.
//! 2. Resistance and vulnerability modifiers, multiplicatively.
//! 3. Round, with a floor of 1 if anything was going to be dealt.
//! 4. Subtract from health (clamped at 0) and stamp the damage time.
//! 5. Append to the damage log.
//! 6. Notify.
//! 7. If this hit took health from above zero to zero, queue a death.
//!
//! Deaths are never processed here. The match controller drains the
//! queue once all of a tick's damage has landed.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::combat::damage::{calculate_damage, round_damage, DamageType};
use crate::combat::effects::{ActiveEffect, EffectOutcome, EffectType};
use crate::config::{CombatConfig, ServerConfig, SpellConfig, SpellKind, WeaponConfig};
use crate::core::clock::{SimTime, TickStamp};
use crate::game::events::{AreaDamageEvent, DeathEvent, EventBus, Notification, NotificationData, SpellEvent};
use crate::game::intent::{CastIntent, RejectReason};
use crate::world::components::{DamageRecord, DamageSource};
use crate::world::entity::{EntityId, PlayerId};
use crate::world::store::WorldStore;

/// Damage at the edge of an area, relative to the center.
const AREA_EDGE_FACTOR: f32 = 0.5;

// =============================================================================
// TYPES
// =============================================================================

/// One source of damage against one target, before modifiers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DamageRequest {
    /// Entity taking the damage
    pub target: EntityId,
    /// Who dealt it
    pub attacker: Option<PlayerId>,
    /// Damage before resistances
    pub amount: f32,
    /// Element
    pub damage_type: DamageType,
    /// Weapon, spell or effect
    pub source: DamageSource,
}

/// What [`CombatResolver::apply_damage`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Target missing or already dead
    Ignored,
    /// Immunity or modifiers reduced the hit to nothing
    Blocked,
    /// Health changed
    Dealt {
        /// Final integer damage
        amount: u32,
        /// This hit queued a death
        lethal: bool,
    },
}

// =============================================================================
// COMBAT RESOLVER
// =============================================================================

/// Authoritative combat arithmetic plus per-player fire and spell timers.
#[derive(Clone, Debug)]
pub struct CombatResolver {
    combat: CombatConfig,
    weapons: BTreeMap<u32, WeaponConfig>,
    spells: BTreeMap<u32, SpellConfig>,
    effect_interval_ms: u64,
    next_shot: BTreeMap<PlayerId, SimTime>,
    spell_ready: BTreeMap<(PlayerId, u32), SimTime>,
    last_coarse_update: SimTime,
}

impl CombatResolver {
    /// Build from the static tables.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            combat: config.combat.clone(),
            weapons: config.weapons.iter().map(|w| (w.id, w.clone())).collect(),
            spells: config.spells.iter().map(|s| (s.id, s.clone())).collect(),
            effect_interval_ms: config.simulation.effect_interval_ms.max(1),
            next_shot: BTreeMap::new(),
            spell_ready: BTreeMap::new(),
            last_coarse_update: 0,
        }
    }

    /// Weapon table entry.
    pub fn weapon(&self, id: u32) -> Option<&WeaponConfig> {
        self.weapons.get(&id)
    }

    /// Spell table entry.
    pub fn spell(&self, id: u32) -> Option<&SpellConfig> {
        self.spells.get(&id)
    }

    // -------------------------------------------------------------------------
    // Intent gating
    // -------------------------------------------------------------------------

    /// Check the fire interval and consume a shot.
    pub fn prepare_shot(&mut self, player: PlayerId, weapon_id: u32, now: SimTime) -> Result<WeaponConfig, RejectReason> {
        let weapon = self
            .weapons
            .get(&weapon_id)
            .ok_or(RejectReason::UnknownWeapon { weapon_id })?;

        if let Some(&ready) = self.next_shot.get(&player) {
            if now < ready {
                return Err(RejectReason::OnCooldown);
            }
        }
        self.next_shot.insert(player, now + weapon.fire_interval_ms);
        Ok(weapon.clone())
    }

    /// Validate a cast against cooldown and range. On success the cooldown
    /// starts and the cast is returned as an event with out-of-range,
    /// unknown and dead targets removed.
    pub fn prepare_cast(&mut self, world: &WorldStore, intent: &CastIntent, now: SimTime) -> Result<SpellEvent, RejectReason> {
        let spell_id = intent.spell_id;
        let spell = self.spells.get(&spell_id).ok_or(RejectReason::UnknownSpell { spell_id })?;

        let key = (intent.player_id, spell_id);
        if self.spell_ready.get(&key).is_some_and(|&ready| now < ready) {
            return Err(RejectReason::OnCooldown);
        }

        let caster_pos = world
            .entity_of(&intent.player_id)
            .and_then(|e| world.position(e))
            .map(|p| p.translation)
            .ok_or(RejectReason::UnknownPlayer)?;

        let targets: Vec<PlayerId> = intent
            .targets
            .iter()
            .copied()
            .filter(|id| {
                world
                    .entity_of(id)
                    .filter(|&e| world.is_alive(e))
                    .and_then(|e| world.position(e))
                    .is_some_and(|p| p.translation.distance(caster_pos) <= spell.range)
            })
            .collect();

        match spell.kind {
            SpellKind::Area => {
                if intent.position.distance(caster_pos) > spell.range {
                    return Err(RejectReason::OutOfRange);
                }
            }
            SpellKind::Damage => {
                if targets.is_empty() {
                    return Err(RejectReason::OutOfRange);
                }
            }
            SpellKind::Heal | SpellKind::Effect => {
                if !intent.targets.is_empty() && targets.is_empty() {
                    return Err(RejectReason::OutOfRange);
                }
            }
        }

        self.spell_ready.insert(key, now + spell.cooldown_ms);
        Ok(SpellEvent {
            caster: intent.player_id,
            spell_id,
            position: intent.position,
            direction: intent.direction,
            targets,
        })
    }

    /// Forget every timer of a departing player.
    pub fn retract(&mut self, player: &PlayerId) {
        self.next_shot.remove(player);
        self.spell_ready.retain(|(id, _), _| id != player);
    }

    /// Forget every timer. Called between rounds.
    pub fn reset(&mut self) {
        self.next_shot.clear();
        self.spell_ready.clear();
    }

    // -------------------------------------------------------------------------
    // Health
    // -------------------------------------------------------------------------

    /// Apply one hit. See the module docs for the order of operations.
    pub fn apply_damage(
        &self,
        world: &mut WorldStore,
        bus: &mut EventBus,
        stamp: TickStamp,
        request: DamageRequest,
    ) -> DamageOutcome {
        let target = request.target;
        let now = stamp.now;

        let Some(target_id) = world.player(target).filter(|p| p.is_alive).map(|p| p.id) else {
            debug!(entity = ?target, "Damage against absent or dead target ignored");
            return DamageOutcome::Ignored;
        };
        if world.health(target).is_none() {
            warn!(entity = ?target, "Damage target has no health component");
            return DamageOutcome::Ignored;
        }

        let (blocked, multiplier) = world
            .effects(target)
            .map(|e| (e.blocks_damage(request.damage_type, now), e.damage_multiplier(request.damage_type, now)))
            .unwrap_or((false, 1.0));

        let modified = request.amount * multiplier;
        let amount = if blocked || !(modified > 0.0) { 0 } else { round_damage(modified) };

        let (before, after) = match world.health_mut(target) {
            Some(health) => {
                let before = health.current;
                if amount > 0 {
                    health.current = (health.current - amount as f32).max(0.0);
                    health.last_damage_time = Some(now);
                }
                (before, health.current)
            }
            None => return DamageOutcome::Ignored,
        };

        if let Some(log) = world.damage_log_mut_or_default(target) {
            log.push(DamageRecord {
                attacker: request.attacker,
                amount,
                damage_type: request.damage_type,
                timestamp: now,
                source: request.source,
            });
        }

        let (body_part, critical) = match request.source {
            DamageSource::Weapon { body_part, critical, .. } => (Some(body_part), critical),
            _ => (None, false),
        };
        bus.notify(Notification::new(stamp.tick, NotificationData::DamageApplied {
            target: target_id,
            attacker: request.attacker,
            amount,
            damage_type: request.damage_type,
            body_part,
            critical,
            blocked: amount == 0,
            health: after,
        }));

        if amount == 0 {
            debug!(target = %target_id, damage_type = ?request.damage_type, "Hit blocked");
            return DamageOutcome::Blocked;
        }

        let lethal = before > 0.0 && after <= 0.0;
        if lethal {
            let killer = request
                .attacker
                .or_else(|| world.damage_log(target).and_then(|log| log.latest_attacker()));
            bus.deaths.publish(DeathEvent { victim: target, killer, time: now });
            debug!(target = %target_id, "Death queued");
        }

        debug!(target = %target_id, amount, health = after, "Damage applied");
        DamageOutcome::Dealt { amount, lethal }
    }

    /// Heal a living target, capped at max health. Returns the amount
    /// actually restored.
    pub fn apply_healing(
        &self,
        world: &mut WorldStore,
        bus: &mut EventBus,
        stamp: TickStamp,
        target: EntityId,
        amount: f32,
        source: Option<PlayerId>,
    ) -> f32 {
        let Some(target_id) = world.player(target).filter(|p| p.is_alive).map(|p| p.id) else {
            return 0.0;
        };
        if !(amount > 0.0) {
            return 0.0;
        }
        let Some(health) = world.health_mut(target) else {
            warn!(entity = ?target, "Heal target has no health component");
            return 0.0;
        };
        // A pending death is not undone by healing
        if health.is_depleted() {
            return 0.0;
        }

        let before = health.current;
        health.current = (health.current + amount).min(health.max);
        let healed = health.current - before;
        let current = health.current;

        if healed > 0.0 {
            bus.notify(Notification::new(stamp.tick, NotificationData::Healed {
                target: target_id,
                source,
                amount: healed,
                health: current,
            }));
        }
        healed
    }

    /// Passive regeneration for every living entity that has been out of
    /// combat for the regen delay.
    pub fn regenerate(&self, world: &mut WorldStore, now: SimTime, elapsed_ms: u64) {
        let delay = self.combat.regen_delay_ms;
        let seconds = elapsed_ms as f32 / 1000.0;

        for entity in world.entities_with_health() {
            if !world.is_alive(entity) {
                continue;
            }
            let Some(health) = world.health_mut(entity) else { continue };
            let rested = health
                .last_damage_time
                .map_or(true, |t| now.saturating_sub(t) >= delay);
            if rested && health.regen_rate > 0.0 && health.current > 0.0 && health.current < health.max {
                health.current = (health.current + health.regen_rate * seconds).min(health.max);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Effects
    // -------------------------------------------------------------------------

    /// Apply an effect with the strongest/longest policy. Returns None if
    /// the target is absent or dead.
    pub fn apply_effect(
        &self,
        world: &mut WorldStore,
        bus: &mut EventBus,
        stamp: TickStamp,
        target: EntityId,
        effect: ActiveEffect,
    ) -> Option<EffectOutcome> {
        let target_id = world.player(target).filter(|p| p.is_alive).map(|p| p.id)?;
        let effects = world.effects_mut_or_default(target)?;
        let outcome = effects.apply(effect, stamp.now);

        if outcome.changed() {
            if let Some(active) = effects.get(effect.effect_type) {
                bus.notify(Notification::new(stamp.tick, NotificationData::EffectApplied {
                    target: target_id,
                    effect_type: active.effect_type,
                    power: active.power,
                    duration: active.duration,
                    outcome,
                }));
            }
        }
        debug!(target = %target_id, effect = ?effect.effect_type, ?outcome, "Effect applied");
        Some(outcome)
    }

    /// Remove an effect. Absent effects are a silent no-op.
    pub fn remove_effect(
        &self,
        world: &mut WorldStore,
        bus: &mut EventBus,
        stamp: TickStamp,
        target: EntityId,
        effect_type: EffectType,
    ) -> bool {
        let removed = world
            .effects_mut(target)
            .and_then(|e| e.remove(effect_type))
            .is_some();

        if removed {
            if let Some(player) = world.player(target) {
                bus.notify(Notification::new(stamp.tick, NotificationData::EffectRemoved {
                    target: player.id,
                    effect_type,
                }));
            }
        }
        removed
    }

    /// Make a living target immune to an effect type, dropping any active
    /// instance of it. Lasts until the effect set is cleared on respawn.
    pub fn grant_immunity(
        &self,
        world: &mut WorldStore,
        bus: &mut EventBus,
        stamp: TickStamp,
        target: EntityId,
        effect_type: EffectType,
    ) -> bool {
        if world.player(target).map_or(true, |p| !p.is_alive) {
            return false;
        }
        let Some(effects) = world.effects_mut_or_default(target) else {
            return false;
        };
        if effects.is_immune_to(effect_type) {
            return false;
        }
        effects.add_immunity(effect_type);
        debug!(entity = ?target, effect = ?effect_type, "Immunity granted");
        self.remove_effect(world, bus, stamp, target, effect_type);
        true
    }

    /// Fire due pulses, then drop expired effects.
    ///
    /// Runs in two phases: the first pass only reads, the second applies
    /// pulses and removals, so no effect set is mutated while iterated.
    pub fn process_active_effects(&self, world: &mut WorldStore, bus: &mut EventBus, stamp: TickStamp) {
        let now = stamp.now;
        let mut pulses: Vec<(EntityId, ActiveEffect)> = Vec::new();
        let mut expired: Vec<(EntityId, EffectType)> = Vec::new();

        for entity in world.entities_with_effects() {
            let alive = world.is_alive(entity);
            let Some(effects) = world.effects(entity) else { continue };
            for effect in effects.iter() {
                if alive && effect.pulse_due(now) {
                    pulses.push((entity, *effect));
                }
                if effect.is_expired(now) {
                    expired.push((entity, effect.effect_type));
                }
            }
        }

        for (entity, effect) in pulses {
            if let Some(active) = world.effects_mut(entity).and_then(|e| e.get_mut(effect.effect_type)) {
                // Keep the pulse cadence anchored to the start time
                let since = active.last_tick_time.unwrap_or(active.start_time);
                active.last_tick_time = Some(since + effect.tick_interval.unwrap_or(0));
            }

            match effect.effect_type {
                EffectType::DamageOverTime(damage_type) => {
                    self.apply_damage(world, bus, stamp, DamageRequest {
                        target: entity,
                        attacker: effect.source,
                        amount: effect.power,
                        damage_type,
                        source: DamageSource::Effect,
                    });
                }
                EffectType::HealOverTime => {
                    self.apply_healing(world, bus, stamp, entity, effect.power, effect.source);
                }
                _ => {}
            }
        }

        for (entity, effect_type) in expired {
            let removed = world.effects_mut(entity).and_then(|e| e.remove(effect_type)).is_some();
            if let (true, Some(player)) = (removed, world.player(entity)) {
                bus.notify(Notification::new(stamp.tick, NotificationData::EffectExpired {
                    target: player.id,
                    effect_type,
                }));
            }
        }
    }

    /// Periodic effects and regeneration, gated on the effect interval.
    /// Returns true if the update ran.
    pub fn coarse_update(&mut self, world: &mut WorldStore, bus: &mut EventBus, stamp: TickStamp) -> bool {
        let elapsed = stamp.now.saturating_sub(self.last_coarse_update);
        if elapsed < self.effect_interval_ms {
            return false;
        }
        self.last_coarse_update = stamp.now;

        self.process_active_effects(world, bus, stamp);
        self.regenerate(world, stamp.now, elapsed);
        true
    }

    // -------------------------------------------------------------------------
    // Event consumption
    // -------------------------------------------------------------------------

    /// Consume every queued hit, spell and area event.
    pub fn resolve(&self, world: &mut WorldStore, bus: &mut EventBus, stamp: TickStamp) {
        self.resolve_hits(world, bus, stamp);
        self.resolve_spells(world, bus, stamp);
        self.resolve_area_damage(world, bus, stamp);
    }

    /// Weapon hits.
    pub fn resolve_hits(&self, world: &mut WorldStore, bus: &mut EventBus, stamp: TickStamp) {
        for hit in bus.hits.drain() {
            let Some(weapon) = self.weapons.get(&hit.weapon_id) else {
                warn!(weapon_id = hit.weapon_id, "Hit with unknown weapon dropped");
                continue;
            };
            let Some(center) = world.position(hit.target).map(|p| p.translation) else {
                warn!(entity = ?hit.target, "Hit on stale entity dropped");
                continue;
            };
            if self.is_friendly(world, Some(hit.attacker), hit.target) {
                debug!(attacker = %hit.attacker, "Friendly hit ignored");
                continue;
            }

            let roll = calculate_damage(weapon, &self.combat.body_parts, hit.point.y - center.y, hit.distance);
            self.apply_damage(world, bus, stamp, DamageRequest {
                target: hit.target,
                attacker: Some(hit.attacker),
                amount: roll.amount as f32,
                damage_type: weapon.damage_type,
                source: DamageSource::Weapon {
                    weapon_id: weapon.id,
                    body_part: roll.body_part,
                    critical: roll.critical,
                },
            });
        }
    }

    /// Spell casts. Area spells are forwarded to the area channel.
    pub fn resolve_spells(&self, world: &mut WorldStore, bus: &mut EventBus, stamp: TickStamp) {
        for cast in bus.spells.drain() {
            let Some(spell) = self.spells.get(&cast.spell_id) else {
                warn!(spell_id = cast.spell_id, "Cast of unknown spell dropped");
                continue;
            };

            let targets: Vec<EntityId> = if cast.targets.is_empty() {
                world.entity_of(&cast.caster).into_iter().collect()
            } else {
                cast.targets.iter().filter_map(|id| world.entity_of(id)).collect()
            };

            match spell.kind {
                SpellKind::Damage => {
                    for target in targets {
                        if self.is_friendly(world, Some(cast.caster), target) {
                            continue;
                        }
                        self.apply_damage(world, bus, stamp, DamageRequest {
                            target,
                            attacker: Some(cast.caster),
                            amount: spell.amount,
                            damage_type: spell.damage_type,
                            source: DamageSource::Spell { spell_id: spell.id },
                        });
                    }
                }
                SpellKind::Heal => {
                    for target in targets {
                        self.apply_healing(world, bus, stamp, target, spell.amount, Some(cast.caster));
                    }
                }
                SpellKind::Effect => {
                    let Some(template) = spell.effect else { continue };
                    let effect = ActiveEffect {
                        effect_type: template.effect_type,
                        power: template.power,
                        duration: template.duration_ms,
                        start_time: stamp.now,
                        last_tick_time: None,
                        tick_interval: template.tick_interval_ms,
                        source: Some(cast.caster),
                    };
                    for target in targets {
                        self.apply_effect(world, bus, stamp, target, effect);
                        for &immunity in &spell.immunities {
                            self.grant_immunity(world, bus, stamp, target, immunity);
                        }
                    }
                }
                SpellKind::Area => {
                    bus.area_damage.publish(AreaDamageEvent {
                        source: Some(cast.caster),
                        spell_id: spell.id,
                        center: cast.position,
                        radius: spell.radius,
                        amount: spell.amount,
                        damage_type: spell.damage_type,
                    });
                }
            }
        }
    }

    /// Area damage, scaled down linearly toward the edge.
    pub fn resolve_area_damage(&self, world: &mut WorldStore, bus: &mut EventBus, stamp: TickStamp) {
        for area in bus.area_damage.drain() {
            if !(area.radius > 0.0) {
                continue;
            }
            let victims: Vec<(EntityId, f32)> = world
                .player_entities()
                .filter(|&(_, e)| world.is_alive(e))
                .filter_map(|(_, e)| {
                    let d = world.position(e)?.translation.distance(area.center);
                    (d <= area.radius).then_some((e, d))
                })
                .collect();

            for (target, distance) in victims {
                if self.is_friendly(world, area.source, target) {
                    continue;
                }
                let factor = 1.0 - (1.0 - AREA_EDGE_FACTOR) * (distance / area.radius);
                self.apply_damage(world, bus, stamp, DamageRequest {
                    target,
                    attacker: area.source,
                    amount: area.amount * factor,
                    damage_type: area.damage_type,
                    source: DamageSource::Spell { spell_id: area.spell_id },
                });
            }
        }
    }

    /// Same team and not the attacker itself.
    fn is_friendly(&self, world: &WorldStore, attacker: Option<PlayerId>, target: EntityId) -> bool {
        let Some(attacker) = attacker else { return false };
        let Some(target_player) = world.player(target) else { return false };
        if target_player.id == attacker {
            return false;
        }
        world
            .entity_of(&attacker)
            .and_then(|e| world.player(e))
            .is_some_and(|a| a.team == target_player.team)
    }
}

// =============================================================================
// TESTS
// =============================================================================
