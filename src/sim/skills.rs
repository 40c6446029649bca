//! Ability subsystem: skill library, unlock tree, cooldown gating and active effects
//!
//! Timed effects carry an expiry timestamp on the subsystem clock and are
//! removed by `update`, so nothing fires between ticks. Removal is idempotent.

use std::collections::{BTreeMap, HashMap};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::combat::EntityId;
use super::cooldown::{CooldownEvent, CooldownTracker};
use super::effects::{EffectKind, SkillEffect};
use super::events::{Dispatcher, HandlerId, SimEvent};
use super::stats::{CharacterStats, DamageResult};
use crate::error::ConfigError;
use crate::secs_to_ms;

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingStat {
    Damage,
    Range,
    Knockback,
    Defense,
    Health,
    Reflection,
}

/// `base + per_level * level`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearScaling {
    pub base: f32,
    pub per_level: f32,
}

impl LinearScaling {
    pub fn at(&self, level: u32) -> f32 {
        self.base + self.per_level * level as f32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub max_level: u32,
    /// 0 for passives
    pub base_cooldown_ms: f64,
    #[serde(default)]
    pub effects: Vec<SkillEffect>,
    #[serde(default)]
    pub scaling: BTreeMap<ScalingStat, LinearScaling>,
    /// Any one of these unlocks the skill
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Player level needed before a skill point can be spent on it
    #[serde(default = "one")]
    pub required_level: u32,
}

/// Validated set of skill definitions
#[derive(Debug, Clone, Default)]
pub struct SkillLibrary {
    defs: BTreeMap<String, SkillDef>,
}

impl SkillLibrary {
    /// Rejects duplicate ids, unknown prerequisites and prerequisite cycles
    pub fn new(defs: Vec<SkillDef>) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();
        for def in defs {
            if map.contains_key(&def.id) {
                return Err(ConfigError::DuplicateSkill(def.id));
            }
            map.insert(def.id.clone(), def);
        }

        for def in map.values() {
            if let Some(missing) = def.prerequisites.iter().find(|p| !map.contains_key(*p)) {
                return Err(ConfigError::UnknownPrerequisite {
                    skill: def.id.clone(),
                    prerequisite: missing.clone(),
                });
            }
        }

        let library = Self { defs: map };
        library.check_cycles()?;
        Ok(library)
    }

    fn check_cycles(&self) -> Result<(), ConfigError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            id: &'a str,
            defs: &'a BTreeMap<String, SkillDef>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), ConfigError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(ConfigError::PrerequisiteCycle(id.to_string())),
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(def) = defs.get(id) {
                for prerequisite in &def.prerequisites {
                    visit(prerequisite, defs, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for id in self.defs.keys() {
            visit(id, &self.defs, &mut marks)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&SkillDef> {
        self.defs.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// A skill the player owns. Cooldown and effects are copied at unlock time.
#[derive(Debug, Clone)]
pub struct UnlockedSkill {
    pub def: SkillDef,
    pub level: u32,
}

/// Who a skill is used on, and from where
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkillTarget {
    pub entity: EntityId,
    pub position: Vec2,
    pub source: Option<EntityId>,
    pub source_position: Vec2,
}

/// An effect currently applied to a target
#[derive(Debug, Clone)]
pub struct ActiveEffect {
    pub skill: String,
    pub effect: SkillEffect,
    pub source: Option<EntityId>,
    pub stacks: u32,
    pub expires_at: Option<f64>,
    next_tick_at: Option<f64>,
}

impl ActiveEffect {
    fn matches(&self, skill: &str, effect_id: &str) -> bool {
        self.skill == skill && self.effect.id == effect_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbilityEvent {
    SkillUnlock {
        skill: String,
    },
    SkillUpgrade {
        skill: String,
        level: u32,
    },
    SkillUse {
        skill: String,
        target: EntityId,
        cooldown_ms: f64,
    },
    SkillReady {
        skill: String,
    },
    EffectApplied {
        target: EntityId,
        skill: String,
        effect: String,
        stacks: u32,
    },
    EffectRemoved {
        target: EntityId,
        skill: String,
        effect: String,
    },
    /// A periodic effect fired; damage is resolved by the combat registry
    EffectTick {
        target: EntityId,
        source: Option<EntityId>,
        effect: SkillEffect,
        stacks: u32,
    },
    Impulse {
        target: EntityId,
        velocity: Vec2,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbilityEventKind {
    SkillUnlock,
    SkillUpgrade,
    SkillUse,
    SkillReady,
    EffectApplied,
    EffectRemoved,
    EffectTick,
    Impulse,
}

impl SimEvent for AbilityEvent {
    type Kind = AbilityEventKind;

    fn kind(&self) -> AbilityEventKind {
        match self {
            AbilityEvent::SkillUnlock { .. } => AbilityEventKind::SkillUnlock,
            AbilityEvent::SkillUpgrade { .. } => AbilityEventKind::SkillUpgrade,
            AbilityEvent::SkillUse { .. } => AbilityEventKind::SkillUse,
            AbilityEvent::SkillReady { .. } => AbilityEventKind::SkillReady,
            AbilityEvent::EffectApplied { .. } => AbilityEventKind::EffectApplied,
            AbilityEvent::EffectRemoved { .. } => AbilityEventKind::EffectRemoved,
            AbilityEvent::EffectTick { .. } => AbilityEventKind::EffectTick,
            AbilityEvent::Impulse { .. } => AbilityEventKind::Impulse,
        }
    }
}

#[derive(Debug)]
pub struct AbilitySystem {
    library: SkillLibrary,
    unlocked: BTreeMap<String, UnlockedSkill>,
    active: BTreeMap<EntityId, Vec<ActiveEffect>>,
    cooldowns: CooldownTracker,
    now_ms: f64,
    events: Dispatcher<AbilityEvent>,
}

impl AbilitySystem {
    pub fn new(library: SkillLibrary) -> Self {
        Self {
            library,
            unlocked: BTreeMap::new(),
            active: BTreeMap::new(),
            cooldowns: CooldownTracker::new(),
            now_ms: 0.0,
            events: Dispatcher::new(),
        }
    }

    pub fn library(&self) -> &SkillLibrary {
        &self.library
    }

    // === Unlock tree ===

    /// Known, not yet unlocked, and either no prerequisites or any one of them unlocked
    pub fn can_unlock(&self, id: &str) -> bool {
        let Some(def) = self.library.get(id) else {
            return false;
        };
        if self.unlocked.contains_key(id) {
            return false;
        }
        def.prerequisites.is_empty()
            || def
                .prerequisites
                .iter()
                .any(|p| self.unlocked.contains_key(p))
    }

    pub fn unlock_skill(&mut self, id: &str) -> bool {
        if !self.can_unlock(id) {
            return false;
        }
        let Some(def) = self.library.get(id).cloned() else {
            return false;
        };
        log::info!("skill unlocked: {}", def.name);
        self.unlocked
            .insert(id.to_string(), UnlockedSkill { def, level: 1 });
        self.events.emit(AbilityEvent::SkillUnlock {
            skill: id.to_string(),
        });
        true
    }

    /// Level + 1 while below max. Cooldown and effects do not change.
    pub fn upgrade_skill(&mut self, id: &str) -> bool {
        let Some(skill) = self.unlocked.get_mut(id) else {
            return false;
        };
        if skill.level >= skill.def.max_level {
            log::debug!("skill {} already at max level {}", id, skill.def.max_level);
            return false;
        }
        skill.level += 1;
        let level = skill.level;
        self.events.emit(AbilityEvent::SkillUpgrade {
            skill: id.to_string(),
            level,
        });
        true
    }

    pub fn is_unlocked(&self, id: &str) -> bool {
        self.unlocked.contains_key(id)
    }

    pub fn skill_level(&self, id: &str) -> Option<u32> {
        self.unlocked.get(id).map(|s| s.level)
    }

    pub fn unlocked_skills(&self) -> impl Iterator<Item = &UnlockedSkill> {
        self.unlocked.values()
    }

    /// Level-scaled value read by the presentation/gameplay layer
    pub fn scaled_value(&self, id: &str, stat: ScalingStat) -> Option<f32> {
        let skill = self.unlocked.get(id)?;
        skill.def.scaling.get(&stat).map(|s| s.at(skill.level))
    }

    // === Use & cooldowns ===

    pub fn can_use(&self, id: &str) -> bool {
        self.unlocked.contains_key(id) && !self.cooldowns.is_on_cooldown(id)
    }

    pub fn use_skill(&mut self, id: &str, target: SkillTarget) -> bool {
        if !self.can_use(id) {
            return false;
        }
        let Some(skill) = self.unlocked.get(id) else {
            return false;
        };
        let effects = skill.def.effects.clone();
        let cooldown_ms = skill.def.base_cooldown_ms;

        for effect in effects {
            self.apply_effect(id, target, effect);
        }
        self.cooldowns.start_cooldown(id, cooldown_ms);
        self.events.emit(AbilityEvent::SkillUse {
            skill: id.to_string(),
            target: target.entity,
            cooldown_ms,
        });
        true
    }

    fn apply_effect(&mut self, skill: &str, target: SkillTarget, effect: SkillEffect) {
        let now = self.now_ms;

        // Apply-time hook
        if let Some(velocity) = effect.impulse(target.source_position, target.position) {
            self.events.emit(AbilityEvent::Impulse {
                target: target.entity,
                velocity,
            });
        }
        // An impulse without a duration has nothing left to track
        if matches!(effect.kind, EffectKind::Impulse { .. }) && effect.duration_ms.is_none() {
            return;
        }

        let expires_at = effect.duration_ms.map(|d| now + d);
        let list = self.active.entry(target.entity).or_default();
        let stacks = match list.iter_mut().find(|a| a.matches(skill, &effect.id)) {
            Some(existing) => {
                existing.stacks = (existing.stacks + 1).min(existing.effect.max_stacks);
                existing.expires_at = expires_at;
                existing.source = target.source;
                existing.stacks
            }
            None => {
                let next_tick_at = effect.tick_interval_ms().map(|i| now + i);
                list.push(ActiveEffect {
                    skill: skill.to_string(),
                    effect: effect.clone(),
                    source: target.source,
                    stacks: 1,
                    expires_at,
                    next_tick_at,
                });
                1
            }
        };

        self.events.emit(AbilityEvent::EffectApplied {
            target: target.entity,
            skill: skill.to_string(),
            effect: effect.id,
            stacks,
        });
    }

    pub fn cooldown_remaining_ms(&self, id: &str) -> f64 {
        self.cooldowns.remaining_ms(id)
    }

    pub fn cooldown_progress(&self, id: &str) -> f64 {
        self.cooldowns.progress(id)
    }

    pub fn reduce_cooldown(&mut self, id: &str, amount_ms: f64) {
        self.cooldowns.reduce(id, amount_ms);
    }

    pub fn reset_cooldown(&mut self, id: &str) {
        self.cooldowns.reset(id);
    }

    /// Direct access for cooldown UI subscriptions
    pub fn cooldowns_mut(&mut self) -> &mut CooldownTracker {
        &mut self.cooldowns
    }

    // === Per-tick ===

    /// Advance cooldowns, fire periodic ticks, expire timed effects
    pub fn update(&mut self, dt: f32) {
        self.now_ms += secs_to_ms(dt);
        let now = self.now_ms;

        self.cooldowns.update(dt);
        for event in self.cooldowns.drain_events() {
            if let CooldownEvent::End { skill } = event {
                self.events.emit(AbilityEvent::SkillReady { skill });
            }
        }

        let mut fired = Vec::new();
        for (&target, list) in self.active.iter_mut() {
            for active in list.iter_mut() {
                let Some(interval) = active.effect.tick_interval_ms() else {
                    continue;
                };
                while let Some(tick_at) = active.next_tick_at {
                    let within_life = active.expires_at.is_none_or(|end| tick_at <= end);
                    if tick_at > now || !within_life {
                        break;
                    }
                    fired.push(AbilityEvent::EffectTick {
                        target,
                        source: active.source,
                        effect: active.effect.clone(),
                        stacks: active.stacks,
                    });
                    active.next_tick_at = Some(tick_at + interval);
                }
            }

            list.retain(|active| {
                let expired = active.expires_at.is_some_and(|end| end <= now);
                if expired {
                    fired.push(AbilityEvent::EffectRemoved {
                        target,
                        skill: active.skill.clone(),
                        effect: active.effect.id.clone(),
                    });
                }
                !expired
            });
        }
        self.active.retain(|_, list| !list.is_empty());

        for event in fired {
            self.events.emit(event);
        }
    }

    // === Active effects ===

    pub fn active_effects(&self, target: EntityId) -> &[ActiveEffect] {
        self.active.get(&target).map_or(&[], Vec::as_slice)
    }

    /// Removing an absent effect is a no-op
    pub fn remove_effect(&mut self, target: EntityId, skill: &str, effect_id: &str) -> bool {
        let Some(list) = self.active.get_mut(&target) else {
            return false;
        };
        let Some(index) = list.iter().position(|a| a.matches(skill, effect_id)) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            self.active.remove(&target);
        }
        self.events.emit(AbilityEvent::EffectRemoved {
            target,
            skill: skill.to_string(),
            effect: effect_id.to_string(),
        });
        true
    }

    /// Drop every effect on a target (e.g. on death)
    pub fn clear_target(&mut self, target: EntityId) {
        let Some(list) = self.active.remove(&target) else {
            return;
        };
        for active in list {
            self.events.emit(AbilityEvent::EffectRemoved {
                target,
                skill: active.skill,
                effect: active.effect.id,
            });
        }
    }

    /// Stat modifiers folded over `base` in application order
    pub fn effective_stats(&self, target: EntityId, base: CharacterStats) -> CharacterStats {
        self.active_effects(target)
            .iter()
            .fold(base, |stats, a| a.effect.modify_stats(stats, a.stacks))
    }

    pub fn modify_damage(&self, target: EntityId, result: DamageResult) -> DamageResult {
        self.active_effects(target)
            .iter()
            .fold(result, |r, a| a.effect.modify_damage(r))
    }

    /// Teardown: forget every pending expiry and cooldown without events
    pub fn cancel_all(&mut self) {
        self.active.clear();
        self.cooldowns.reset_all();
        self.cooldowns.drain_events();
    }

    pub fn pending_effect_count(&self) -> usize {
        self.active.values().map(Vec::len).sum()
    }

    pub fn on(
        &mut self,
        kind: AbilityEventKind,
        handler: impl FnMut(&AbilityEvent) + 'static,
    ) -> HandlerId {
        self.events.on(kind, handler)
    }

    pub fn drain_events(&mut self) -> Vec<AbilityEvent> {
        self.events.drain()
    }
}
