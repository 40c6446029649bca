//! Skill effects
//!
//! One tagged enum covers every effect shape; each variant carries exactly the
//! data its hook needs and callers dispatch on the tag.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::stats::{CharacterStats, DamageResult, StatKind};

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatOp {
    Add(f32),
    Multiply(f32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectKind {
    /// Remaps one effective stat while active
    StatModifier { stat: StatKind, op: StatOp },
    /// Raises damage reduction on incoming hits, never above `reduction_cap`
    DamageModifier {
        reduction_bonus: f32,
        reduction_cap: f32,
    },
    /// Fraction of the target's current health per stack, every `interval_ms`
    PeriodicTick {
        interval_ms: f64,
        health_fraction: f32,
    },
    /// One-shot push away from the effect source on application
    Impulse { force: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEffect {
    pub id: String,
    pub name: String,
    /// `None` = instantaneous / until removed
    #[serde(default)]
    pub duration_ms: Option<f64>,
    #[serde(default = "one")]
    pub max_stacks: u32,
    pub kind: EffectKind,
}

impl SkillEffect {
    pub fn new(id: &str, name: &str, kind: EffectKind) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            duration_ms: None,
            max_stacks: 1,
            kind,
        }
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_max_stacks(mut self, max_stacks: u32) -> Self {
        self.max_stacks = max_stacks.max(1);
        self
    }

    /// Stat modifiers apply once per stack; other kinds leave stats untouched
    pub fn modify_stats(&self, mut stats: CharacterStats, stacks: u32) -> CharacterStats {
        if let EffectKind::StatModifier { stat, op } = self.kind {
            let value = stats.get_mut(stat);
            for _ in 0..stacks {
                match op {
                    StatOp::Add(amount) => *value += amount,
                    StatOp::Multiply(factor) => *value *= factor,
                }
            }
        }
        stats
    }

    pub fn modify_damage(&self, result: DamageResult) -> DamageResult {
        match self.kind {
            EffectKind::DamageModifier {
                reduction_bonus,
                reduction_cap,
            } => {
                let reduction = (result.damage_reduction + reduction_bonus).min(reduction_cap);
                DamageResult::with_reduction(result.raw_damage, result.is_critical, reduction)
            }
            _ => result,
        }
    }

    /// Knockback velocity from `source` through `target`; `None` if they coincide
    pub fn impulse(&self, source: Vec2, target: Vec2) -> Option<Vec2> {
        match self.kind {
            EffectKind::Impulse { force } => crate::direction(source, target).map(|dir| dir * force),
            _ => None,
        }
    }

    pub fn tick_interval_ms(&self) -> Option<f64> {
        match self.kind {
            EffectKind::PeriodicTick { interval_ms, .. } if interval_ms > 0.0 => Some(interval_ms),
            _ => None,
        }
    }

    /// Damage of one periodic tick against a target with `target_health`
    pub fn tick_damage(&self, target_health: f32, stacks: u32) -> f32 {
        match self.kind {
            EffectKind::PeriodicTick {
                health_fraction, ..
            } => (target_health.max(0.0) * health_fraction * stacks as f32).max(0.0),
            _ => 0.0,
        }
    }
}
