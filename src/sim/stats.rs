//! Character stats and the pure damage/healing/speed formulas
//!
//! Defense reduces damage by `defense / (defense + 100)`. The stat sheet
//! tracks base, bonus (bought with stat points) and hard caps.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Absolute cap on move speed returned by `calculate_move_speed`
pub const MOVE_SPEED_CAP: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Health,
    Damage,
    Speed,
    Defense,
    CritChance,
    CritDamage,
}

impl StatKind {
    pub const ALL: [StatKind; 6] = [
        StatKind::Health,
        StatKind::Damage,
        StatKind::Speed,
        StatKind::Defense,
        StatKind::CritChance,
        StatKind::CritDamage,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CharacterStats {
    pub health: f32,
    pub damage: f32,
    pub speed: f32,
    pub defense: f32,
    pub crit_chance: f32,
    pub crit_damage: f32,
}

impl CharacterStats {
    pub fn get(&self, stat: StatKind) -> f32 {
        match stat {
            StatKind::Health => self.health,
            StatKind::Damage => self.damage,
            StatKind::Speed => self.speed,
            StatKind::Defense => self.defense,
            StatKind::CritChance => self.crit_chance,
            StatKind::CritDamage => self.crit_damage,
        }
    }

    pub fn get_mut(&mut self, stat: StatKind) -> &mut f32 {
        match stat {
            StatKind::Health => &mut self.health,
            StatKind::Damage => &mut self.damage,
            StatKind::Speed => &mut self.speed,
            StatKind::Defense => &mut self.defense,
            StatKind::CritChance => &mut self.crit_chance,
            StatKind::CritDamage => &mut self.crit_damage,
        }
    }

    /// Field-wise sum
    pub fn plus(&self, other: &CharacterStats) -> CharacterStats {
        let mut out = *self;
        for stat in StatKind::ALL {
            *out.get_mut(stat) += other.get(stat);
        }
        out
    }
}

/// Outcome of one damage calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageResult {
    /// Damage before defense
    pub raw_damage: f32,
    pub final_damage: f32,
    pub is_critical: bool,
    /// Fraction of raw damage removed by defense (0..1)
    pub damage_reduction: f32,
}

impl DamageResult {
    /// Recompute the final damage from raw damage after the reduction changed
    pub fn with_reduction(raw: f32, is_critical: bool, damage_reduction: f32) -> Self {
        Self {
            raw_damage: raw,
            final_damage: (raw * (1.0 - damage_reduction)).max(0.0).round(),
            is_critical,
            damage_reduction,
        }
    }
}

/// Defense-only reduction fraction
#[inline]
pub fn damage_reduction(defense: f32) -> f32 {
    let defense = defense.max(0.0);
    defense / (defense + 100.0)
}

/// Damage dealt by `attacker` to `defender` with `base_damage` on top of the attacker's damage stat
pub fn calculate_damage(
    attacker: &CharacterStats,
    defender: &CharacterStats,
    base_damage: f32,
    rng: &mut impl Rng,
) -> DamageResult {
    let is_critical = rng.random::<f32>() < attacker.crit_chance;
    let mut raw = base_damage + attacker.damage;
    if is_critical {
        raw *= attacker.crit_damage;
    }
    DamageResult::with_reduction(raw, is_critical, damage_reduction(defender.defense))
}

/// Healing scales with the healer's health pool
pub fn calculate_healing(healer: &CharacterStats, base_healing: f32) -> f32 {
    let multiplier = 1.0 + healer.health / 1000.0;
    (base_healing * multiplier).round()
}

pub fn calculate_move_speed(stats: &CharacterStats) -> f32 {
    stats.speed.min(MOVE_SPEED_CAP)
}

/// Player attribute sheet: base + bonus, capped per stat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatSheet {
    base: CharacterStats,
    bonus: CharacterStats,
    max: CharacterStats,
    /// Bonus gained per stat point spent
    per_point: CharacterStats,
}

impl Default for StatSheet {
    fn default() -> Self {
        Self::new(
            CharacterStats {
                health: 100.0,
                damage: 10.0,
                speed: 3.0,
                defense: 5.0,
                crit_chance: 0.05,
                crit_damage: 1.5,
            },
            CharacterStats {
                health: 1000.0,
                damage: 100.0,
                speed: 10.0,
                defense: 50.0,
                crit_chance: 0.5,
                crit_damage: 3.0,
            },
            CharacterStats {
                health: 10.0,
                damage: 2.0,
                speed: 0.1,
                defense: 1.0,
                crit_chance: 0.01,
                crit_damage: 0.1,
            },
        )
    }
}

impl StatSheet {
    pub fn new(base: CharacterStats, max: CharacterStats, per_point: CharacterStats) -> Self {
        Self {
            base,
            bonus: CharacterStats::default(),
            max,
            per_point,
        }
    }

    pub fn effective(&self) -> CharacterStats {
        self.base.plus(&self.bonus)
    }

    pub fn base(&self, stat: StatKind) -> f32 {
        self.base.get(stat)
    }

    pub fn bonus(&self, stat: StatKind) -> f32 {
        self.bonus.get(stat)
    }

    pub fn max(&self, stat: StatKind) -> f32 {
        self.max.get(stat)
    }

    fn would_fit(&self, stat: StatKind, points: u32) -> bool {
        let candidate = self.bonus.get(stat) + points as f32 * self.per_point.get(stat);
        // Small epsilon so float accumulation does not lock out the last point
        self.base.get(stat) + candidate <= self.max.get(stat) + 1e-4
    }

    pub fn can_add_stat_point(&self, stat: StatKind) -> bool {
        self.would_fit(stat, 1)
    }

    /// Spend `points` on `stat`. Refused when zero points or over the cap.
    pub fn add_stat_point(&mut self, stat: StatKind, points: u32) -> bool {
        if points == 0 || !self.would_fit(stat, points) {
            log::debug!("stat point refused: {:?} +{}", stat, points);
            return false;
        }
        *self.bonus.get_mut(stat) += points as f32 * self.per_point.get(stat);
        true
    }

    /// Current value as a fraction of the cap
    pub fn progress(&self, stat: StatKind) -> f32 {
        let max = self.max.get(stat);
        if max <= 0.0 {
            return 1.0;
        }
        self.effective().get(stat) / max
    }

    pub fn reset(&mut self) {
        self.bonus = CharacterStats::default();
    }
}
