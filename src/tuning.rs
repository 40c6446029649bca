//! Game balance tables
//!
//! Static data handed to the simulation at startup. `Tuning::default()` is
//! the shipped balance; a JSON file may override any table.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::MAX_LEVEL;
use crate::error::ConfigError;
use crate::sim::{
    DropTable, EffectKind, EliteConfig, EnemyArchetype, EnemyKind, EssenceTier,
    EssenceTierConfig, ExpSource, ExpSourceKind, LevelConfig, LinearScaling, ScalingStat,
    SkillDef, SkillEffect, SkillLibrary, StatKind, StatMultipliers, StatOp, StatSheet, WaveConfig,
    WeightedKind, validate_level_table, validate_waves,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub archetypes: BTreeMap<EnemyKind, EnemyArchetype>,
    pub drops: BTreeMap<EnemyKind, DropTable>,
    pub essence_tiers: BTreeMap<EssenceTier, EssenceTierConfig>,
    pub waves: Vec<WaveConfig>,
    pub levels: Vec<LevelConfig>,
    pub exp_sources: Vec<ExpSource>,
    pub skills: Vec<SkillDef>,
    pub stat_sheet: StatSheet,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            archetypes: default_archetypes(),
            drops: default_drops(),
            essence_tiers: default_essence_tiers(),
            waves: default_waves(),
            levels: default_levels(),
            exp_sources: default_exp_sources(),
            skills: default_skills(),
            stat_sheet: StatSheet::default(),
        }
    }
}

impl Tuning {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let tuning: Self = serde_json::from_str(json)?;
        tuning.validate()?;
        Ok(tuning)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let tuning = Self::from_json(&std::fs::read_to_string(path)?)?;
        log::info!("Loaded tuning from {}", path.display());
        Ok(tuning)
    }

    /// Check every table the simulation would otherwise reject at construction
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_waves(&self.waves, &self.archetypes)?;
        validate_level_table(&self.levels)?;
        self.skill_library().map(|_| ())
    }

    pub fn skill_library(&self) -> Result<SkillLibrary, ConfigError> {
        SkillLibrary::new(self.skills.clone())
    }
}

fn archetype(health: f32, damage: f32, attack_speed: f32, range: f32, move_speed: f32) -> EnemyArchetype {
    EnemyArchetype {
        health,
        damage,
        attack_speed,
        range,
        move_speed,
    }
}

fn default_archetypes() -> BTreeMap<EnemyKind, EnemyArchetype> {
    BTreeMap::from([
        (EnemyKind::Basic, archetype(100.0, 10.0, 1.0, 50.0, 100.0)),
        (EnemyKind::Fast, archetype(60.0, 8.0, 1.5, 40.0, 150.0)),
        (EnemyKind::Tank, archetype(200.0, 15.0, 0.7, 45.0, 70.0)),
        (EnemyKind::Ranged, archetype(80.0, 12.0, 0.8, 150.0, 90.0)),
        (EnemyKind::Boss, archetype(1000.0, 30.0, 0.5, 100.0, 60.0)),
    ])
}

fn drop_table(tier: EssenceTier, drop_rate: f32, max_drops: u32) -> DropTable {
    DropTable {
        tier,
        drop_rate,
        max_drops,
    }
}

fn default_drops() -> BTreeMap<EnemyKind, DropTable> {
    BTreeMap::from([
        (EnemyKind::Basic, drop_table(EssenceTier::Small, 0.7, 1)),
        (EnemyKind::Fast, drop_table(EssenceTier::Small, 0.8, 2)),
        (EnemyKind::Tank, drop_table(EssenceTier::Medium, 0.9, 2)),
        (EnemyKind::Ranged, drop_table(EssenceTier::Medium, 0.85, 2)),
        (EnemyKind::Boss, drop_table(EssenceTier::Boss, 1.0, 5)),
    ])
}

fn default_essence_tiers() -> BTreeMap<EssenceTier, EssenceTierConfig> {
    let tier = |exp, lifetime_ms, radius| EssenceTierConfig {
        exp,
        lifetime_ms,
        radius,
    };
    BTreeMap::from([
        (EssenceTier::Small, tier(10, 10_000.0, 20.0)),
        (EssenceTier::Medium, tier(25, 15_000.0, 25.0)),
        (EssenceTier::Large, tier(50, 20_000.0, 30.0)),
        (EssenceTier::Boss, tier(200, 30_000.0, 40.0)),
    ])
}

fn weighted(entries: &[(EnemyKind, f32)]) -> Vec<WeightedKind> {
    entries
        .iter()
        .map(|&(kind, weight)| WeightedKind { kind, weight })
        .collect()
}

fn multipliers(health: f32, damage: f32, speed: f32) -> StatMultipliers {
    StatMultipliers {
        health,
        damage,
        speed,
    }
}

fn default_waves() -> Vec<WaveConfig> {
    use EnemyKind::*;
    vec![
        WaveConfig {
            duration_ms: 60_000.0,
            spawn_interval_ms: 2000.0,
            enemy_count: 20,
            enemy_types: weighted(&[(Basic, 1.0)]),
            elite: None,
            stats: multipliers(1.0, 1.0, 1.0),
        },
        WaveConfig {
            duration_ms: 90_000.0,
            spawn_interval_ms: 1500.0,
            enemy_count: 40,
            enemy_types: weighted(&[(Basic, 0.7), (Fast, 0.3)]),
            elite: Some(EliteConfig {
                chance: 0.1,
                multipliers: multipliers(2.5, 1.5, 1.2),
            }),
            stats: multipliers(1.2, 1.1, 1.1),
        },
        WaveConfig {
            duration_ms: 120_000.0,
            spawn_interval_ms: 1200.0,
            enemy_count: 60,
            enemy_types: weighted(&[(Basic, 0.4), (Fast, 0.3), (Tank, 0.2), (Ranged, 0.1)]),
            elite: Some(EliteConfig {
                chance: 0.15,
                multipliers: multipliers(2.5, 1.5, 1.2),
            }),
            stats: multipliers(1.5, 1.2, 1.15),
        },
        WaveConfig {
            duration_ms: 120_000.0,
            spawn_interval_ms: 1000.0,
            enemy_count: 80,
            enemy_types: weighted(&[
                (Basic, 0.3),
                (Fast, 0.25),
                (Tank, 0.2),
                (Ranged, 0.2),
                (Boss, 0.05),
            ]),
            elite: Some(EliteConfig {
                chance: 0.2,
                multipliers: multipliers(3.0, 1.8, 1.3),
            }),
            stats: multipliers(2.0, 1.4, 1.2),
        },
    ]
}

fn default_levels() -> Vec<LevelConfig> {
    let mut levels = LevelConfig::standard_table(MAX_LEVEL);
    if let Some(second) = levels.get_mut(1) {
        second.rewards.unlocks.push("basic_breath".to_string());
    }
    levels
}

fn default_exp_sources() -> Vec<ExpSource> {
    let mut elite = ExpSource::new("kill_elite", ExpSourceKind::Kill, 50);
    elite.multiplier = 1.2;

    let mut boss = ExpSource::new("kill_boss", ExpSourceKind::Kill, 200);
    boss.multiplier = 1.5;
    boss.cooldown_ms = Some(3_600_000);

    let mut daily = ExpSource::new("quest_daily", ExpSourceKind::Quest, 100);
    daily.max_per_day = Some(5);

    let mut weekly = ExpSource::new("quest_weekly", ExpSourceKind::Quest, 500);
    weekly.max_per_day = Some(1);

    let mut explore = ExpSource::new("explore_newarea", ExpSourceKind::Exploration, 150);
    explore.level_requirement = 5;

    vec![
        ExpSource::new("kill_normal", ExpSourceKind::Kill, 10),
        elite,
        boss,
        daily,
        weekly,
        explore,
    ]
}

fn scaling(entries: &[(ScalingStat, f32, f32)]) -> BTreeMap<ScalingStat, LinearScaling> {
    entries
        .iter()
        .map(|&(stat, base, per_level)| (stat, LinearScaling { base, per_level }))
        .collect()
}

fn skill(
    id: &str,
    name: &str,
    description: &str,
    max_level: u32,
    base_cooldown_ms: f64,
) -> SkillDef {
    SkillDef {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        max_level,
        base_cooldown_ms,
        effects: Vec::new(),
        scaling: BTreeMap::new(),
        prerequisites: Vec::new(),
        required_level: 1,
    }
}

fn burning() -> SkillEffect {
    SkillEffect::new(
        "burning",
        "Burning",
        EffectKind::PeriodicTick {
            interval_ms: 1000.0,
            health_fraction: 0.05,
        },
    )
    .with_duration(5000.0)
}

fn default_skills() -> Vec<SkillDef> {
    use ScalingStat::*;

    let mut basic_breath = skill(
        "basic_breath",
        "Hatchling Breath",
        "Breathes a line of fire that damages enemies in its path",
        8,
        2000.0,
    );
    basic_breath.scaling = scaling(&[(Damage, 10.0, 5.0), (Range, 100.0, 20.0)]);

    let mut spread_breath = skill(
        "spread_breath",
        "Spread Breath",
        "A fan of fire that burns and pushes back enemies",
        5,
        3000.0,
    );
    spread_breath.effects = vec![
        burning(),
        SkillEffect::new("breath_knock", "Breath Impact", EffectKind::Impulse { force: 50.0 }),
    ];
    spread_breath.prerequisites = vec!["basic_breath".into()];
    spread_breath.required_level = 3;

    let mut elemental_breath = skill(
        "elemental_breath",
        "Elemental Breath",
        "Breath infused with elemental power that also hardens scales",
        5,
        4000.0,
    );
    elemental_breath.effects = vec![
        burning(),
        SkillEffect::new(
            "elemental_defense",
            "Elemental Guard",
            EffectKind::StatModifier {
                stat: StatKind::Defense,
                op: StatOp::Add(10.0),
            },
        )
        .with_duration(5000.0),
        SkillEffect::new(
            "elemental_shield",
            "Elemental Shield",
            EffectKind::DamageModifier {
                reduction_bonus: 0.1,
                reduction_cap: 0.75,
            },
        )
        .with_duration(5000.0),
    ];
    elemental_breath.prerequisites = vec!["spread_breath".into()];
    elemental_breath.required_level = 5;

    let mut wing_slash = skill(
        "wing_slash",
        "Wing Slash",
        "Sweeps nearby enemies away with a wing strike",
        5,
        3000.0,
    );
    wing_slash.scaling = scaling(&[(Knockback, 50.0, 10.0)]);

    let mut whirlwind = skill(
        "whirlwind",
        "Whirlwind",
        "Spins into a tornado that keeps damaging nearby enemies",
        5,
        8000.0,
    );
    whirlwind.prerequisites = vec!["wing_slash".into()];
    whirlwind.required_level = 4;

    let mut scale_armor = skill(
        "scale_armor",
        "Scale Armor",
        "Raises defense and health",
        5,
        0.0,
    );
    scale_armor.scaling = scaling(&[(Defense, 0.0, 5.0), (Health, 0.0, 20.0)]);

    let mut scale_reflection = skill(
        "scale_reflection",
        "Scale Reflection",
        "Reflects part of the damage taken",
        5,
        0.0,
    );
    scale_reflection.scaling = scaling(&[(Reflection, 0.1, 0.05)]);
    scale_reflection.prerequisites = vec!["scale_armor".into()];
    scale_reflection.required_level = 3;

    vec![
        basic_breath,
        spread_breath,
        elemental_breath,
        wing_slash,
        whirlwind,
        scale_armor,
        scale_reflection,
    ]
}
