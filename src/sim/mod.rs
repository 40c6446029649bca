//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies

pub mod combat;
pub mod cooldown;
pub mod effects;
pub mod events;
pub mod exp_sources;
pub mod perf;
pub mod pickups;
pub mod pool;
pub mod progression;
pub mod skills;
pub mod state;
pub mod stats;
pub mod tick;
pub mod wave;

pub use combat::{CombatEvent, CombatEventKind, CombatRegistry, CombatStats, EntityId};
pub use cooldown::{CooldownEvent, CooldownEventKind, CooldownTracker};
pub use effects::{EffectKind, SkillEffect, StatOp};
pub use events::{Dispatcher, HandlerId, SimEvent};
pub use exp_sources::{ExpSource, ExpSourceKind, ExpSourceRegistry};
pub use perf::{Bounds, BoundsProvider, FixedBounds, FrameRateMonitor, PerformanceSignal};
pub use pickups::{
    DropTable, Essence, EssenceEvent, EssenceEventKind, EssenceField, EssenceId, EssenceTier,
    EssenceTierConfig,
};
pub use pool::{EnemyPool, PooledEnemy};
pub use progression::{
    LevelConfig, Progression, ProgressionEvent, ProgressionEventKind, Rewards,
    validate_level_table,
};
pub use skills::{
    AbilityEvent, AbilityEventKind, AbilitySystem, ActiveEffect, LinearScaling, ScalingStat,
    SkillDef, SkillLibrary, SkillTarget, UnlockedSkill,
};
pub use state::{SimPhase, Simulation};
pub use stats::{CharacterStats, DamageResult, StatKind, StatSheet};
pub use tick::{TickInput, tick};
pub use wave::{
    EliteConfig, EnemyArchetype, EnemyKind, SpawnState, StatMultipliers, WaveConfig,
    WaveDirector, WaveEvent, WaveEventKind, WaveState, WeightedKind, select_enemy_kind,
    validate_waves,
};
