//! Wave director: timed wave progression and pooled enemy spawning
//!
//! Delta time is the only clock. Wave-local timers reset on each transition
//! and the configuration index sticks at the last entry once the list runs out.

use std::collections::BTreeMap;

use glam::Vec2;
use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::combat::{CombatRegistry, CombatStats, EntityId};
use super::events::{Dispatcher, HandlerId, SimEvent};
use super::perf::{Bounds, BoundsProvider, PerformanceSignal};
use super::pool::{EnemyPool, PooledEnemy};
use crate::error::ConfigError;
use crate::secs_to_ms;
use crate::settings::SimSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyKind {
    Basic,
    Fast,
    Tank,
    Ranged,
    Boss,
}

impl EnemyKind {
    pub const ALL: [EnemyKind; 5] = [
        EnemyKind::Basic,
        EnemyKind::Fast,
        EnemyKind::Tank,
        EnemyKind::Ranged,
        EnemyKind::Boss,
    ];
}

/// Base combat numbers for one enemy kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnemyArchetype {
    pub health: f32,
    pub damage: f32,
    /// Attacks per second
    pub attack_speed: f32,
    /// Targeting radius in world units
    pub range: f32,
    /// Units per second
    pub move_speed: f32,
}

impl EnemyArchetype {
    /// Health, damage and move speed scale; attack speed and range do not
    pub fn combat_stats(
        &self,
        wave: &StatMultipliers,
        elite: Option<&StatMultipliers>,
    ) -> CombatStats {
        let elite = elite.copied().unwrap_or_default();
        CombatStats {
            health: self.health * wave.health * elite.health,
            damage: self.damage * wave.damage * elite.damage,
            attack_speed: self.attack_speed,
            range: self.range,
            move_speed: self.move_speed * wave.speed * elite.speed,
            is_player: false,
        }
    }
}

/// Factors applied on top of an archetype's base numbers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatMultipliers {
    pub health: f32,
    pub damage: f32,
    pub speed: f32,
}

impl Default for StatMultipliers {
    fn default() -> Self {
        Self {
            health: 1.0,
            damage: 1.0,
            speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EliteConfig {
    /// Probability in [0, 1]
    pub chance: f32,
    pub multipliers: StatMultipliers,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedKind {
    pub kind: EnemyKind,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveConfig {
    /// Time until the next wave starts
    pub duration_ms: f64,
    /// Baseline time between spawn attempts
    pub spawn_interval_ms: f64,
    /// Live enemy cap while this wave runs
    pub enemy_count: u32,
    /// Weighted draw table for the spawned kind
    pub enemy_types: Vec<WeightedKind>,
    /// Elite roll; `None` means no elites this wave
    #[serde(default)]
    pub elite: Option<EliteConfig>,
    /// Wave-wide scaling for every spawn
    #[serde(default)]
    pub stats: StatMultipliers,
}

/// Reject configurations the director cannot run
pub fn validate_waves(
    waves: &[WaveConfig],
    archetypes: &BTreeMap<EnemyKind, EnemyArchetype>,
) -> Result<(), ConfigError> {
    if waves.is_empty() {
        return Err(ConfigError::NoWaves);
    }
    for (wave, config) in waves.iter().enumerate() {
        if config.enemy_types.is_empty() {
            return Err(ConfigError::EmptyWave { wave });
        }
        let durations_ok = config.duration_ms.is_finite()
            && config.duration_ms > 0.0
            && config.spawn_interval_ms.is_finite()
            && config.spawn_interval_ms > 0.0;
        if !durations_ok {
            return Err(ConfigError::InvalidDuration { wave });
        }
        for entry in &config.enemy_types {
            if !entry.weight.is_finite() || entry.weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    wave,
                    kind: entry.kind,
                    weight: entry.weight,
                });
            }
            if !archetypes.contains_key(&entry.kind) {
                return Err(ConfigError::MissingArchetype(entry.kind));
            }
        }
    }
    Ok(())
}

/// Weighted draw: uniform in [0, total), subtract weights in order until the
/// remainder reaches zero. Zero-weight kinds are never picked unless every
/// weight is zero, in which case the first kind wins.
pub fn select_enemy_kind(types: &[WeightedKind], rng: &mut impl Rng) -> Option<EnemyKind> {
    let first = types.first()?.kind;
    let total: f32 = types.iter().map(|t| t.weight.max(0.0)).sum();
    if total <= 0.0 {
        return Some(first);
    }

    let mut remainder = rng.random::<f32>() * total;
    for entry in types.iter().filter(|t| t.weight > 0.0) {
        remainder -= entry.weight;
        if remainder <= 0.0 {
            return Some(entry.kind);
        }
    }
    Some(
        types
            .iter()
            .find(|t| t.weight > 0.0)
            .map_or(first, |t| t.kind),
    )
}

/// Point `margin` outside a uniformly chosen edge of `bounds`
fn edge_position(bounds: Bounds, margin: f32, rng: &mut impl Rng) -> Vec2 {
    let along_x = bounds.left + rng.random::<f32>() * bounds.width();
    let along_y = bounds.top + rng.random::<f32>() * bounds.height();
    match rng.random_range(0..4u32) {
        0 => Vec2::new(along_x, bounds.top - margin),
        1 => Vec2::new(bounds.right + margin, along_y),
        2 => Vec2::new(along_x, bounds.bottom + margin),
        _ => Vec2::new(bounds.left - margin, along_y),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveState {
    Preparing,
    Spawning,
    Clearing,
    Completed,
}

/// Counters owned by the director. Wave-local fields reset on transition.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpawnState {
    /// 1-based once the first wave starts
    pub wave_number: u32,
    pub wave_elapsed_ms: f64,
    pub since_spawn_ms: f64,
    pub live_enemies: u32,
    /// Interval used on the last update (inflated while throttled)
    pub spawn_interval_ms: f64,
    pub run_elapsed_ms: f64,
    pub spawned_this_wave: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaveEvent {
    WaveStart {
        wave: u32,
    },
    WaveEnd {
        wave: u32,
    },
    Spawn {
        entity: EntityId,
        kind: EnemyKind,
        elite: bool,
        position: Vec2,
    },
    EliteSpawn {
        entity: EntityId,
        kind: EnemyKind,
        wave: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaveEventKind {
    WaveStart,
    WaveEnd,
    Spawn,
    EliteSpawn,
}

impl SimEvent for WaveEvent {
    type Kind = WaveEventKind;

    fn kind(&self) -> WaveEventKind {
        match self {
            WaveEvent::WaveStart { .. } => WaveEventKind::WaveStart,
            WaveEvent::WaveEnd { .. } => WaveEventKind::WaveEnd,
            WaveEvent::Spawn { .. } => WaveEventKind::Spawn,
            WaveEvent::EliteSpawn { .. } => WaveEventKind::EliteSpawn,
        }
    }
}

/// Random stream reserved for spawning, independent of combat rolls
const SPAWN_STREAM: u64 = 0x5eed_0001;

#[derive(Debug)]
pub struct WaveDirector {
    waves: Vec<WaveConfig>,
    archetypes: BTreeMap<EnemyKind, EnemyArchetype>,
    config_index: usize,
    state: WaveState,
    spawn: SpawnState,
    pool: EnemyPool,
    margin: f32,
    throttle_multiplier: f64,
    rng: Pcg32,
    events: Dispatcher<WaveEvent>,
}

impl WaveDirector {
    pub fn new(
        waves: Vec<WaveConfig>,
        archetypes: BTreeMap<EnemyKind, EnemyArchetype>,
        settings: &SimSettings,
    ) -> Result<Self, ConfigError> {
        validate_waves(&waves, &archetypes)?;
        if settings.pool_capacity == 0 {
            return Err(ConfigError::EmptyPool);
        }
        let rng = Pcg32::new(settings.seed, SPAWN_STREAM);
        Ok(Self {
            waves,
            archetypes,
            config_index: 0,
            state: WaveState::Preparing,
            spawn: SpawnState::default(),
            pool: EnemyPool::new(settings.pool_capacity),
            margin: settings.spawn_margin,
            throttle_multiplier: f64::from(settings.throttle_multiplier).max(1.0),
            rng,
            events: Dispatcher::new(),
        })
    }

    /// Index of the configuration whose window contains `elapsed_ms` since
    /// the first wave started. Past the end, the last configuration.
    pub fn wave_at(&self, elapsed_ms: f64) -> usize {
        let mut accumulated = 0.0;
        for (index, wave) in self.waves.iter().enumerate() {
            accumulated += wave.duration_ms;
            if elapsed_ms < accumulated {
                return index;
            }
        }
        self.waves.len().saturating_sub(1)
    }

    // === State machine ===

    /// Preparing/Completed -> Spawning. From Completed the next wave begins.
    pub fn start_wave(&mut self) -> bool {
        match self.state {
            WaveState::Preparing => {
                self.spawn.wave_number = self.spawn.wave_number.max(1);
            }
            WaveState::Completed => self.next_wave_number(),
            WaveState::Spawning | WaveState::Clearing => return false,
        }
        self.reset_wave_local();
        self.state = WaveState::Spawning;
        log::info!("wave {} started", self.spawn.wave_number);
        self.events.emit(WaveEvent::WaveStart {
            wave: self.spawn.wave_number,
        });
        true
    }

    /// Spawning -> Clearing
    pub fn complete_wave(&mut self) -> bool {
        if self.state != WaveState::Spawning {
            return false;
        }
        self.state = WaveState::Clearing;
        self.events.emit(WaveEvent::WaveEnd {
            wave: self.spawn.wave_number,
        });
        true
    }

    /// Clearing -> Completed
    pub fn clear_wave(&mut self) -> bool {
        if self.state != WaveState::Clearing {
            return false;
        }
        self.state = WaveState::Completed;
        true
    }

    /// Back to Preparing at wave 0. Live pooled enemies keep their slots.
    pub fn reset_wave(&mut self) {
        self.state = WaveState::Preparing;
        self.config_index = 0;
        self.spawn = SpawnState {
            live_enemies: self.pool.bound_count() as u32,
            ..SpawnState::default()
        };
    }

    fn next_wave_number(&mut self) {
        self.spawn.wave_number += 1;
        self.config_index = (self.config_index + 1).min(self.waves.len().saturating_sub(1));
    }

    fn reset_wave_local(&mut self) {
        self.spawn.wave_elapsed_ms = 0.0;
        self.spawn.since_spawn_ms = 0.0;
        self.spawn.spawned_this_wave = 0;
    }

    // === Per-tick ===

    /// Advance wave timers and spawn at most one enemy. Only runs while Spawning.
    pub fn update(
        &mut self,
        dt: f32,
        combat: &mut CombatRegistry,
        perf: &dyn PerformanceSignal,
        bounds: &dyn BoundsProvider,
    ) {
        if self.state != WaveState::Spawning {
            return;
        }
        let dt_ms = secs_to_ms(dt);
        self.spawn.wave_elapsed_ms += dt_ms;
        self.spawn.since_spawn_ms += dt_ms;
        self.spawn.run_elapsed_ms += dt_ms;

        let config = &self.waves[self.config_index];
        let baseline = config.spawn_interval_ms;
        let duration = config.duration_ms;

        // Recomputed from the baseline every tick, so throttling never compounds
        self.spawn.spawn_interval_ms = if perf.is_under_performance_target() {
            baseline * self.throttle_multiplier
        } else {
            baseline
        };

        if self.spawn.since_spawn_ms >= self.spawn.spawn_interval_ms {
            self.spawn.since_spawn_ms = 0.0;
            self.try_spawn(combat, bounds.bounds());
        }

        if self.spawn.wave_elapsed_ms >= duration {
            self.advance_wave();
        }
    }

    fn advance_wave(&mut self) {
        let finished = self.spawn.wave_number;
        self.events.emit(WaveEvent::WaveEnd { wave: finished });
        self.next_wave_number();
        self.reset_wave_local();
        log::info!(
            "wave {} finished, wave {} started (config {})",
            finished,
            self.spawn.wave_number,
            self.config_index
        );
        self.events.emit(WaveEvent::WaveStart {
            wave: self.spawn.wave_number,
        });
    }

    /// One spawn attempt. Returns the new entity, or `None` when capped,
    /// the pool is exhausted, or no archetype matches.
    fn try_spawn(&mut self, combat: &mut CombatRegistry, bounds: Bounds) -> Option<EntityId> {
        let config = &self.waves[self.config_index];

        if self.spawn.live_enemies >= config.enemy_count {
            log::trace!(
                "spawn refused: {} live, cap {}",
                self.spawn.live_enemies,
                config.enemy_count
            );
            return None;
        }
        if !self.pool.has_free() {
            log::debug!("spawn skipped: enemy pool exhausted");
            return None;
        }

        let kind = select_enemy_kind(&config.enemy_types, &mut self.rng)?;
        let elite = config
            .elite
            .filter(|elite| self.rng.random::<f32>() < elite.chance);
        let Some(archetype) = self.archetypes.get(&kind) else {
            log::warn!("no archetype for {:?}", kind);
            return None;
        };
        let stats = archetype.combat_stats(&config.stats, elite.as_ref().map(|e| &e.multipliers));
        let position = edge_position(bounds, self.margin, &mut self.rng);
        let is_elite = elite.is_some();

        let entity = combat.next_entity_id();
        if !self.pool.bind(
            entity,
            PooledEnemy {
                kind,
                stats,
                elite: is_elite,
            },
        ) {
            return None;
        }
        combat.register(entity, stats, position);
        self.spawn.live_enemies = self.pool.bound_count() as u32;
        self.spawn.spawned_this_wave += 1;

        log::debug!(
            "spawned {:?}{} {} at ({:.0}, {:.0})",
            kind,
            if is_elite { " (elite)" } else { "" },
            entity,
            position.x,
            position.y
        );
        self.events.emit(WaveEvent::Spawn {
            entity,
            kind,
            elite: is_elite,
            position,
        });
        if is_elite {
            self.events.emit(WaveEvent::EliteSpawn {
                entity,
                kind,
                wave: self.spawn.wave_number,
            });
        }
        Some(entity)
    }

    /// Free the entity's pool slot. `None` for entities the director never spawned.
    pub fn on_enemy_death(&mut self, entity: EntityId) -> Option<PooledEnemy> {
        let released = self.pool.release(entity)?;
        self.spawn.live_enemies = self.pool.bound_count() as u32;
        Some(released)
    }

    // === Queries ===

    pub fn state(&self) -> WaveState {
        self.state
    }

    pub fn wave_number(&self) -> u32 {
        self.spawn.wave_number
    }

    pub fn config_index(&self) -> usize {
        self.config_index
    }

    pub fn current_config(&self) -> &WaveConfig {
        &self.waves[self.config_index]
    }

    /// Fraction of the current wave's duration elapsed, in [0, 1]
    pub fn wave_progress(&self) -> f64 {
        let duration = self.current_config().duration_ms;
        (self.spawn.wave_elapsed_ms / duration).clamp(0.0, 1.0)
    }

    pub fn spawn_state(&self) -> &SpawnState {
        &self.spawn
    }

    pub fn pool(&self) -> &EnemyPool {
        &self.pool
    }

    pub fn archetype(&self, kind: EnemyKind) -> Option<&EnemyArchetype> {
        self.archetypes.get(&kind)
    }

    pub fn on(
        &mut self,
        kind: WaveEventKind,
        handler: impl FnMut(&WaveEvent) + 'static,
    ) -> HandlerId {
        self.events.on(kind, handler)
    }

    pub fn off(&mut self, kind: WaveEventKind, id: HandlerId) -> bool {
        self.events.off(kind, id)
    }

    pub fn drain_events(&mut self) -> Vec<WaveEvent> {
        self.events.drain()
    }
}
