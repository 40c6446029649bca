//! Simulation state: one instance of every subsystem plus the run RNG
//!
//! The coordinator owns everything; subsystems never reach each other except
//! through the references `tick` hands them.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::combat::{CombatRegistry, CombatStats, EntityId};
use super::exp_sources::ExpSourceRegistry;
use super::perf::{BoundsProvider, PerformanceSignal};
use super::pickups::{DropTable, EssenceField};
use super::progression::Progression;
use super::skills::{AbilitySystem, ScalingStat, SkillTarget};
use super::stats::{CharacterStats, StatKind, StatSheet, calculate_damage, calculate_move_speed};
use super::wave::{EnemyKind, WaveDirector};
use crate::error::ConfigError;
use crate::settings::SimSettings;
use crate::tuning::Tuning;

/// Run phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimPhase {
    Running,
    /// Player died
    GameOver,
    /// `shutdown` was called; ticks are no-ops
    Stopped,
}

/// Fallback run start so runs without a wall clock stay reproducible
fn default_run_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_default()
}

pub struct Simulation {
    pub(super) combat: CombatRegistry,
    pub(super) waves: WaveDirector,
    pub(super) essences: EssenceField,
    pub(super) progression: Progression,
    pub(super) exp_sources: ExpSourceRegistry,
    pub(super) abilities: AbilitySystem,
    pub(super) stat_sheet: StatSheet,
    pub(super) drops: BTreeMap<EnemyKind, DropTable>,
    pub(super) perf: Box<dyn PerformanceSignal>,
    pub(super) bounds: Box<dyn BoundsProvider>,
    /// Drop rolls and skill crits
    pub(super) rng: Pcg32,
    pub(super) player: EntityId,
    pub(super) player_attack_speed: f32,
    pub(super) player_range: f32,
    /// Knockback velocities waiting for the movement layer
    pub(super) impulses: Vec<(EntityId, Vec2)>,
    pub(super) run_start: NaiveDateTime,
    pub(super) elapsed_ms: f64,
    pub(super) time_ticks: u64,
    pub(super) phase: SimPhase,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("phase", &self.phase)
            .field("time_ticks", &self.time_ticks)
            .field("player", &self.player)
            .field("entities", &self.combat.entity_count())
            .field("wave", &self.waves.wave_number())
            .field("level", &self.progression.level())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Build every subsystem, register the player and start wave 1
    pub fn new(
        settings: &SimSettings,
        tuning: Tuning,
        perf: Box<dyn PerformanceSignal>,
        bounds: Box<dyn BoundsProvider>,
    ) -> Result<Self, ConfigError> {
        let library = tuning.skill_library()?;
        let mut waves = WaveDirector::new(tuning.waves, tuning.archetypes, settings)?;
        let progression = Progression::new(tuning.levels, settings.max_level)?;

        let mut combat = CombatRegistry::new();
        let player = combat.next_entity_id();
        let stats = tuning.stat_sheet.effective();
        combat.register(
            player,
            CombatStats {
                health: stats.health,
                damage: stats.damage,
                attack_speed: settings.player_attack_speed,
                range: settings.player_range,
                move_speed: calculate_move_speed(&stats),
                is_player: true,
            },
            settings.player_start,
        );
        waves.start_wave();

        log::info!(
            "simulation ready: seed {}, wave {}, {} skills",
            settings.seed,
            waves.wave_number(),
            library.len()
        );

        Ok(Self {
            combat,
            waves,
            essences: EssenceField::new(tuning.essence_tiers),
            progression,
            exp_sources: ExpSourceRegistry::new(tuning.exp_sources),
            abilities: AbilitySystem::new(library),
            stat_sheet: tuning.stat_sheet,
            drops: tuning.drops,
            perf,
            bounds,
            rng: Pcg32::seed_from_u64(settings.seed),
            player,
            player_attack_speed: settings.player_attack_speed,
            player_range: settings.player_range,
            impulses: Vec::new(),
            run_start: settings.run_start.unwrap_or_else(default_run_start),
            elapsed_ms: 0.0,
            time_ticks: 0,
            phase: SimPhase::Running,
        })
    }

    /// Wall time inside the run: start plus simulated time
    pub fn now(&self) -> NaiveDateTime {
        self.run_start + Duration::milliseconds(self.elapsed_ms as i64)
    }

    /// Player stats with every active effect folded in
    pub fn player_stats(&self) -> CharacterStats {
        self.abilities
            .effective_stats(self.player, self.stat_sheet.effective())
    }

    // === Player actions ===

    /// Cast an unlocked skill at a live entity. Skills with damage scaling
    /// also hit the target for their scaled damage.
    pub fn use_skill(&mut self, id: &str, target: EntityId) -> bool {
        if self.phase != SimPhase::Running {
            return false;
        }
        let (Some(position), Some(source_position)) =
            (self.combat.position(target), self.combat.position(self.player))
        else {
            return false;
        };
        let cast = SkillTarget {
            entity: target,
            position,
            source: Some(self.player),
            source_position,
        };
        if !self.abilities.use_skill(id, cast) {
            return false;
        }

        if let Some(base) = self.abilities.scaled_value(id, ScalingStat::Damage) {
            let attacker = self.player_stats();
            let defender = self.character_stats(target);
            let hit = calculate_damage(&attacker, &defender, base, &mut self.rng);
            let hit = self.abilities.modify_damage(target, hit);
            self.combat
                .apply_damage(Some(self.player), target, hit.final_damage);
        }
        true
    }

    /// Spend a skill point to unlock `id`, or to upgrade it if already owned
    pub fn invest_skill_point(&mut self, id: &str) -> bool {
        let Some(def) = self.abilities.library().get(id) else {
            return false;
        };
        if self.progression.level() < def.required_level {
            log::debug!(
                "skill {} needs level {}, player is {}",
                id,
                def.required_level,
                self.progression.level()
            );
            return false;
        }
        let possible = match self.abilities.skill_level(id) {
            Some(level) => level < def.max_level,
            None => self.abilities.can_unlock(id),
        };
        if !possible || !self.progression.use_skill_point() {
            return false;
        }
        if self.abilities.is_unlocked(id) {
            self.abilities.upgrade_skill(id)
        } else {
            self.abilities.unlock_skill(id)
        }
    }

    /// Spend a stat point and push the new numbers into the player's combat stats
    pub fn invest_stat_point(&mut self, stat: StatKind) -> bool {
        if !self.stat_sheet.can_add_stat_point(stat) || !self.progression.use_stat_point() {
            return false;
        }
        let before = self.stat_sheet.effective().health;
        self.stat_sheet.add_stat_point(stat, 1);
        let gained_health = self.stat_sheet.effective().health - before;
        if gained_health > 0.0 {
            self.combat
                .update_entity_stats(self.player, |s| s.health += gained_health);
        }
        self.sync_player_stats();
        true
    }

    /// Remove an enemy without a death: no drops, no experience. Its pool
    /// slot is freed and effects aimed at it are dropped. The player cannot
    /// be despawned.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        if id == self.player || !self.combat.remove_entity(id) {
            return false;
        }
        if self.waves.on_enemy_death(id).is_none() {
            log::debug!("despawned {} held no pool slot", id);
        }
        self.abilities.clear_target(id);
        true
    }

    /// Stop the run: drop pending effect expiries and cooldowns
    pub fn shutdown(&mut self) {
        if self.phase == SimPhase::Stopped {
            return;
        }
        self.abilities.cancel_all();
        self.impulses.clear();
        self.phase = SimPhase::Stopped;
        log::info!(
            "simulation stopped after {} ticks ({:.1}s)",
            self.time_ticks,
            self.elapsed_ms / 1000.0
        );
    }

    /// Knockback velocities produced since the last call
    pub fn take_impulses(&mut self) -> Vec<(EntityId, Vec2)> {
        std::mem::take(&mut self.impulses)
    }

    pub(super) fn character_stats(&self, id: EntityId) -> CharacterStats {
        if id == self.player {
            return self.player_stats();
        }
        self.combat
            .stats(id)
            .map(|s| CharacterStats {
                health: s.health,
                damage: s.damage,
                speed: s.move_speed,
                ..CharacterStats::default()
            })
            .unwrap_or_default()
    }

    /// Damage, move speed, attack speed and range follow the sheet and active
    /// effects. Health is left alone: it is the live pool.
    pub(super) fn sync_player_stats(&mut self) {
        let stats = self.player_stats();
        let attack_speed = self.player_attack_speed;
        let range = self.player_range;
        self.combat.update_entity_stats(self.player, |s| {
            s.damage = stats.damage;
            s.move_speed = calculate_move_speed(&stats);
            s.attack_speed = attack_speed;
            s.range = range;
        });
    }

    // === Accessors ===

    pub fn phase(&self) -> SimPhase {
        self.phase
    }

    pub fn player_id(&self) -> EntityId {
        self.player
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn time_ticks(&self) -> u64 {
        self.time_ticks
    }

    pub fn combat(&self) -> &CombatRegistry {
        &self.combat
    }

    pub fn combat_mut(&mut self) -> &mut CombatRegistry {
        &mut self.combat
    }

    pub fn waves(&self) -> &WaveDirector {
        &self.waves
    }

    pub fn waves_mut(&mut self) -> &mut WaveDirector {
        &mut self.waves
    }

    pub fn essences(&self) -> &EssenceField {
        &self.essences
    }

    pub fn essences_mut(&mut self) -> &mut EssenceField {
        &mut self.essences
    }

    pub fn progression(&self) -> &Progression {
        &self.progression
    }

    pub fn progression_mut(&mut self) -> &mut Progression {
        &mut self.progression
    }

    pub fn abilities(&self) -> &AbilitySystem {
        &self.abilities
    }

    pub fn abilities_mut(&mut self) -> &mut AbilitySystem {
        &mut self.abilities
    }

    pub fn exp_sources(&self) -> &ExpSourceRegistry {
        &self.exp_sources
    }

    pub fn stat_sheet(&self) -> &StatSheet {
        &self.stat_sheet
    }
}
