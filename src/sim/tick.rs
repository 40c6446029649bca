//! Fixed timestep simulation tick
//!
//! One call advances every subsystem in a fixed order and routes their
//! events to each other:
//!
//! 1. input (positions, skill casts, frame timing)
//! 2. wave spawning
//! 3. combat targeting and attacks
//! 4. essence expiry and collection
//! 5. fan-out of combat, essence, progression and wave events
//! 6. ability cooldowns and effects, then their fan-out
//!
//! Fan-out works on a snapshot: events raised while handling another event
//! are delivered on the next tick.

use glam::Vec2;

use super::combat::{CombatEvent, EntityId};
use super::perf::PerformanceSignal;
use super::pickups::EssenceEvent;
use super::progression::ProgressionEvent;
use super::skills::AbilityEvent;
use super::state::{SimPhase, Simulation};
use super::stats::{DamageResult, damage_reduction};
use super::wave::EnemyKind;

/// Input commands for a single tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// New player position from the movement layer
    pub player_position: Option<Vec2>,
    /// New positions for any other entities
    pub positions: Vec<(EntityId, Vec2)>,
    /// Skills to cast this tick, with their targets
    pub skill_casts: Vec<(String, EntityId)>,
    /// Measured frame time, fed to the spawn throttle
    pub frame_ms: Option<f64>,
}

/// Advance the simulation by one fixed timestep
pub fn tick(sim: &mut Simulation, input: &TickInput, dt: f32) {
    if sim.phase != SimPhase::Running {
        return;
    }

    // Movement and player commands
    let player = sim.player;
    if let Some(position) = input.player_position {
        sim.combat.update_position(player, position);
    }
    for &(id, position) in &input.positions {
        sim.combat.update_position(id, position);
    }
    if let Some(frame_ms) = input.frame_ms {
        sim.perf.sample(frame_ms);
    }
    for (skill, target) in &input.skill_casts {
        if !sim.use_skill(skill, *target) {
            log::debug!("cast of {} at {} refused", skill, target);
        }
    }

    sim.waves
        .update(dt, &mut sim.combat, sim.perf.as_ref(), sim.bounds.as_ref());
    sim.combat.update(dt);
    sim.essences.update(dt, &sim.combat);

    fan_out(sim);

    sim.abilities.update(dt);
    fan_out_abilities(sim);

    sim.sync_player_stats();
    sim.elapsed_ms += crate::secs_to_ms(dt);
    sim.time_ticks += 1;
}

fn kill_source(kind: EnemyKind, elite: bool) -> &'static str {
    if kind == EnemyKind::Boss {
        "kill_boss"
    } else if elite {
        "kill_elite"
    } else {
        "kill_normal"
    }
}

/// Route combat, essence, progression and wave events to the other subsystems
fn fan_out(sim: &mut Simulation) {
    let combat_events = sim.combat.drain_events();
    let essence_events = sim.essences.drain_events();
    let progression_events = sim.progression.drain_events();
    // Wave events only have external listeners
    sim.waves.drain_events();

    for event in combat_events {
        let CombatEvent::Death {
            entity,
            killer,
            position,
            was_player,
        } = event
        else {
            continue;
        };
        sim.abilities.clear_target(entity);

        if was_player {
            log::info!(
                "player died on wave {} at level {}",
                sim.waves.wave_number(),
                sim.progression.level()
            );
            sim.phase = SimPhase::GameOver;
            continue;
        }

        // Entities the director did not spawn give nothing
        let Some(enemy) = sim.waves.on_enemy_death(entity) else {
            continue;
        };
        if let Some(table) = sim.drops.get(&enemy.kind) {
            sim.essences.roll_drops(table, position, &mut sim.rng);
        }
        if killer == Some(sim.player) {
            let source = kill_source(enemy.kind, enemy.elite);
            let now = sim.now();
            let level = sim.progression.level();
            let amount = sim.exp_sources.grant(source, level, now);
            sim.progression.add_experience(amount);
        }
    }

    for event in essence_events {
        if let EssenceEvent::Collect { exp, .. } = event {
            sim.progression.add_experience(u64::from(exp));
        }
    }

    for event in progression_events {
        if let ProgressionEvent::LevelUp { level, rewards } = event {
            for skill in &rewards.unlocks {
                if !sim.abilities.unlock_skill(skill) {
                    log::debug!("level {} unlock of {} skipped", level, skill);
                }
            }
        }
    }
}

/// Resolve periodic effect damage through the combat registry and queue impulses
fn fan_out_abilities(sim: &mut Simulation) {
    for event in sim.abilities.drain_events() {
        match event {
            AbilityEvent::EffectTick {
                target,
                source,
                effect,
                stacks,
            } => {
                let Some(health) = sim.combat.stats(target).map(|s| s.health) else {
                    continue;
                };
                let defense = sim.character_stats(target).defense;
                let raw = effect.tick_damage(health, stacks);
                let hit = DamageResult::with_reduction(raw, false, damage_reduction(defense));
                let hit = sim.abilities.modify_damage(target, hit);
                sim.combat.apply_damage(source, target, hit.final_damage);
            }
            AbilityEvent::Impulse { target, velocity } => {
                sim.impulses.push((target, velocity));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use crate::settings::SimSettings;
    use crate::sim::combat::CombatStats;
    use crate::sim::perf::{FixedBounds, FrameRateMonitor};
    use crate::sim::pickups::{DropTable, EssenceTier};
    use crate::sim::progression::{LevelConfig, Rewards};
    use crate::sim::stats::StatKind;
    use crate::sim::wave::{WaveConfig, WeightedKind};
    use crate::tuning::Tuning;

    fn simulation(seed: u64, tuning: Tuning) -> Simulation {
        let settings = SimSettings {
            seed,
            ..SimSettings::default()
        };
        Simulation::new(
            &settings,
            tuning,
            Box::new(FrameRateMonitor::default()),
            Box::new(FixedBounds::default()),
        )
        .unwrap()
    }

    /// Default balance with a single wave that never gets to spawn
    fn quiet_tuning() -> Tuning {
        Tuning {
            waves: vec![WaveConfig {
                duration_ms: 600_000.0,
                spawn_interval_ms: 600_000.0,
                enemy_count: 1,
                enemy_types: vec![WeightedKind {
                    kind: EnemyKind::Basic,
                    weight: 1.0,
                }],
                elite: None,
                stats: Default::default(),
            }],
            ..Tuning::default()
        }
    }

    fn dummy(sim: &mut Simulation, health: f32, position: Vec2) -> EntityId {
        let id = sim.combat_mut().next_entity_id();
        sim.combat_mut().register(
            id,
            CombatStats {
                health,
                damage: 0.0,
                attack_speed: 0.0,
                range: 0.0,
                move_speed: 0.0,
                is_player: false,
            },
            position,
        );
        id
    }

    fn run(sim: &mut Simulation, input: &TickInput, ticks: usize) {
        for _ in 0..ticks {
            tick(sim, input, SIM_DT);
        }
    }

    #[test]
    fn test_determinism() {
        // Two runs with the same seed should produce identical results
        let mut sim1 = simulation(99_999, Tuning::default());
        let mut sim2 = simulation(99_999, Tuning::default());

        let input = TickInput {
            frame_ms: Some(16.0),
            ..Default::default()
        };
        run(&mut sim1, &input, 600);
        run(&mut sim2, &input, 600);

        assert_eq!(sim1.time_ticks(), 600);
        assert_eq!(sim1.time_ticks(), sim2.time_ticks());
        assert_eq!(sim1.combat().entity_count(), sim2.combat().entity_count());
        let ids1: Vec<_> = sim1.combat().entity_ids().collect();
        let ids2: Vec<_> = sim2.combat().entity_ids().collect();
        assert_eq!(ids1, ids2);
        for id in ids1 {
            assert_eq!(sim1.combat().position(id), sim2.combat().position(id));
        }
        assert_eq!(sim1.waves().spawn_state(), sim2.waves().spawn_state());
        assert_eq!(sim1.essences().len(), sim2.essences().len());
    }

    #[test]
    fn test_kill_drops_essence_and_grants_experience() {
        let mut tuning = quiet_tuning();
        tuning.waves[0].spawn_interval_ms = 100.0;
        if let Some(basic) = tuning.archetypes.get_mut(&EnemyKind::Basic) {
            basic.health = 5.0;
        }
        tuning.drops.insert(
            EnemyKind::Basic,
            DropTable {
                tier: EssenceTier::Small,
                drop_rate: 1.0,
                max_drops: 1,
            },
        );
        let mut unlock = Rewards::default();
        unlock.unlocks.push("basic_breath".into());
        tuning.levels = vec![
            LevelConfig {
                level: 1,
                exp_required: 0,
                rewards: Rewards::default(),
            },
            LevelConfig {
                level: 2,
                exp_required: 15,
                rewards: unlock,
            },
            LevelConfig {
                level: 3,
                exp_required: 1000,
                rewards: Rewards::default(),
            },
        ];
        let mut sim = simulation(7, tuning);

        let idle = TickInput::default();
        let mut spawned = None;
        for _ in 0..30 {
            tick(&mut sim, &idle, SIM_DT);
            spawned = sim.waves().pool().bound_entities().next();
            if spawned.is_some() {
                break;
            }
        }
        let enemy = spawned.expect("wave should spawn an enemy");

        // Move it next to the player; the player's first swing kills it
        let player_at = sim.combat().player_position().unwrap();
        let close = TickInput {
            positions: vec![(enemy, player_at + Vec2::new(10.0, 0.0))],
            ..Default::default()
        };
        tick(&mut sim, &close, SIM_DT);
        assert!(!sim.combat().has_entity(enemy));

        // Death fan-out, collection, then the level-up unlock
        run(&mut sim, &idle, 4);
        assert_eq!(sim.progression().experience(), 20);
        assert_eq!(sim.progression().level(), 2);
        assert!(sim.abilities().is_unlocked("basic_breath"));
        assert!(sim.essences().is_empty());
    }

    #[test]
    fn test_burn_ticks_through_combat() {
        let mut sim = simulation(1, quiet_tuning());
        assert!(sim.abilities_mut().unlock_skill("basic_breath"));
        assert!(sim.abilities_mut().unlock_skill("spread_breath"));
        let target = dummy(&mut sim, 100.0, Vec2::new(700.0, 300.0));

        let cast = TickInput {
            skill_casts: vec![("spread_breath".into(), target)],
            ..Default::default()
        };
        tick(&mut sim, &cast, SIM_DT);
        assert_eq!(sim.abilities().active_effects(target).len(), 1);

        // Knockback pushes away from the player along +x
        let impulses = sim.take_impulses();
        assert_eq!(impulses.len(), 1);
        assert_eq!(impulses[0].0, target);
        assert!((impulses[0].1 - Vec2::new(50.0, 0.0)).length() < 1e-3);

        run(&mut sim, &TickInput::default(), 60);
        let health = sim.combat().stats(target).unwrap().health;
        assert!((health - 95.0).abs() < 1e-3, "health {health}");
    }

    #[test]
    fn test_skill_damage_hits_target() {
        let mut sim = simulation(3, quiet_tuning());
        assert!(sim.abilities_mut().unlock_skill("basic_breath"));
        let target = dummy(&mut sim, 1000.0, Vec2::new(700.0, 300.0));

        assert!(sim.use_skill("basic_breath", target));
        assert!(!sim.use_skill("basic_breath", target));
        let health = sim.combat().stats(target).unwrap().health;
        // 15 scaled + 10 player damage, or 37.5 on a crit
        assert!(health == 975.0 || health == 962.5, "health {health}");
        assert!(!sim.use_skill("wing_slash", target));
    }

    #[test]
    fn test_shutdown_stops_ticks() {
        let mut sim = simulation(5, quiet_tuning());
        assert!(sim.abilities_mut().unlock_skill("basic_breath"));
        let target = dummy(&mut sim, 1000.0, Vec2::new(700.0, 300.0));
        assert!(sim.use_skill("basic_breath", target));

        sim.shutdown();
        assert_eq!(sim.phase(), SimPhase::Stopped);
        assert_eq!(sim.abilities().cooldown_remaining_ms("basic_breath"), 0.0);

        run(&mut sim, &TickInput::default(), 10);
        assert_eq!(sim.time_ticks(), 0);
        assert!(!sim.use_skill("basic_breath", target));
    }

    #[test]
    fn test_investing_points() {
        let mut sim = simulation(11, quiet_tuning());
        assert!(!sim.invest_stat_point(StatKind::Damage));
        assert!(!sim.invest_skill_point("basic_breath"));

        // Level 3 in the standard table
        sim.progression_mut().add_experience(300);
        assert_eq!(sim.progression().skill_points(), 2);

        assert!(sim.invest_stat_point(StatKind::Damage));
        assert_eq!(sim.combat().stats(sim.player_id()).unwrap().damage, 12.0);
        assert!(sim.invest_stat_point(StatKind::Health));
        assert_eq!(sim.combat().stats(sim.player_id()).unwrap().health, 110.0);

        // Prerequisite missing
        assert!(!sim.invest_skill_point("spread_breath"));
        assert!(sim.invest_skill_point("basic_breath"));
        assert!(sim.invest_skill_point("basic_breath"));
        assert_eq!(sim.abilities().skill_level("basic_breath"), Some(2));
        assert_eq!(sim.progression().skill_points(), 0);
        assert!(!sim.invest_skill_point("wing_slash"));
    }

    #[test]
    fn test_despawn_frees_pool_slots() {
        let mut tuning = quiet_tuning();
        tuning.waves[0].spawn_interval_ms = 100.0;
        tuning.waves[0].enemy_count = 2;
        if let Some(basic) = tuning.archetypes.get_mut(&EnemyKind::Basic) {
            basic.damage = 0.0;
        }
        let settings = SimSettings {
            seed: 17,
            pool_capacity: 2,
            ..SimSettings::default()
        };
        let mut sim = Simulation::new(
            &settings,
            tuning,
            Box::new(FrameRateMonitor::default()),
            Box::new(FixedBounds::default()),
        )
        .unwrap();

        let idle = TickInput::default();
        run(&mut sim, &idle, 30);
        let enemies: Vec<EntityId> = sim.waves().pool().bound_entities().collect();
        assert_eq!(enemies.len(), 2);
        assert_eq!(sim.combat().entity_count(), 3);

        assert!(!sim.despawn(sim.player_id()));
        for &enemy in &enemies {
            assert!(sim.despawn(enemy));
            assert!(!sim.despawn(enemy));
        }
        assert_eq!(sim.waves().pool().free_count(), 2);
        assert_eq!(sim.waves().spawn_state().live_enemies, 0);

        // Spawning picks up again with fresh entities, and nothing was dropped
        run(&mut sim, &idle, 30);
        let respawned: Vec<EntityId> = sim.waves().pool().bound_entities().collect();
        assert_eq!(respawned.len(), 2);
        for id in &respawned {
            assert!(sim.combat().has_entity(*id));
            assert!(!enemies.contains(id));
        }
        assert_eq!(
            sim.waves().pool().bound_count() as u32,
            sim.waves().spawn_state().live_enemies
        );
        assert!(sim.essences().is_empty());
        assert_eq!(sim.progression().experience(), 0);
    }

    #[test]
    fn test_player_death_ends_run() {
        let mut sim = simulation(13, quiet_tuning());
        let player = sim.player_id();
        sim.combat_mut().apply_damage(None, player, 1000.0);

        tick(&mut sim, &TickInput::default(), SIM_DT);
        assert_eq!(sim.phase(), SimPhase::GameOver);
        let ticks = sim.time_ticks();
        tick(&mut sim, &TickInput::default(), SIM_DT);
        assert_eq!(sim.time_ticks(), ticks);
    }
}
