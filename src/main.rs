//! Ember Arena entry point
//!
//! Headless runner: drives the simulation at a fixed timestep with a simple
//! movement layer (enemies chase the player, the player walks to essence)
//! and logs a run summary.

#[cfg(not(target_arch = "wasm32"))]
mod headless {
    use std::cell::Cell;
    use std::path::PathBuf;
    use std::rc::Rc;

    use clap::Parser;
    use glam::Vec2;

    use ember_arena::consts::*;
    use ember_arena::sim::{
        CombatEvent, CombatEventKind, CooldownEventKind, EntityId, FixedBounds, FrameRateMonitor,
        ProgressionEventKind, SimPhase, Simulation, StatKind, TickInput, WaveEventKind, tick,
    };
    use ember_arena::{ConfigError, SimSettings, Tuning};

    /// Seconds of travel a knockback impulse is applied for
    const KNOCKBACK_SECS: f32 = 0.25;
    /// Player walking speed toward essence (units per second)
    const PLAYER_WALK_SPEED: f32 = 120.0;

    /// Arena survival simulation, run without rendering
    #[derive(Parser, Debug)]
    #[command(name = "ember-arena")]
    #[command(about = "Arena survival simulation core, run headless")]
    #[command(version)]
    pub struct Args {
        /// RNG seed (overrides the settings file)
        #[arg(long)]
        pub seed: Option<u64>,

        /// Fixed simulation ticks to run (60 per simulated second)
        #[arg(long, default_value = "18000")]
        pub ticks: u64,

        /// Run settings JSON
        #[arg(long, value_name = "SETTINGS_FILE")]
        pub settings: Option<PathBuf>,

        /// Balance tables JSON
        #[arg(long, value_name = "TUNING_FILE")]
        pub tuning: Option<PathBuf>,

        /// Frame rate the runner pretends to render at (feeds the spawn throttle)
        #[arg(long, default_value = "60")]
        pub fps: f32,

        /// Spend points and cast skills automatically
        #[arg(long)]
        pub autoplay: bool,
    }

    #[derive(Default)]
    struct Tally {
        kills: Rc<Cell<u32>>,
        waves: Rc<Cell<u32>>,
        level_ups: Rc<Cell<u32>>,
        casts: Rc<Cell<u32>>,
    }

    /// Runner holding the simulation and the frame accumulator
    struct Game {
        sim: Simulation,
        accumulator: f32,
        autoplay: bool,
        tally: Tally,
    }

    impl Game {
        fn new(settings: &SimSettings, tuning: Tuning, autoplay: bool) -> Result<Self, ConfigError> {
            let perf = FrameRateMonitor::new(PERF_HISTORY, f64::from(settings.throttle_fps));
            let mut sim = Simulation::new(
                settings,
                tuning,
                Box::new(perf),
                Box::new(FixedBounds(settings.bounds)),
            )?;

            let tally = Tally::default();
            let kills = Rc::clone(&tally.kills);
            sim.combat_mut().on(CombatEventKind::Death, move |event| {
                if let CombatEvent::Death {
                    was_player: false, ..
                } = event
                {
                    kills.set(kills.get() + 1);
                }
            });
            let waves = Rc::clone(&tally.waves);
            sim.waves_mut().on(WaveEventKind::WaveStart, move |_| {
                waves.set(waves.get() + 1);
            });
            let level_ups = Rc::clone(&tally.level_ups);
            sim.progression_mut()
                .on(ProgressionEventKind::LevelUp, move |_| {
                    level_ups.set(level_ups.get() + 1);
                });
            // Every successful cast starts a cooldown
            let casts = Rc::clone(&tally.casts);
            sim.abilities_mut()
                .cooldowns_mut()
                .on(CooldownEventKind::Start, move |_| {
                    casts.set(casts.get() + 1);
                });

            Ok(Self {
                sim,
                accumulator: 0.0,
                autoplay,
                tally,
            })
        }

        /// Run simulation ticks for one rendered frame
        fn update(&mut self, dt: f32) {
            let dt = dt.min(0.1);
            self.accumulator += dt;

            let mut substeps = 0;
            while self.accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
                let input = self.build_input(dt);
                tick(&mut self.sim, &input, SIM_DT);
                self.accumulator -= SIM_DT;
                substeps += 1;
            }
        }

        fn build_input(&mut self, frame_dt: f32) -> TickInput {
            let mut input = TickInput {
                frame_ms: Some(f64::from(frame_dt) * 1000.0),
                ..Default::default()
            };
            let Some(player_at) = self.sim.combat().player_position() else {
                return input;
            };

            // Knockback first, then everyone closes in
            let mut pushed: Vec<(EntityId, Vec2)> = Vec::new();
            for (id, velocity) in self.sim.take_impulses() {
                if let Some(at) = self.sim.combat().position(id) {
                    pushed.push((id, at + velocity * KNOCKBACK_SECS));
                }
            }
            let player = self.sim.player_id();
            for id in self.sim.combat().entity_ids() {
                if id == player || pushed.iter().any(|(p, _)| *p == id) {
                    continue;
                }
                let (Some(at), Some(stats)) = (self.sim.combat().position(id), self.sim.combat().stats(id))
                else {
                    continue;
                };
                // Stop at attack range
                if at.distance(player_at) <= stats.range {
                    continue;
                }
                if let Some(dir) = ember_arena::direction(at, player_at) {
                    input.positions.push((id, at + dir * stats.move_speed * SIM_DT));
                }
            }
            input.positions.extend(pushed);

            if self.autoplay {
                let nearest_essence = self
                    .sim
                    .essences()
                    .essences_in_range(player_at, f32::MAX)
                    .into_iter()
                    .min_by(|a, b| {
                        a.position
                            .distance(player_at)
                            .total_cmp(&b.position.distance(player_at))
                    })
                    .map(|e| e.position);
                if let Some(target) = nearest_essence {
                    if let Some(dir) = ember_arena::direction(player_at, target) {
                        let step = (PLAYER_WALK_SPEED * SIM_DT).min(player_at.distance(target));
                        input.player_position = Some(player_at + dir * step);
                    }
                }
                if let Some(enemy) = self.sim.combat().find_target(player) {
                    input.skill_casts = self
                        .sim
                        .abilities()
                        .unlocked_skills()
                        .filter(|s| self.sim.abilities().can_use(&s.def.id))
                        .map(|s| (s.def.id.clone(), enemy))
                        .collect();
                }
            }
            input
        }

        /// Spend every available point: skills in library order, stats round robin
        fn spend_points(&mut self) {
            let ids: Vec<String> = self.sim.abilities().library().ids().map(String::from).collect();
            while self.sim.progression().skill_points() > 0 {
                if !ids.iter().any(|id| self.sim.invest_skill_point(id)) {
                    break;
                }
            }
            let mut stats = StatKind::ALL.iter().cycle().take(StatKind::ALL.len() * 8);
            while self.sim.progression().stat_points() > 0 {
                let Some(&stat) = stats.next() else {
                    break;
                };
                self.sim.invest_stat_point(stat);
            }
        }
    }

    fn load(args: &Args) -> Result<(SimSettings, Tuning), ConfigError> {
        let mut settings = match &args.settings {
            Some(path) => SimSettings::load(path)?,
            None => SimSettings::default(),
        };
        if let Some(seed) = args.seed {
            settings.seed = seed;
        }
        let tuning = match &args.tuning {
            Some(path) => Tuning::load(path)?,
            None => Tuning::default(),
        };
        Ok((settings, tuning))
    }

    pub fn run() -> Result<(), ConfigError> {
        let args = Args::parse();
        let (settings, tuning) = load(&args)?;
        log::info!("Ember Arena (headless) starting with seed {}", settings.seed);

        let mut game = Game::new(&settings, tuning, args.autoplay)?;
        let frame_dt = 1.0 / args.fps.max(1.0);

        while game.sim.time_ticks() < args.ticks {
            game.update(frame_dt);
            if game.autoplay {
                game.spend_points();
            }
            if game.sim.phase() != SimPhase::Running {
                break;
            }
        }

        let sim = &game.sim;
        println!(
            "{:?} after {:.1}s: wave {} ({} started), level {} ({} level ups), {} exp, {} kills, {} casts, {} essence on the ground",
            sim.phase(),
            sim.elapsed_ms() / 1000.0,
            sim.waves().wave_number(),
            game.tally.waves.get(),
            sim.progression().level(),
            game.tally.level_ups.get(),
            sim.progression().experience(),
            game.tally.kills.get(),
            game.tally.casts.get(),
            sim.essences().len(),
        );
        game.sim.shutdown();
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    env_logger::init();
    match headless::run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The library is the wasm surface; there is no browser runner
}
