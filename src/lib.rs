//! Ember Arena - simulation core for an arena survival game
//!
//! Core modules:
//! - `sim`: Deterministic simulation (combat, waves, pickups, progression, abilities)
//! - `settings`: Run settings (seed, pool size, throttling, player base stats)
//! - `tuning`: Data-driven game balance
//! - `error`: Configuration errors

pub mod error;
pub mod settings;
pub mod sim;
pub mod tuning;

pub use error::ConfigError;
pub use settings::SimSettings;
pub use tuning::Tuning;

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Frame rate below which spawning is throttled
    pub const THROTTLE_FPS: f32 = 30.0;
    /// Spawn interval multiplier while throttled
    pub const THROTTLE_MULTIPLIER: f32 = 1.5;
    /// Frame samples kept by the performance monitor (one second at 60 fps)
    pub const PERF_HISTORY: usize = 60;

    /// Enemy pool capacity
    pub const ENEMY_POOL_SIZE: usize = 100;
    /// Distance outside the visible bounds where enemies appear
    pub const SPAWN_MARGIN: f32 = 50.0;

    /// Level cap
    pub const MAX_LEVEL: u32 = 60;

    /// Scatter radius for multi-drop essence
    pub const DROP_SCATTER: f32 = 12.0;
}

/// Milliseconds in one second; every internal clock counts milliseconds.
pub const MS_PER_SEC: f64 = 1000.0;

/// Convert a frame delta in seconds to milliseconds
#[inline]
pub fn secs_to_ms(dt: f32) -> f64 {
    f64::from(dt) * MS_PER_SEC
}

/// Unit direction from `from` to `to`, or `None` when the points coincide
#[inline]
pub fn direction(from: Vec2, to: Vec2) -> Option<Vec2> {
    (to - from).try_normalize()
}
