//! Run settings
//!
//! Everything that varies per run rather than per balance pass: seed, pool
//! size, throttling, player combat numbers and the visible bounds. Loaded from
//! JSON; missing fields fall back to the defaults.

use std::path::Path;

use chrono::NaiveDateTime;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::ConfigError;
use crate::sim::Bounds;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Seed for every random stream in the run
    pub seed: u64,

    // === Spawning ===
    /// Enemy pool capacity
    pub pool_capacity: usize,
    /// Distance outside the bounds where enemies appear
    pub spawn_margin: f32,
    /// Average frame rate below which spawning backs off
    pub throttle_fps: f32,
    /// Spawn interval multiplier while throttled (never below 1)
    pub throttle_multiplier: f32,
    /// Visible area used for spawn placement
    pub bounds: Bounds,

    // === Player ===
    pub max_level: u32,
    /// Attacks per second
    pub player_attack_speed: f32,
    pub player_range: f32,
    pub player_start: Vec2,

    /// Local wall time the run started at; daily experience caps count from it.
    /// `None` uses a fixed date so runs stay reproducible.
    pub run_start: Option<NaiveDateTime>,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            seed: 0,

            pool_capacity: ENEMY_POOL_SIZE,
            spawn_margin: SPAWN_MARGIN,
            throttle_fps: THROTTLE_FPS,
            throttle_multiplier: THROTTLE_MULTIPLIER,
            bounds: Bounds::default(),

            max_level: MAX_LEVEL,
            player_attack_speed: 1.0,
            player_range: 200.0,
            player_start: Vec2::new(400.0, 300.0),

            run_start: None,
        }
    }
}

impl SimSettings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings = SimSettings::from_json(r#"{ "seed": 42, "pool_capacity": 8 }"#).unwrap();
        assert_eq!(settings.seed, 42);
        assert_eq!(settings.pool_capacity, 8);
        assert_eq!(settings.max_level, MAX_LEVEL);
        assert_eq!(settings.throttle_multiplier, THROTTLE_MULTIPLIER);
    }

    #[test]
    fn test_json_round_trip_with_run_start() {
        let mut settings = SimSettings::default();
        settings.run_start = chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(23, 30, 0));
        let json = settings.to_json().unwrap();
        assert_eq!(SimSettings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_bad_input_is_a_config_error() {
        assert!(matches!(
            SimSettings::from_json("{ \"seed\": \"x\" }"),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            SimSettings::load("/nonexistent/settings.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
