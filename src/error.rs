//! Configuration errors
//!
//! Gameplay never fails: unknown ids, exhausted pools and spent points are
//! reported through `Option`/`bool`. Only broken static data reaches here, and
//! it aborts startup.

use thiserror::Error;

use crate::sim::EnemyKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no waves configured")]
    NoWaves,

    #[error("wave {wave} has no enemy types")]
    EmptyWave { wave: usize },

    #[error("wave {wave} has invalid weight {weight} for {kind:?}")]
    InvalidWeight {
        wave: usize,
        kind: EnemyKind,
        weight: f32,
    },

    #[error("wave {wave} has a non-positive duration or spawn interval")]
    InvalidDuration { wave: usize },

    #[error("no archetype configured for enemy kind {0:?}")]
    MissingArchetype(EnemyKind),

    #[error("level table is empty")]
    EmptyLevelTable,

    #[error("level table must start at level 1 with zero experience and increase strictly")]
    UnorderedLevelTable,

    #[error("skill {0} is defined twice")]
    DuplicateSkill(String),

    #[error("skill {skill} requires unknown skill {prerequisite}")]
    UnknownPrerequisite { skill: String, prerequisite: String },

    #[error("skill prerequisites form a cycle through {0}")]
    PrerequisiteCycle(String),

    #[error("pool capacity must be at least 1")]
    EmptyPool,
}
