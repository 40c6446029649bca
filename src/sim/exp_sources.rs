//! Named experience sources with level gates, cooldowns and daily caps
//!
//! Time is supplied by the caller as a local `NaiveDateTime`; daily counts
//! roll over when the calendar date changes.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpSourceKind {
    Kill,
    Quest,
    Item,
    Exploration,
    Achievement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpSource {
    pub id: String,
    pub kind: ExpSourceKind,
    pub base_exp: u64,
    #[serde(default = "one")]
    pub multiplier: f64,
    #[serde(default)]
    pub level_requirement: u32,
    #[serde(default)]
    pub cooldown_ms: Option<i64>,
    #[serde(default)]
    pub max_per_day: Option<u32>,
}

impl ExpSource {
    pub fn new(id: &str, kind: ExpSourceKind, base_exp: u64) -> Self {
        Self {
            id: id.to_string(),
            kind,
            base_exp,
            multiplier: 1.0,
            level_requirement: 0,
            cooldown_ms: None,
            max_per_day: None,
        }
    }
}

/// Kill rewards shrink by 10% for every full 10 levels above 10, never below 10%
pub fn kill_level_scale(level: u32) -> f64 {
    let steps = f64::from(level.saturating_sub(10) / 10);
    (1.0 - steps * 0.1).max(0.1)
}

#[derive(Debug, Clone, Default)]
pub struct ExpSourceRegistry {
    sources: BTreeMap<String, ExpSource>,
    last_gain: HashMap<String, NaiveDateTime>,
    daily_counts: HashMap<String, u32>,
    counted_day: Option<NaiveDate>,
}

impl ExpSourceRegistry {
    pub fn new(sources: impl IntoIterator<Item = ExpSource>) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.id.clone(), s)).collect(),
            ..Self::default()
        }
    }

    pub fn get(&self, id: &str) -> Option<&ExpSource> {
        self.sources.get(id)
    }

    fn daily_count(&self, id: &str, now: NaiveDateTime) -> u32 {
        if self.counted_day != Some(now.date()) {
            return 0;
        }
        self.daily_counts.get(id).copied().unwrap_or(0)
    }

    /// Known source, level requirement met, off cooldown, under the daily cap
    pub fn can_gain(&self, id: &str, level: u32, now: NaiveDateTime) -> bool {
        let Some(source) = self.sources.get(id) else {
            return false;
        };
        if level < source.level_requirement {
            return false;
        }
        if let (Some(cooldown), Some(last)) = (source.cooldown_ms, self.last_gain.get(id)) {
            if now.signed_duration_since(*last) < Duration::milliseconds(cooldown) {
                return false;
            }
        }
        if let Some(cap) = source.max_per_day {
            if self.daily_count(id, now) >= cap {
                return false;
            }
        }
        true
    }

    /// Level-scaled, multiplied, rounded. 0 for unknown sources.
    pub fn calculate_experience(&self, id: &str, level: u32) -> u64 {
        let Some(source) = self.sources.get(id) else {
            return 0;
        };
        let mut exp = source.base_exp as f64;
        if source.kind == ExpSourceKind::Kill {
            exp *= kill_level_scale(level);
        }
        exp *= source.multiplier;
        exp.round().max(0.0) as u64
    }

    /// Stamp the cooldown and bump the daily count
    pub fn record_gain(&mut self, id: &str, now: NaiveDateTime) {
        let Some(source) = self.sources.get(id) else {
            return;
        };
        let today = now.date();
        if self.counted_day != Some(today) {
            self.daily_counts.clear();
            self.counted_day = Some(today);
        }
        if source.max_per_day.is_some() {
            *self.daily_counts.entry(id.to_string()).or_insert(0) += 1;
        }
        self.last_gain.insert(id.to_string(), now);
    }

    /// Check, compute and record in one step. Returns 0 when refused.
    pub fn grant(&mut self, id: &str, level: u32, now: NaiveDateTime) -> u64 {
        if !self.can_gain(id, level, now) {
            log::debug!("experience source {} refused at level {}", id, level);
            return 0;
        }
        let amount = self.calculate_experience(id, level);
        self.record_gain(id, now);
        amount
    }
}
