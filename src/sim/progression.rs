//! Experience, levels and point rewards
//!
//! Thresholds are cumulative experience totals, so leveling never spends
//! experience and several levels can be gained from one grant.

use serde::{Deserialize, Serialize};

use super::events::{Dispatcher, HandlerId, SimEvent};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rewards {
    pub skill_points: u32,
    pub stat_points: u32,
    /// Skills unlocked for free on reaching the level
    #[serde(default)]
    pub unlocks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    pub level: u32,
    /// Cumulative experience needed to reach `level`
    pub exp_required: u64,
    #[serde(default)]
    pub rewards: Rewards,
}

impl LevelConfig {
    /// `50 * (L - 1) * L` experience per level, one skill point and three stat points each
    pub fn standard_table(max_level: u32) -> Vec<LevelConfig> {
        (1..=max_level.max(1))
            .map(|level| {
                let l = u64::from(level);
                LevelConfig {
                    level,
                    exp_required: 50 * (l - 1) * l,
                    rewards: Rewards {
                        skill_points: 1,
                        stat_points: 3,
                        unlocks: Vec::new(),
                    },
                }
            })
            .collect()
    }
}

/// Level 1 at zero experience, then strictly increasing thresholds, one row per level
pub fn validate_level_table(table: &[LevelConfig]) -> Result<(), ConfigError> {
    let first = table.first().ok_or(ConfigError::EmptyLevelTable)?;
    if first.level != 1 || first.exp_required != 0 {
        return Err(ConfigError::UnorderedLevelTable);
    }
    let ordered = table.iter().enumerate().all(|(i, row)| row.level as usize == i + 1)
        && table
            .windows(2)
            .all(|pair| pair[0].exp_required < pair[1].exp_required);
    if !ordered {
        return Err(ConfigError::UnorderedLevelTable);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressionEvent {
    ExpGain { amount: u64, total: u64 },
    LevelUp { level: u32, rewards: Rewards },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressionEventKind {
    ExpGain,
    LevelUp,
}

impl SimEvent for ProgressionEvent {
    type Kind = ProgressionEventKind;

    fn kind(&self) -> ProgressionEventKind {
        match self {
            ProgressionEvent::ExpGain { .. } => ProgressionEventKind::ExpGain,
            ProgressionEvent::LevelUp { .. } => ProgressionEventKind::LevelUp,
        }
    }
}

#[derive(Debug)]
pub struct Progression {
    table: Vec<LevelConfig>,
    max_level: u32,
    experience: u64,
    level: u32,
    skill_points: u32,
    stat_points: u32,
    events: Dispatcher<ProgressionEvent>,
}

impl Progression {
    /// The effective cap is the lower of `max_level` and the table length
    pub fn new(table: Vec<LevelConfig>, max_level: u32) -> Result<Self, ConfigError> {
        validate_level_table(&table)?;
        let max_level = max_level.clamp(1, table.len() as u32);
        Ok(Self {
            table,
            max_level,
            experience: 0,
            level: 1,
            skill_points: 0,
            stat_points: 0,
            events: Dispatcher::new(),
        })
    }

    /// Zero is ignored. Promotes as many levels as the new total allows.
    pub fn add_experience(&mut self, amount: u64) {
        if amount == 0 {
            return;
        }
        self.experience = self.experience.saturating_add(amount);
        self.events.emit(ProgressionEvent::ExpGain {
            amount,
            total: self.experience,
        });

        while let Some(next) = self.next_level_config() {
            if self.experience < next.exp_required {
                break;
            }
            let level = next.level;
            let rewards = next.rewards.clone();
            self.level = level;
            self.skill_points += rewards.skill_points;
            self.stat_points += rewards.stat_points;
            log::info!("level up: {} ({} exp)", level, self.experience);
            self.events.emit(ProgressionEvent::LevelUp { level, rewards });
        }
    }

    fn current_level_config(&self) -> &LevelConfig {
        // Level is always within 1..=table.len()
        &self.table[(self.level - 1) as usize]
    }

    fn next_level_config(&self) -> Option<&LevelConfig> {
        if self.is_max_level() {
            return None;
        }
        self.table.get(self.level as usize)
    }

    /// Fraction through the current band, 1 at max level
    pub fn exp_progress(&self) -> f64 {
        let Some(next) = self.next_level_config() else {
            return 1.0;
        };
        let floor = self.current_level_config().exp_required;
        let band = next.exp_required.saturating_sub(floor);
        if band == 0 {
            return 1.0;
        }
        let into = self.experience.saturating_sub(floor);
        (into as f64 / band as f64).clamp(0.0, 1.0)
    }

    pub fn exp_to_next_level(&self) -> u64 {
        self.next_level_config()
            .map_or(0, |next| next.exp_required.saturating_sub(self.experience))
    }

    pub fn is_max_level(&self) -> bool {
        self.level >= self.max_level
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    pub fn experience(&self) -> u64 {
        self.experience
    }

    pub fn skill_points(&self) -> u32 {
        self.skill_points
    }

    pub fn stat_points(&self) -> u32 {
        self.stat_points
    }

    pub fn use_skill_point(&mut self) -> bool {
        if self.skill_points == 0 {
            log::debug!("no skill points to spend");
            return false;
        }
        self.skill_points -= 1;
        true
    }

    pub fn use_stat_point(&mut self) -> bool {
        if self.stat_points == 0 {
            log::debug!("no stat points to spend");
            return false;
        }
        self.stat_points -= 1;
        true
    }

    pub fn on(
        &mut self,
        kind: ProgressionEventKind,
        handler: impl FnMut(&ProgressionEvent) + 'static,
    ) -> HandlerId {
        self.events.on(kind, handler)
    }

    pub fn drain_events(&mut self) -> Vec<ProgressionEvent> {
        self.events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn progression() -> Progression {
        Progression::new(LevelConfig::standard_table(60), 60).unwrap()
    }

    fn level_ups(events: &[ProgressionEvent]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressionEvent::LevelUp { level, .. } => Some(*level),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_standard_table_thresholds() {
        let table = LevelConfig::standard_table(4);
        let required: Vec<u64> = table.iter().map(|l| l.exp_required).collect();
        assert_eq!(required, vec![0, 100, 300, 600]);
    }

    #[test]
    fn test_single_grant_crosses_several_levels() {
        let mut p = progression();
        p.add_experience(350);
        assert_eq!(p.level(), 3);
        assert_eq!(p.skill_points(), 2);
        assert_eq!(p.stat_points(), 6);
        assert_eq!(p.experience(), 350);
        assert_eq!(level_ups(&p.drain_events()), vec![2, 3]);
        assert_eq!(p.exp_to_next_level(), 250);
        assert!((p.exp_progress() - 50.0 / 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_grant_is_ignored() {
        let mut p = progression();
        p.add_experience(0);
        assert!(p.drain_events().is_empty());
        assert_eq!(p.experience(), 0);
    }

    #[test]
    fn test_max_level_caps_promotion() {
        let mut p = Progression::new(LevelConfig::standard_table(60), 3).unwrap();
        p.add_experience(1_000_000);
        assert_eq!(p.level(), 3);
        assert!(p.is_max_level());
        assert_eq!(p.exp_progress(), 1.0);
        assert_eq!(p.exp_to_next_level(), 0);
    }

    #[test]
    fn test_points_are_spent_once() {
        let mut p = progression();
        assert!(!p.use_skill_point());
        p.add_experience(100);
        assert!(p.use_skill_point());
        assert!(!p.use_skill_point());
        for _ in 0..3 {
            assert!(p.use_stat_point());
        }
        assert!(!p.use_stat_point());
    }

    #[test]
    fn test_table_validation() {
        assert!(matches!(
            Progression::new(Vec::new(), 10),
            Err(ConfigError::EmptyLevelTable)
        ));
        let mut table = LevelConfig::standard_table(3);
        table[2].exp_required = 50;
        assert!(matches!(
            Progression::new(table, 10),
            Err(ConfigError::UnorderedLevelTable)
        ));
    }

    #[test]
    fn test_level_up_carries_unlocks() {
        let mut table = LevelConfig::standard_table(5);
        table[1].rewards.unlocks = vec!["basic_breath".into()];
        let mut p = Progression::new(table, 5).unwrap();
        p.add_experience(100);
        let unlocked = p.drain_events().into_iter().find_map(|e| match e {
            ProgressionEvent::LevelUp { rewards, .. } => Some(rewards.unlocks),
            _ => None,
        });
        assert_eq!(unlocked, Some(vec!["basic_breath".to_string()]));
    }

    proptest! {
        #[test]
        fn prop_experience_is_associative(a in 0u64..50_000, b in 0u64..50_000) {
            let mut split = progression();
            split.add_experience(a);
            split.add_experience(b);

            let mut whole = progression();
            whole.add_experience(a + b);

            prop_assert_eq!(split.level(), whole.level());
            prop_assert_eq!(split.experience(), whole.experience());
            prop_assert_eq!(split.skill_points(), whole.skill_points());
            prop_assert_eq!(split.stat_points(), whole.stat_points());
        }
    }
}
