//! Cooldown tracker keyed by skill id
//!
//! Stores an absolute end time per skill on the tracker's own clock, which
//! advances only through `update`.

use std::collections::BTreeMap;

use super::events::{Dispatcher, HandlerId, SimEvent};
use crate::secs_to_ms;

#[derive(Debug, Clone, PartialEq)]
pub enum CooldownEvent {
    Start {
        skill: String,
        total_ms: f64,
    },
    Update {
        skill: String,
        remaining_ms: f64,
        total_ms: f64,
    },
    End {
        skill: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CooldownEventKind {
    Start,
    Update,
    End,
}

impl SimEvent for CooldownEvent {
    type Kind = CooldownEventKind;

    fn kind(&self) -> CooldownEventKind {
        match self {
            CooldownEvent::Start { .. } => CooldownEventKind::Start,
            CooldownEvent::Update { .. } => CooldownEventKind::Update,
            CooldownEvent::End { .. } => CooldownEventKind::End,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    ends_at: f64,
    total_ms: f64,
}

#[derive(Debug, Default)]
pub struct CooldownTracker {
    timers: BTreeMap<String, Timer>,
    now_ms: f64,
    events: Dispatcher<CooldownEvent>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_cooldown(&mut self, skill: &str, duration_ms: f64) {
        let total_ms = duration_ms.max(0.0);
        self.timers.insert(
            skill.to_string(),
            Timer {
                ends_at: self.now_ms + total_ms,
                total_ms,
            },
        );
        self.events.emit(CooldownEvent::Start {
            skill: skill.to_string(),
            total_ms,
        });
    }

    pub fn is_on_cooldown(&self, skill: &str) -> bool {
        self.timers
            .get(skill)
            .is_some_and(|timer| self.now_ms < timer.ends_at)
    }

    pub fn remaining_ms(&self, skill: &str) -> f64 {
        self.timers
            .get(skill)
            .map_or(0.0, |timer| (timer.ends_at - self.now_ms).max(0.0))
    }

    /// 0 when just started, 1 when ready
    pub fn progress(&self, skill: &str) -> f64 {
        match self.timers.get(skill) {
            Some(timer) if timer.total_ms > 0.0 => {
                (1.0 - self.remaining_ms(skill) / timer.total_ms).clamp(0.0, 1.0)
            }
            _ => 1.0,
        }
    }

    /// Pull the end time forward; expiry is still reported by `update`
    pub fn reduce(&mut self, skill: &str, amount_ms: f64) {
        if let Some(timer) = self.timers.get_mut(skill) {
            timer.ends_at -= amount_ms.max(0.0);
        }
    }

    /// Drop a cooldown without an `End` event
    pub fn reset(&mut self, skill: &str) {
        self.timers.remove(skill);
    }

    pub fn reset_all(&mut self) {
        self.timers.clear();
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    /// Advance the clock, emit `End` for expired timers and `Update` for the rest
    pub fn update(&mut self, dt: f32) {
        self.now_ms += secs_to_ms(dt);
        let now = self.now_ms;

        let (expired, running): (Vec<_>, Vec<_>) = self
            .timers
            .iter()
            .map(|(skill, timer)| (skill.clone(), *timer))
            .partition(|(_, timer)| now >= timer.ends_at);

        for (skill, _) in expired {
            self.timers.remove(&skill);
            self.events.emit(CooldownEvent::End { skill });
        }
        for (skill, timer) in running {
            self.events.emit(CooldownEvent::Update {
                skill,
                remaining_ms: timer.ends_at - now,
                total_ms: timer.total_ms,
            });
        }
    }

    pub fn on(
        &mut self,
        kind: CooldownEventKind,
        handler: impl FnMut(&CooldownEvent) + 'static,
    ) -> HandlerId {
        self.events.on(kind, handler)
    }

    pub fn drain_events(&mut self) -> Vec<CooldownEvent> {
        self.events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ends(events: &[CooldownEvent], skill: &str) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, CooldownEvent::End { skill: s } if s == skill))
            .count()
    }

    #[test]
    fn test_cooldown_round_trip() {
        let mut tracker = CooldownTracker::new();
        tracker.start_cooldown("breath", 2000.0);
        assert!(tracker.is_on_cooldown("breath"));

        tracker.update(1.0);
        assert!(tracker.is_on_cooldown("breath"));
        assert!((tracker.progress("breath") - 0.5).abs() < 1e-9);

        tracker.update(1.0);
        assert!(!tracker.is_on_cooldown("breath"));
        // Exactly the full duration has passed: one End, already reported
        let events = tracker.drain_events();
        assert_eq!(ends(&events, "breath"), 1);
        assert_eq!(tracker.active_count(), 0);

        tracker.update(1.0);
        assert_eq!(ends(&tracker.drain_events(), "breath"), 0);
    }

    #[test]
    fn test_update_reports_remaining() {
        let mut tracker = CooldownTracker::new();
        tracker.start_cooldown("slash", 3000.0);
        tracker.drain_events();

        tracker.update(1.0);
        let events = tracker.drain_events();
        assert_eq!(
            events,
            vec![CooldownEvent::Update {
                skill: "slash".into(),
                remaining_ms: 2000.0,
                total_ms: 3000.0,
            }]
        );
    }

    #[test]
    fn test_reduce_and_reset() {
        let mut tracker = CooldownTracker::new();
        tracker.start_cooldown("a", 5000.0);
        tracker.start_cooldown("b", 5000.0);

        tracker.reduce("a", 4000.0);
        assert!((tracker.remaining_ms("a") - 1000.0).abs() < 1e-9);
        tracker.reduce("missing", 100.0);

        tracker.reset("b");
        assert!(!tracker.is_on_cooldown("b"));
        assert_eq!(tracker.progress("b"), 1.0);

        tracker.reset_all();
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(tracker.remaining_ms("a"), 0.0);
    }

    #[test]
    fn test_zero_duration_is_never_on_cooldown() {
        let mut tracker = CooldownTracker::new();
        tracker.start_cooldown("passive", 0.0);
        assert!(!tracker.is_on_cooldown("passive"));
        tracker.update(0.0);
        assert_eq!(ends(&tracker.drain_events(), "passive"), 1);
    }
}
