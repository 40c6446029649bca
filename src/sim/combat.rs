//! Combat registry: entity stats, positions, targeting and attack resolution
//!
//! Iteration is always in ascending `EntityId` order so targeting ties and
//! event order are deterministic.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::events::{Dispatcher, HandlerId, SimEvent};
use crate::{MS_PER_SEC, secs_to_ms};

/// Identity shared by every subsystem that refers to a live entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatStats {
    /// Current health; the entity dies at 0 or below
    pub health: f32,
    /// Flat damage per auto attack
    pub damage: f32,
    /// Attacks per second
    pub attack_speed: f32,
    /// Targeting radius in world units
    pub range: f32,
    /// Units per second, read by the movement layer
    #[serde(default)]
    pub move_speed: f32,
    #[serde(default)]
    pub is_player: bool,
}

impl CombatStats {
    /// Minimum time between two attacks
    pub fn attack_interval_ms(&self) -> f64 {
        MS_PER_SEC / f64::from(self.attack_speed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CombatEvent {
    Attack {
        source: EntityId,
        target: EntityId,
        damage: f32,
    },
    Damage {
        source: Option<EntityId>,
        target: EntityId,
        damage: f32,
        remaining_health: f32,
    },
    Death {
        entity: EntityId,
        killer: Option<EntityId>,
        /// Last position before the entity was purged
        position: Vec2,
        was_player: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombatEventKind {
    Attack,
    Damage,
    Death,
}

impl SimEvent for CombatEvent {
    type Kind = CombatEventKind;

    fn kind(&self) -> CombatEventKind {
        match self {
            CombatEvent::Attack { .. } => CombatEventKind::Attack,
            CombatEvent::Damage { .. } => CombatEventKind::Damage,
            CombatEvent::Death { .. } => CombatEventKind::Death,
        }
    }
}

#[derive(Debug, Default)]
pub struct CombatRegistry {
    stats: BTreeMap<EntityId, CombatStats>,
    positions: BTreeMap<EntityId, Vec2>,
    last_attack: HashMap<EntityId, f64>,
    targets: BTreeMap<EntityId, EntityId>,
    /// Registry clock (ms since creation)
    now_ms: f64,
    next_id: u32,
    events: Dispatcher<CombatEvent>,
}

impl CombatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh entity ID. IDs are never reused within a run.
    pub fn next_entity_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add a live entity. Registering an ID that is already live overwrites it
    /// and forgets its attack timer and target.
    pub fn register(&mut self, id: EntityId, stats: CombatStats, position: Vec2) {
        if self.stats.contains_key(&id) {
            log::warn!("entity {} registered twice; overwriting", id);
            self.last_attack.remove(&id);
            self.targets.remove(&id);
        }
        // Keep externally chosen IDs out of the allocator's way
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        self.stats.insert(id, stats);
        self.positions.insert(id, position);
    }

    /// Advance the registry clock and resolve one targeting/attack pass
    pub fn update(&mut self, dt: f32) {
        self.now_ms += secs_to_ms(dt);

        let ids: Vec<EntityId> = self.stats.keys().copied().collect();
        for id in ids {
            // May have died earlier in this pass
            let Some(stats) = self.stats.get(&id) else {
                continue;
            };
            if stats.attack_speed <= 0.0 {
                continue;
            }
            if let Some(&last) = self.last_attack.get(&id) {
                if self.now_ms - last < stats.attack_interval_ms() {
                    continue;
                }
            }
            if let Some(target) = self.find_target(id) {
                self.perform_attack(id, target);
            }
        }
    }

    /// Nearest other entity within the source's range. Ties keep the lowest ID.
    pub fn find_target(&self, source: EntityId) -> Option<EntityId> {
        let origin = *self.positions.get(&source)?;
        let range = self.stats.get(&source)?.range;

        let mut nearest = None;
        let mut best = f32::INFINITY;
        for (&id, &pos) in &self.positions {
            if id == source {
                continue;
            }
            let distance = origin.distance(pos);
            if distance <= range && distance < best {
                nearest = Some(id);
                best = distance;
            }
        }
        nearest
    }

    /// Flat attack with the source's damage stat. Returns false for unknown IDs.
    pub fn perform_attack(&mut self, source: EntityId, target: EntityId) -> bool {
        let Some(damage) = self.stats.get(&source).map(|s| s.damage) else {
            return false;
        };
        if !self.stats.contains_key(&target) {
            return false;
        }

        self.targets.insert(source, target);
        self.apply_damage(Some(source), target, damage);
        self.last_attack.insert(source, self.now_ms);
        self.events.emit(CombatEvent::Attack {
            source,
            target,
            damage,
        });
        true
    }

    /// Subtract health. Non-positive or non-finite amounts are ignored.
    pub fn apply_damage(&mut self, source: Option<EntityId>, target: EntityId, amount: f32) -> bool {
        if !amount.is_finite() || amount <= 0.0 {
            return false;
        }
        let Some(stats) = self.stats.get_mut(&target) else {
            return false;
        };

        stats.health -= amount;
        let remaining_health = stats.health;
        self.events.emit(CombatEvent::Damage {
            source,
            target,
            damage: amount,
            remaining_health,
        });

        if remaining_health <= 0.0 {
            self.handle_death(target, source);
        }
        true
    }

    fn handle_death(&mut self, entity: EntityId, killer: Option<EntityId>) {
        let position = self.positions.get(&entity).copied().unwrap_or(Vec2::ZERO);
        let was_player = self.stats.get(&entity).is_some_and(|s| s.is_player);
        log::debug!("entity {} died at {:?}", entity, position);

        self.events.emit(CombatEvent::Death {
            entity,
            killer,
            position,
            was_player,
        });
        self.purge(entity);
    }

    fn purge(&mut self, entity: EntityId) {
        self.stats.remove(&entity);
        self.positions.remove(&entity);
        self.last_attack.remove(&entity);
        self.targets.remove(&entity);
        self.targets.retain(|_, target| *target != entity);
    }

    /// Remove without a death event. Pooled enemies must go through
    /// `Simulation::despawn` so their slot is released.
    pub(crate) fn remove_entity(&mut self, id: EntityId) -> bool {
        let existed = self.stats.contains_key(&id);
        self.purge(id);
        existed
    }

    pub fn update_position(&mut self, id: EntityId, position: Vec2) -> bool {
        match self.positions.get_mut(&id) {
            Some(pos) => {
                *pos = position;
                true
            }
            None => false,
        }
    }

    /// Partial stat update for a live entity
    pub fn update_entity_stats(&mut self, id: EntityId, f: impl FnOnce(&mut CombatStats)) -> bool {
        match self.stats.get_mut(&id) {
            Some(stats) => {
                f(stats);
                true
            }
            None => false,
        }
    }

    /// Only links two live entities
    pub fn set_target(&mut self, id: EntityId, target: EntityId) -> bool {
        if id == target || !self.has_entity(id) || !self.has_entity(target) {
            return false;
        }
        self.targets.insert(id, target);
        true
    }

    pub fn clear_target(&mut self, id: EntityId) {
        self.targets.remove(&id);
    }

    pub fn stats(&self, id: EntityId) -> Option<&CombatStats> {
        self.stats.get(&id)
    }

    pub fn position(&self, id: EntityId) -> Option<Vec2> {
        self.positions.get(&id).copied()
    }

    pub fn current_target(&self, id: EntityId) -> Option<EntityId> {
        self.targets.get(&id).copied()
    }

    pub fn last_attack_time(&self, id: EntityId) -> Option<f64> {
        self.last_attack.get(&id).copied()
    }

    pub fn has_entity(&self, id: EntityId) -> bool {
        self.stats.contains_key(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.stats.len()
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.stats.keys().copied()
    }

    /// First live entity flagged as the player
    pub fn player_id(&self) -> Option<EntityId> {
        self.stats
            .iter()
            .find(|(_, stats)| stats.is_player)
            .map(|(&id, _)| id)
    }

    pub fn player_position(&self) -> Option<Vec2> {
        self.player_id().and_then(|id| self.position(id))
    }

    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    pub fn on(
        &mut self,
        kind: CombatEventKind,
        handler: impl FnMut(&CombatEvent) + 'static,
    ) -> HandlerId {
        self.events.on(kind, handler)
    }

    pub fn off(&mut self, kind: CombatEventKind, id: HandlerId) -> bool {
        self.events.off(kind, id)
    }

    pub fn drain_events(&mut self) -> Vec<CombatEvent> {
        self.events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn player() -> CombatStats {
        CombatStats {
            health: 100.0,
            damage: 10.0,
            attack_speed: 1.0,
            range: 200.0,
            move_speed: 200.0,
            is_player: true,
        }
    }

    fn dummy(health: f32) -> CombatStats {
        CombatStats {
            health,
            damage: 5.0,
            attack_speed: 1.0,
            range: 10.0,
            move_speed: 100.0,
            is_player: false,
        }
    }

    fn attacks(events: &[CombatEvent]) -> Vec<(EntityId, EntityId, f32)> {
        events
            .iter()
            .filter_map(|e| match e {
                CombatEvent::Attack {
                    source,
                    target,
                    damage,
                } => Some((*source, *target, *damage)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_player_kills_enemy_in_two_ticks() {
        let mut combat = CombatRegistry::new();
        let p = combat.next_entity_id();
        let e = combat.next_entity_id();
        combat.register(p, player(), Vec2::ZERO);
        combat.register(e, dummy(15.0), Vec2::new(50.0, 0.0));

        combat.update(1.0);
        let events = combat.drain_events();
        assert_eq!(attacks(&events), vec![(p, e, 10.0)]);
        assert_eq!(combat.stats(e).map(|s| s.health), Some(5.0));

        combat.update(1.0);
        let events = combat.drain_events();
        assert_eq!(attacks(&events), vec![(p, e, 10.0)]);
        let deaths: Vec<_> = events
            .iter()
            .filter(|ev| matches!(ev, CombatEvent::Death { entity, .. } if *entity == e))
            .collect();
        assert_eq!(deaths.len(), 1);
        if let CombatEvent::Death {
            position, killer, ..
        } = deaths[0]
        {
            assert_eq!(*position, Vec2::new(50.0, 0.0));
            assert_eq!(*killer, Some(p));
        }

        assert!(!combat.has_entity(e));
        assert_eq!(combat.position(e), None);
        assert_eq!(combat.current_target(p), None);
        assert_eq!(combat.entity_count(), 1);
    }

    #[test]
    fn test_attack_cooldown_gate() {
        let mut combat = CombatRegistry::new();
        let p = combat.next_entity_id();
        let e = combat.next_entity_id();
        combat.register(p, player(), Vec2::ZERO);
        combat.register(e, dummy(1000.0), Vec2::new(20.0, 0.0));

        combat.update(0.5);
        assert_eq!(attacks(&combat.drain_events()).len(), 1);
        assert_eq!(combat.last_attack_time(p), Some(500.0));

        // 500ms later: still inside the 1000ms interval
        combat.update(0.5);
        assert!(attacks(&combat.drain_events()).is_empty());

        combat.update(0.5);
        assert_eq!(attacks(&combat.drain_events()).len(), 1);
    }

    #[test]
    fn test_nearest_target_and_tie_break() {
        let mut combat = CombatRegistry::new();
        let p = EntityId(1);
        combat.register(p, player(), Vec2::ZERO);
        combat.register(EntityId(2), dummy(50.0), Vec2::new(0.0, 80.0));
        combat.register(EntityId(3), dummy(50.0), Vec2::new(-80.0, 0.0));
        combat.register(EntityId(4), dummy(50.0), Vec2::new(150.0, 0.0));
        combat.register(EntityId(5), dummy(50.0), Vec2::new(500.0, 0.0));

        // 2 and 3 are equidistant; the lower ID wins
        assert_eq!(combat.find_target(p), Some(EntityId(2)));

        combat.update_position(EntityId(4), Vec2::new(30.0, 0.0));
        assert_eq!(combat.find_target(p), Some(EntityId(4)));
        // Nothing within 10 units of the far enemy
        assert_eq!(combat.find_target(EntityId(5)), None);
    }

    #[test]
    fn test_dead_entity_is_no_longer_a_target() {
        let mut combat = CombatRegistry::new();
        let a = EntityId(0);
        let b = EntityId(1);
        let c = EntityId(2);
        combat.register(a, player(), Vec2::ZERO);
        combat.register(b, dummy(5.0), Vec2::new(10.0, 0.0));
        combat.register(c, dummy(50.0), Vec2::new(100.0, 0.0));
        assert!(combat.set_target(c, b));

        combat.update(1.0);
        assert!(!combat.has_entity(b));
        assert_eq!(combat.current_target(c), None);
        assert_eq!(combat.find_target(a), Some(c));
    }

    #[test]
    fn test_invalid_damage_is_ignored() {
        let mut combat = CombatRegistry::new();
        let e = combat.next_entity_id();
        combat.register(e, dummy(10.0), Vec2::ZERO);

        assert!(!combat.apply_damage(None, e, 0.0));
        assert!(!combat.apply_damage(None, e, -5.0));
        assert!(!combat.apply_damage(None, e, f32::NAN));
        assert!(!combat.apply_damage(None, EntityId(99), 5.0));
        assert!(combat.drain_events().is_empty());
        assert_eq!(combat.stats(e).map(|s| s.health), Some(10.0));
    }

    #[test]
    fn test_unknown_ids_are_graceful() {
        let mut combat = CombatRegistry::new();
        let ghost = EntityId(42);
        assert!(combat.stats(ghost).is_none());
        assert!(combat.position(ghost).is_none());
        assert!(combat.current_target(ghost).is_none());
        assert!(combat.last_attack_time(ghost).is_none());
        assert!(!combat.perform_attack(ghost, ghost));
        assert!(!combat.update_position(ghost, Vec2::ONE));
        assert!(!combat.remove_entity(ghost));
    }

    #[test]
    fn test_allocator_skips_registered_ids() {
        let mut combat = CombatRegistry::new();
        combat.register(EntityId(7), dummy(1.0), Vec2::ZERO);
        assert_eq!(combat.next_entity_id(), EntityId(8));
    }

    #[test]
    fn test_register_twice_overwrites() {
        let mut combat = CombatRegistry::new();
        let p = combat.next_entity_id();
        let e = combat.next_entity_id();
        combat.register(p, player(), Vec2::ZERO);
        combat.register(e, dummy(1000.0), Vec2::new(20.0, 0.0));
        combat.update(1.0);
        combat.drain_events();
        assert_eq!(combat.current_target(p), Some(e));
        assert!(combat.last_attack_time(p).is_some());

        let mut stronger = player();
        stronger.damage = 40.0;
        combat.register(p, stronger, Vec2::new(5.0, 0.0));
        assert_eq!(combat.entity_count(), 2);
        assert_eq!(combat.stats(p).map(|s| s.damage), Some(40.0));
        assert_eq!(combat.position(p), Some(Vec2::new(5.0, 0.0)));
        assert_eq!(combat.current_target(p), None);
        assert_eq!(combat.last_attack_time(p), None);

        // No stale timer: the new registration attacks right away
        combat.update(0.1);
        assert_eq!(attacks(&combat.drain_events()), vec![(p, e, 40.0)]);
    }

    #[test]
    fn test_death_handler_sees_event() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let deaths = Rc::new(RefCell::new(Vec::new()));
        let mut combat = CombatRegistry::new();
        let sink = deaths.clone();
        combat.on(CombatEventKind::Death, move |e| {
            if let CombatEvent::Death { entity, .. } = e {
                sink.borrow_mut().push(*entity);
            }
        });
        let e = combat.next_entity_id();
        combat.register(e, dummy(3.0), Vec2::ZERO);
        combat.apply_damage(None, e, 3.0);
        assert_eq!(*deaths.borrow(), vec![e]);
    }

    proptest! {
        #[test]
        fn prop_damage_is_monotonic(hits in proptest::collection::vec(0.1f32..50.0, 1..20)) {
            let mut combat = CombatRegistry::new();
            let e = combat.next_entity_id();
            combat.register(e, dummy(10_000.0), Vec2::ZERO);
            let mut health = 10_000.0f32;
            for hit in hits {
                combat.apply_damage(None, e, hit);
                let now = combat.stats(e).map(|s| s.health).unwrap_or(f32::NEG_INFINITY);
                prop_assert!(now < health);
                prop_assert!((health - hit - now).abs() < 1e-2);
                health = now;
            }
        }
    }
}
