//! Essence pickups: drop spawning, proximity collection and expiry

use std::collections::BTreeMap;

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::combat::CombatRegistry;
use super::events::{Dispatcher, HandlerId, SimEvent};
use crate::consts::DROP_SCATTER;
use crate::secs_to_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EssenceTier {
    Small,
    Medium,
    Large,
    Boss,
}

impl EssenceTier {
    pub const ALL: [EssenceTier; 4] = [
        EssenceTier::Small,
        EssenceTier::Medium,
        EssenceTier::Large,
        EssenceTier::Boss,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EssenceTierConfig {
    /// Experience granted on collection
    pub exp: u32,
    /// Time on the ground before it expires
    pub lifetime_ms: f64,
    /// Pickup distance from the player
    pub radius: f32,
}

/// Per enemy kind: which tier drops, how often, how many at most
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DropTable {
    pub tier: EssenceTier,
    /// Chance in [0, 1] that anything drops
    pub drop_rate: f32,
    /// Upper bound of the uniform drop count
    pub max_drops: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EssenceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Essence {
    pub id: EssenceId,
    pub tier: EssenceTier,
    /// World position (drops are scattered around the death point)
    pub position: Vec2,
    /// Experience granted on collection
    pub exp: u32,
    /// Field clock (ms) at spawn
    pub spawned_at: f64,
    pub lifetime_ms: f64,
    /// Pickup distance from the player
    pub radius: f32,
}

impl Essence {
    pub fn is_expired(&self, now_ms: f64) -> bool {
        now_ms - self.spawned_at > self.lifetime_ms
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EssenceEvent {
    Spawn { essence: Essence },
    Collect { essence: Essence, exp: u32 },
    Expire { essence: Essence },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EssenceEventKind {
    Spawn,
    Collect,
    Expire,
}

impl SimEvent for EssenceEvent {
    type Kind = EssenceEventKind;

    fn kind(&self) -> EssenceEventKind {
        match self {
            EssenceEvent::Spawn { .. } => EssenceEventKind::Spawn,
            EssenceEvent::Collect { .. } => EssenceEventKind::Collect,
            EssenceEvent::Expire { .. } => EssenceEventKind::Expire,
        }
    }
}

#[derive(Debug, Default)]
pub struct EssenceField {
    tiers: BTreeMap<EssenceTier, EssenceTierConfig>,
    essences: BTreeMap<EssenceId, Essence>,
    next_id: u32,
    now_ms: f64,
    events: Dispatcher<EssenceEvent>,
}

impl EssenceField {
    pub fn new(tiers: BTreeMap<EssenceTier, EssenceTierConfig>) -> Self {
        Self {
            tiers,
            ..Self::default()
        }
    }

    /// `None` when the tier has no configuration
    pub fn spawn_essence(&mut self, tier: EssenceTier, position: Vec2) -> Option<EssenceId> {
        let Some(config) = self.tiers.get(&tier) else {
            log::warn!("no essence config for {:?}", tier);
            return None;
        };
        let id = EssenceId(self.next_id);
        self.next_id += 1;

        let essence = Essence {
            id,
            tier,
            position,
            exp: config.exp,
            spawned_at: self.now_ms,
            lifetime_ms: config.lifetime_ms,
            radius: config.radius,
        };
        self.essences.insert(id, essence);
        self.events.emit(EssenceEvent::Spawn { essence });
        Some(id)
    }

    /// Roll a drop table at `position`. Multiple drops scatter around it.
    pub fn roll_drops(
        &mut self,
        table: &DropTable,
        position: Vec2,
        rng: &mut impl Rng,
    ) -> Vec<EssenceId> {
        if table.max_drops == 0 || rng.random::<f32>() >= table.drop_rate {
            return Vec::new();
        }
        let count = rng.random_range(1..=table.max_drops);
        (0..count)
            .filter_map(|_| {
                let offset = if count > 1 {
                    let angle = rng.random::<f32>() * std::f32::consts::TAU;
                    Vec2::from_angle(angle) * DROP_SCATTER
                } else {
                    Vec2::ZERO
                };
                self.spawn_essence(table.tier, position + offset)
            })
            .collect()
    }

    /// Expire old essences, then collect any within reach of the player
    pub fn update(&mut self, dt: f32, combat: &CombatRegistry) {
        self.now_ms += secs_to_ms(dt);
        let now = self.now_ms;
        let player = combat.player_position();

        let ids: Vec<EssenceId> = self.essences.keys().copied().collect();
        for id in ids {
            let Some(essence) = self.essences.get(&id).copied() else {
                continue;
            };
            if essence.is_expired(now) {
                self.essences.remove(&id);
                log::trace!("essence {:?} expired", id);
                self.events.emit(EssenceEvent::Expire { essence });
            } else if player.is_some_and(|p| p.distance(essence.position) <= essence.radius) {
                self.essences.remove(&id);
                self.events.emit(EssenceEvent::Collect {
                    essence,
                    exp: essence.exp,
                });
            }
        }
    }

    /// Collect by id. Unknown or already consumed ids yield 0 and no event.
    pub fn collect(&mut self, id: EssenceId) -> u32 {
        let Some(essence) = self.essences.remove(&id) else {
            return 0;
        };
        self.events.emit(EssenceEvent::Collect {
            essence,
            exp: essence.exp,
        });
        essence.exp
    }

    pub fn essences_in_range(&self, position: Vec2, radius: f32) -> Vec<&Essence> {
        self.essences
            .values()
            .filter(|e| e.position.distance(position) <= radius)
            .collect()
    }

    pub fn get(&self, id: EssenceId) -> Option<&Essence> {
        self.essences.get(&id)
    }

    pub fn len(&self) -> usize {
        self.essences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.essences.is_empty()
    }

    /// Drop every live essence without events
    pub fn clear(&mut self) {
        self.essences.clear();
    }

    pub fn on(
        &mut self,
        kind: EssenceEventKind,
        handler: impl FnMut(&EssenceEvent) + 'static,
    ) -> HandlerId {
        self.events.on(kind, handler)
    }

    pub fn drain_events(&mut self) -> Vec<EssenceEvent> {
        self.events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::combat::{CombatStats, EntityId};
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn field() -> EssenceField {
        EssenceField::new(BTreeMap::from([
            (
                EssenceTier::Small,
                EssenceTierConfig {
                    exp: 10,
                    lifetime_ms: 10_000.0,
                    radius: 20.0,
                },
            ),
            (
                EssenceTier::Boss,
                EssenceTierConfig {
                    exp: 200,
                    lifetime_ms: 30_000.0,
                    radius: 40.0,
                },
            ),
        ]))
    }

    fn with_player(at: Vec2) -> CombatRegistry {
        let mut combat = CombatRegistry::new();
        combat.register(
            EntityId(0),
            CombatStats {
                health: 100.0,
                damage: 10.0,
                attack_speed: 1.0,
                range: 200.0,
                move_speed: 3.0,
                is_player: true,
            },
            at,
        );
        combat
    }

    #[test]
    fn test_player_in_radius_collects() {
        let mut essences = field();
        let near = essences.spawn_essence(EssenceTier::Small, Vec2::new(20.0, 0.0));
        let far = essences.spawn_essence(EssenceTier::Small, Vec2::new(100.0, 0.0));
        assert_ne!(near, far);
        essences.drain_events();

        essences.update(0.1, &with_player(Vec2::ZERO));
        let events = essences.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], EssenceEvent::Collect { exp: 10, .. }));
        assert_eq!(essences.len(), 1);
    }

    #[test]
    fn test_expiry_beats_collection() {
        let mut essences = field();
        let id = essences.spawn_essence(EssenceTier::Small, Vec2::ZERO);
        essences.update(10.0, &CombatRegistry::new());
        assert!(essences.get(id.unwrap()).is_some());

        essences.drain_events();
        essences.update(0.5, &with_player(Vec2::ZERO));
        let events = essences.drain_events();
        assert!(matches!(events.as_slice(), [EssenceEvent::Expire { .. }]));
    }

    #[test]
    fn test_collect_is_idempotent() {
        let mut essences = field();
        let id = essences.spawn_essence(EssenceTier::Boss, Vec2::ZERO).unwrap();
        essences.drain_events();

        assert_eq!(essences.collect(id), 200);
        assert_eq!(essences.collect(id), 0);
        assert_eq!(essences.collect(EssenceId(99)), 0);
        assert_eq!(essences.drain_events().len(), 1);
    }

    #[test]
    fn test_range_query_is_inclusive_and_pure() {
        let mut essences = field();
        essences.spawn_essence(EssenceTier::Small, Vec2::new(3.0, 4.0));
        essences.spawn_essence(EssenceTier::Small, Vec2::new(6.0, 8.0));
        assert_eq!(essences.essences_in_range(Vec2::ZERO, 5.0).len(), 1);
        assert_eq!(essences.essences_in_range(Vec2::ZERO, 10.0).len(), 2);
        assert_eq!(essences.len(), 2);
    }

    #[test]
    fn test_drop_rolls() {
        let mut essences = field();
        let mut rng = Pcg32::seed_from_u64(3);
        let always = DropTable {
            tier: EssenceTier::Boss,
            drop_rate: 1.0,
            max_drops: 5,
        };
        let never = DropTable {
            drop_rate: 0.0,
            ..always
        };

        for _ in 0..20 {
            let dropped = essences.roll_drops(&always, Vec2::ZERO, &mut rng);
            assert!((1..=5).contains(&dropped.len()));
            assert!(essences.roll_drops(&never, Vec2::ZERO, &mut rng).is_empty());
        }
        for essence in essences.essences_in_range(Vec2::ZERO, 1000.0) {
            assert!(essence.position.length() <= DROP_SCATTER + 1e-3);
        }
    }

    #[test]
    fn test_unconfigured_tier() {
        let mut essences = field();
        assert_eq!(essences.spawn_essence(EssenceTier::Large, Vec2::ZERO), None);
    }
}
