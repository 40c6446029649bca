//! Fixed-capacity enemy pool
//!
//! Slots live in an arena and are handed out from a free-list. A slot is
//! either free or bound to exactly one live entity, so
//! `free_count() + bound_count() == capacity()` always holds.

use std::collections::BTreeMap;

use super::combat::{CombatStats, EntityId};
use super::wave::EnemyKind;

/// Descriptor held by a bound slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PooledEnemy {
    pub kind: EnemyKind,
    pub stats: CombatStats,
    pub elite: bool,
}

#[derive(Debug)]
pub struct EnemyPool {
    slots: Vec<Option<PooledEnemy>>,
    free: Vec<usize>,
    bound: BTreeMap<EntityId, usize>,
}

impl EnemyPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            // Pop from the back so slot 0 is handed out first
            free: (0..capacity).rev().collect(),
            bound: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }

    pub fn has_free(&self) -> bool {
        !self.free.is_empty()
    }

    /// Take a free slot for `entity`. Refused when exhausted or already bound.
    pub fn bind(&mut self, entity: EntityId, enemy: PooledEnemy) -> bool {
        if self.bound.contains_key(&entity) {
            log::warn!("entity {} already holds a pool slot", entity);
            return false;
        }
        let Some(slot) = self.free.pop() else {
            log::debug!("enemy pool exhausted ({} slots)", self.capacity());
            return false;
        };
        self.slots[slot] = Some(enemy);
        self.bound.insert(entity, slot);
        true
    }

    /// Return the entity's slot to the free-list
    pub fn release(&mut self, entity: EntityId) -> Option<PooledEnemy> {
        let slot = self.bound.remove(&entity)?;
        self.free.push(slot);
        self.slots[slot].take()
    }

    pub fn get(&self, entity: EntityId) -> Option<&PooledEnemy> {
        let slot = *self.bound.get(&entity)?;
        self.slots[slot].as_ref()
    }

    pub fn bound_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.bound.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn enemy() -> PooledEnemy {
        PooledEnemy {
            kind: EnemyKind::Basic,
            stats: CombatStats {
                health: 100.0,
                damage: 10.0,
                attack_speed: 1.0,
                range: 50.0,
                move_speed: 100.0,
                is_player: false,
            },
            elite: false,
        }
    }

    #[test]
    fn test_bind_until_exhausted() {
        let mut pool = EnemyPool::new(2);
        assert!(pool.bind(EntityId(1), enemy()));
        assert!(!pool.bind(EntityId(1), enemy()));
        assert!(pool.bind(EntityId(2), enemy()));
        assert!(!pool.bind(EntityId(3), enemy()));
        assert_eq!(pool.free_count(), 0);

        assert_eq!(pool.release(EntityId(1)).map(|e| e.kind), Some(EnemyKind::Basic));
        assert_eq!(pool.release(EntityId(1)), None);
        assert!(pool.bind(EntityId(3), enemy()));
    }

    proptest! {
        #[test]
        fn prop_slots_are_conserved(ops in proptest::collection::vec((any::<bool>(), 0u32..12), 0..200)) {
            let mut pool = EnemyPool::new(8);
            for (bind, id) in ops {
                if bind {
                    pool.bind(EntityId(id), enemy());
                } else {
                    pool.release(EntityId(id));
                }
                prop_assert_eq!(pool.free_count() + pool.bound_count(), pool.capacity());
            }
        }
    }
}
