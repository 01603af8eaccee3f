//! Tick-driven entity store with a chunk-coordinate spatial index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ferrum_proto::types::{ChunkPos, Location, Vec3};

/// First id handed out; player entity ids live below this range.
const FIRST_ENTITY_ID: u32 = 10_000;
/// Id 0 is the allocation-failure sentinel.
pub const NO_ENTITY: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EntityKind {
    Item = 1,
    ExperienceOrb = 2,
    Creeper = 50,
    Skeleton = 51,
    Zombie = 54,
    Arrow = 60,
    Pig = 90,
    Sheep = 91,
    Cow = 92,
}

impl EntityKind {
    pub fn is_living(&self) -> bool {
        matches!(
            self,
            EntityKind::Creeper
                | EntityKind::Skeleton
                | EntityKind::Zombie
                | EntityKind::Pig
                | EntityKind::Sheep
                | EntityKind::Cow
        )
    }
}

/// Health and death bookkeeping for living entities.
#[derive(Debug, Clone)]
pub struct LivingState {
    pub health: f32,
    pub max_health: f32,
    pub hurt_time: i32,
    pub death_time: i32,
}

impl LivingState {
    fn new(max_health: f32) -> Self {
        Self {
            health: max_health,
            max_health,
            hurt_time: 0,
            death_time: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: u32,
    pub kind: EntityKind,
    pub location: Location,
    pub velocity: Vec3,
    pub on_ground: bool,
    pub no_gravity: bool,
    pub dirty: bool,
    pub living: Option<LivingState>,
}

impl Entity {
    pub fn new(kind: EntityKind, location: Location) -> Self {
        let living = kind.is_living().then(|| LivingState::new(20.0));
        Self {
            id: NO_ENTITY,
            kind,
            location,
            velocity: Vec3::ZERO,
            on_ground: false,
            no_gravity: false,
            dirty: false,
            living,
        }
    }

    pub fn chunk(&self) -> ChunkPos {
        self.location.chunk()
    }

    pub fn damage(&mut self, amount: f32) {
        if amount <= 0.0 {
            return;
        }
        if let Some(living) = &mut self.living {
            living.health = (living.health - amount).max(0.0);
            living.hurt_time = 10;
            self.dirty = true;
        }
    }

    pub fn heal(&mut self, amount: f32) {
        if amount <= 0.0 {
            return;
        }
        if let Some(living) = &mut self.living {
            living.health = (living.health + amount).min(living.max_health);
            self.dirty = true;
        }
    }

    pub fn is_dead(&self) -> bool {
        self.living.as_ref().is_some_and(|l| l.health <= 0.0)
    }

    /// Kinematics plus living-entity timers.
    pub fn tick(&mut self) {
        if !self.no_gravity {
            self.velocity.y = (self.velocity.y - 0.08) * 0.98;
        }

        self.location.x += self.velocity.x;
        self.location.y += self.velocity.y;
        self.location.z += self.velocity.z;

        self.velocity.x *= 0.91;
        self.velocity.z *= 0.91;

        if self.velocity.x.abs() < 0.01 {
            self.velocity.x = 0.0;
        }
        if self.velocity.y.abs() < 0.01 {
            self.velocity.y = 0.0;
        }
        if self.velocity.z.abs() < 0.01 {
            self.velocity.z = 0.0;
        }

        if let Some(living) = &mut self.living {
            if living.hurt_time > 0 {
                living.hurt_time -= 1;
            }
            if living.health <= 0.0 && living.death_time < 20 {
                living.death_time += 1;
            }
        }

        self.dirty = true;
    }

    /// Dead living entities linger for 20 ticks, then go away.
    pub fn should_remove(&self) -> bool {
        self.living
            .as_ref()
            .is_some_and(|l| l.health <= 0.0 && l.death_time >= 20)
    }
}

#[derive(Default)]
struct TableInner {
    entities: HashMap<u32, Arc<Mutex<Entity>>>,
    by_chunk: HashMap<ChunkPos, Vec<u32>>,
}

/// Entity id → entity map plus the per-chunk index rebuilt each tick.
pub struct EntityTable {
    inner: Mutex<TableInner>,
    next_id: AtomicU32,
    max_entities: AtomicUsize,
}

impl EntityTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner::default()),
            next_id: AtomicU32::new(FIRST_ENTITY_ID),
            max_entities: AtomicUsize::new(10_000),
        }
    }

    pub fn set_max_entities(&self, max: usize) {
        self.max_entities.store(max, Ordering::Relaxed);
    }

    /// Assign an id and insert; returns [`NO_ENTITY`] at the cap.
    pub fn spawn(&self, mut entity: Entity) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        if inner.entities.len() >= self.max_entities.load(Ordering::Relaxed) {
            return NO_ENTITY;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entity.id = id;
        let chunk = entity.chunk();
        inner.entities.insert(id, Arc::new(Mutex::new(entity)));
        inner.by_chunk.entry(chunk).or_default().push(id);
        id
    }

    pub fn remove(&self, id: u32) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entity) = inner.entities.remove(&id) {
            let chunk = entity.lock().unwrap().chunk();
            if let Some(ids) = inner.by_chunk.get_mut(&chunk) {
                ids.retain(|&other| other != id);
                if ids.is_empty() {
                    inner.by_chunk.remove(&chunk);
                }
            }
        }
    }

    pub fn get(&self, id: u32) -> Option<Arc<Mutex<Entity>>> {
        self.inner.lock().unwrap().entities.get(&id).cloned()
    }

    pub fn in_chunk(&self, chunk: ChunkPos) -> Vec<Arc<Mutex<Entity>>> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_chunk
            .get(&chunk)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.entities.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn in_range(&self, center: &Location, radius: f64) -> Vec<Arc<Mutex<Entity>>> {
        let inner = self.inner.lock().unwrap();
        inner
            .entities
            .values()
            .filter(|entity| entity.lock().unwrap().location.distance_to(center) <= radius)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().entities.len()
    }

    /// Tick every entity outside the table lock, drop the removable ones,
    /// and rebuild the chunk index.
    pub fn tick_all(&self) {
        let snapshot: Vec<Arc<Mutex<Entity>>> = {
            let inner = self.inner.lock().unwrap();
            inner.entities.values().cloned().collect()
        };

        let mut to_remove = Vec::new();
        for entity in &snapshot {
            let mut entity = entity.lock().unwrap();
            entity.tick();
            if entity.should_remove() {
                to_remove.push(entity.id);
            }
        }

        let mut inner = self.inner.lock().unwrap();
        for id in to_remove {
            inner.entities.remove(&id);
        }
        inner.by_chunk.clear();
        let assignments: Vec<(ChunkPos, u32)> = inner
            .entities
            .iter()
            .map(|(id, entity)| (entity.lock().unwrap().chunk(), *id))
            .collect();
        for (chunk, id) in assignments {
            inner.by_chunk.entry(chunk).or_default().push(id);
        }
    }
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_ten_thousand() {
        let table = EntityTable::new();
        let first = table.spawn(Entity::new(EntityKind::Pig, Location::new(0.0, 65.0, 0.0)));
        let second = table.spawn(Entity::new(EntityKind::Cow, Location::new(0.0, 65.0, 0.0)));
        assert_eq!(first, 10_000);
        assert_eq!(second, 10_001);
    }

    #[test]
    fn spawn_cap_returns_sentinel() {
        let table = EntityTable::new();
        table.set_max_entities(1);
        assert_ne!(
            table.spawn(Entity::new(EntityKind::Item, Location::new(0.0, 0.0, 0.0))),
            NO_ENTITY
        );
        assert_eq!(
            table.spawn(Entity::new(EntityKind::Item, Location::new(0.0, 0.0, 0.0))),
            NO_ENTITY
        );
    }

    #[test]
    fn gravity_kinematics() {
        let mut entity = Entity::new(EntityKind::Item, Location::new(0.0, 100.0, 0.0));
        entity.tick();
        // vel.y = (0 - 0.08) * 0.98 = -0.0784, applied before decay.
        assert!((entity.location.y - (100.0 - 0.0784)).abs() < 1e-9);
        assert!((entity.velocity.y - -0.0784).abs() < 1e-9);
    }

    #[test]
    fn horizontal_decay_and_snap() {
        let mut entity = Entity::new(EntityKind::Item, Location::new(0.0, 0.0, 0.0));
        entity.no_gravity = true;
        entity.velocity = Vec3::new(0.5, 0.0, 0.011);
        entity.tick();
        assert!((entity.velocity.x - 0.455).abs() < 1e-9);
        // 0.011 * 0.91 = 0.01001 survives; next tick snaps to zero.
        assert!(entity.velocity.z > 0.0);
        entity.tick();
        assert_eq!(entity.velocity.z, 0.0);
    }

    #[test]
    fn no_gravity_keeps_vertical_velocity() {
        let mut entity = Entity::new(EntityKind::Arrow, Location::new(0.0, 0.0, 0.0));
        entity.no_gravity = true;
        entity.velocity = Vec3::new(0.0, 1.0, 0.0);
        entity.tick();
        assert_eq!(entity.velocity.y, 1.0);
        assert_eq!(entity.location.y, 1.0);
    }

    #[test]
    fn living_entities_are_removable_twenty_ticks_after_death() {
        let table = EntityTable::new();
        let id = table.spawn(Entity::new(EntityKind::Zombie, Location::new(0.0, 65.0, 0.0)));
        table.get(id).unwrap().lock().unwrap().damage(100.0);

        for _ in 0..19 {
            table.tick_all();
            assert!(table.get(id).is_some(), "removed too early");
        }
        table.tick_all();
        assert!(table.get(id).is_none());
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn damage_and_heal_clamp() {
        let mut zombie = Entity::new(EntityKind::Zombie, Location::new(0.0, 0.0, 0.0));
        zombie.damage(5.0);
        assert_eq!(zombie.living.as_ref().unwrap().health, 15.0);
        assert_eq!(zombie.living.as_ref().unwrap().hurt_time, 10);
        zombie.heal(50.0);
        assert_eq!(zombie.living.as_ref().unwrap().health, 20.0);
        zombie.damage(50.0);
        assert!(zombie.is_dead());
        // Items have no health to lose.
        let mut item = Entity::new(EntityKind::Item, Location::new(0.0, 0.0, 0.0));
        item.damage(5.0);
        assert!(!item.is_dead());
    }

    #[test]
    fn chunk_index_follows_movement() {
        let table = EntityTable::new();
        let id = table.spawn(Entity::new(EntityKind::Pig, Location::new(8.0, 65.0, 8.0)));
        assert_eq!(table.in_chunk(ChunkPos::new(0, 0)).len(), 1);

        table
            .get(id)
            .unwrap()
            .lock()
            .unwrap()
            .location = Location::new(40.0, 65.0, 8.0);
        table.tick_all();

        assert!(table.in_chunk(ChunkPos::new(0, 0)).is_empty());
        assert_eq!(table.in_chunk(ChunkPos::new(2, 0)).len(), 1);
    }

    #[test]
    fn in_range_filters_by_distance() {
        let table = EntityTable::new();
        table.spawn(Entity::new(EntityKind::Pig, Location::new(0.0, 0.0, 0.0)));
        table.spawn(Entity::new(EntityKind::Cow, Location::new(100.0, 0.0, 0.0)));
        let near = table.in_range(&Location::new(1.0, 0.0, 0.0), 10.0);
        assert_eq!(near.len(), 1);
    }
}
