//! Player sessions, the three-way registry, and per-player chunk views.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use ferrum_proto::packets::{ChunkData, UnloadChunk, UpdateViewPosition};
use ferrum_proto::registry::Packet;
use ferrum_proto::types::{ChunkPos, GameMode, GameProfile, Location, Uuid};
use ferrum_world::chunk::monotonic_ms;
use ferrum_world::serializer::serialize_chunk;
use ferrum_world::store::ChunkLoad;
use thiserror::Error;
use tracing::debug;

use crate::connection::Connection;
use crate::server::ServerState;

/// Sessions offline longer than this are dropped from the registry.
const OFFLINE_RETENTION_MS: u64 = 10 * 60 * 1000;

pub const VIEW_DISTANCE_MIN: i32 = 2;
pub const VIEW_DISTANCE_MAX: i32 = 32;

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemStack {
    pub item_id: u16,
    pub count: u8,
    pub damage: i16,
}

impl ItemStack {
    pub fn new(item_id: u16, count: u8) -> Self {
        Self {
            item_id,
            count,
            damage: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.item_id == 0 || self.count == 0
    }

    /// Plain items stack to 64; tools and the like (id ≥ 256) to 1.
    pub fn max_stack_size(&self) -> u8 {
        if self.item_id == 0 {
            0
        } else if self.item_id < 256 {
            64
        } else {
            1
        }
    }

    pub fn is_stackable_with(&self, other: &ItemStack) -> bool {
        self.item_id == other.item_id && self.damage == other.damage
    }
}

pub const PLAYER_INVENTORY_SIZE: usize = 36;
pub const HOTBAR_SIZE: usize = 9;

#[derive(Debug, Clone)]
pub struct Inventory {
    slots: Vec<ItemStack>,
}

impl Inventory {
    pub fn new() -> Self {
        Self {
            slots: vec![ItemStack::default(); PLAYER_INVENTORY_SIZE],
        }
    }

    pub fn get(&self, slot: usize) -> ItemStack {
        self.slots.get(slot).copied().unwrap_or_default()
    }

    pub fn set(&mut self, slot: usize, item: ItemStack) {
        if let Some(target) = self.slots.get_mut(slot) {
            *target = item;
        }
    }

    /// Merge an item into existing stacks, then empty slots. Returns whether
    /// the whole stack fit.
    pub fn add(&mut self, item: ItemStack) -> bool {
        if item.is_empty() {
            return true;
        }
        let mut remaining = item;
        for slot in &mut self.slots {
            if remaining.is_empty() {
                break;
            }
            if slot.is_empty() {
                *slot = remaining;
                remaining = ItemStack::default();
            } else if slot.is_stackable_with(&remaining) {
                let free = slot.max_stack_size().saturating_sub(slot.count);
                let moved = free.min(remaining.count);
                slot.count += moved;
                remaining.count -= moved;
                if remaining.count == 0 {
                    remaining = ItemStack::default();
                }
            }
        }
        remaining.is_empty()
    }

    /// Take up to `amount` items from a slot.
    pub fn remove(&mut self, slot: usize, amount: u8) -> ItemStack {
        let Some(stack) = self.slots.get_mut(slot) else {
            return ItemStack::default();
        };
        if stack.is_empty() {
            return ItemStack::default();
        }
        let taken = amount.min(stack.count);
        let result = ItemStack {
            item_id: stack.item_id,
            count: taken,
            damage: stack.damage,
        };
        stack.count -= taken;
        if stack.count == 0 {
            *stack = ItemStack::default();
        }
        result
    }

    pub fn contains(&self, item_id: u16, count: u8) -> bool {
        let mut found: u32 = 0;
        for slot in &self.slots {
            if slot.item_id == item_id {
                found += slot.count as u32;
                if found >= count as u32 {
                    return true;
                }
            }
        }
        false
    }

    pub fn clear(&mut self) {
        self.slots.fill(ItemStack::default());
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PlayerStats {
    pub health: f32,
    pub max_health: f32,
    pub food_level: i32,
    pub food_saturation: f32,
    pub exhaustion: f32,
    pub experience_level: i32,
    pub total_experience: i32,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            health: 20.0,
            max_health: 20.0,
            food_level: 20,
            food_saturation: 5.0,
            exhaustion: 0.0,
            experience_level: 0,
            total_experience: 0,
        }
    }
}

#[derive(Debug)]
pub struct PlayerSession {
    pub connection: Arc<Connection>,
    pub profile: GameProfile,
    pub entity_id: u32,
    location: Mutex<Location>,
    spawn_location: Location,
    gamemode: AtomicU8,
    stats: Mutex<PlayerStats>,
    inventory: Mutex<Inventory>,
    selected_slot: AtomicU8,
    view_distance: AtomicI32,
    loaded_chunks: Mutex<HashSet<ChunkPos>>,
    view_center: Mutex<Option<ChunkPos>>,
    online: AtomicBool,
    last_activity_ms: AtomicU64,
    join_time_ms: AtomicU64,
}

impl PlayerSession {
    fn new(
        connection: Arc<Connection>,
        profile: GameProfile,
        entity_id: u32,
        spawn: Location,
        view_distance: i32,
        gamemode: GameMode,
    ) -> Self {
        let now = monotonic_ms();
        Self {
            connection,
            profile,
            entity_id,
            location: Mutex::new(spawn),
            spawn_location: spawn,
            gamemode: AtomicU8::new(gamemode as u8),
            stats: Mutex::new(PlayerStats::default()),
            inventory: Mutex::new(Inventory::new()),
            selected_slot: AtomicU8::new(0),
            view_distance: AtomicI32::new(
                view_distance.clamp(VIEW_DISTANCE_MIN, VIEW_DISTANCE_MAX),
            ),
            loaded_chunks: Mutex::new(HashSet::new()),
            view_center: Mutex::new(None),
            online: AtomicBool::new(true),
            last_activity_ms: AtomicU64::new(now),
            join_time_ms: AtomicU64::new(now),
        }
    }

    pub fn location(&self) -> Location {
        *self.location.lock().unwrap()
    }

    pub fn set_location(&self, location: Location) {
        *self.location.lock().unwrap() = location;
        self.touch_activity();
    }

    pub fn chunk(&self) -> ChunkPos {
        self.location().chunk()
    }

    pub fn spawn_location(&self) -> Location {
        self.spawn_location
    }

    pub fn gamemode(&self) -> GameMode {
        match self.gamemode.load(Ordering::Relaxed) {
            1 => GameMode::Creative,
            2 => GameMode::Adventure,
            3 => GameMode::Spectator,
            _ => GameMode::Survival,
        }
    }

    pub fn set_gamemode(&self, gamemode: GameMode) {
        self.gamemode.store(gamemode as u8, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PlayerStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn set_stats(&self, stats: PlayerStats) {
        *self.stats.lock().unwrap() = stats;
    }

    pub fn with_inventory<R>(&self, f: impl FnOnce(&mut Inventory) -> R) -> R {
        f(&mut self.inventory.lock().unwrap())
    }

    pub fn selected_slot(&self) -> u8 {
        self.selected_slot.load(Ordering::Relaxed)
    }

    pub fn set_selected_slot(&self, slot: u8) {
        self.selected_slot
            .store(slot.min(HOTBAR_SIZE as u8 - 1), Ordering::Relaxed);
    }

    pub fn view_distance(&self) -> i32 {
        self.view_distance.load(Ordering::Relaxed)
    }

    pub fn set_view_distance(&self, distance: i32) {
        self.view_distance.store(
            distance.clamp(VIEW_DISTANCE_MIN, VIEW_DISTANCE_MAX),
            Ordering::Relaxed,
        );
    }

    pub fn loaded_chunks(&self) -> HashSet<ChunkPos> {
        self.loaded_chunks.lock().unwrap().clone()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire) && !self.connection.is_closed()
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    pub fn disconnect(&self) {
        self.online.store(false, Ordering::Release);
        self.connection.close();
    }

    pub fn touch_activity(&self) {
        self.last_activity_ms.store(monotonic_ms(), Ordering::Relaxed);
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    pub fn join_time_ms(&self) -> u64 {
        self.join_time_ms.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("server is full")]
    ServerFull,
    #[error("player is already online")]
    Duplicate,
}

#[derive(Default)]
struct Maps {
    by_uuid: HashMap<Uuid, Arc<PlayerSession>>,
    by_name: HashMap<String, Arc<PlayerSession>>,
    by_entity_id: HashMap<u32, Arc<PlayerSession>>,
}

impl Maps {
    fn erase(&mut self, uuid: &Uuid) {
        if let Some(session) = self.by_uuid.remove(uuid) {
            self.by_name.remove(&session.profile.username);
            self.by_entity_id.remove(&session.entity_id);
        }
    }
}

/// Sessions indexed by UUID (authoritative), username, and entity id,
/// guarded by a single mutex.
pub struct PlayerRegistry {
    maps: Mutex<Maps>,
    next_entity_id: AtomicU32,
    max_players: u32,
    default_spawn: Location,
    default_view_distance: i32,
    default_gamemode: GameMode,
}

impl PlayerRegistry {
    pub fn new(
        max_players: u32,
        default_spawn: Location,
        default_view_distance: i32,
        default_gamemode: GameMode,
    ) -> Self {
        Self {
            maps: Mutex::new(Maps::default()),
            next_entity_id: AtomicU32::new(1),
            max_players,
            default_spawn,
            default_view_distance,
            default_gamemode,
        }
    }

    /// Create a session for a fresh login.
    ///
    /// An online session with the same UUID is a duplicate login; a stale
    /// offline one is replaced so the player can rejoin before the offline
    /// sweep drops it.
    pub fn create(
        &self,
        connection: Arc<Connection>,
        profile: GameProfile,
    ) -> Result<Arc<PlayerSession>, RegistryError> {
        let mut maps = self.maps.lock().unwrap();

        if let Some(existing) = maps.by_uuid.get(&profile.uuid) {
            if existing.is_online() {
                return Err(RegistryError::Duplicate);
            }
            let uuid = profile.uuid;
            maps.erase(&uuid);
        }

        let online = maps.by_uuid.values().filter(|s| s.is_online()).count();
        if online as u32 >= self.max_players {
            return Err(RegistryError::ServerFull);
        }

        let entity_id = self.next_entity_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(PlayerSession::new(
            connection,
            profile.clone(),
            entity_id,
            self.default_spawn,
            self.default_view_distance,
            self.default_gamemode,
        ));
        maps.by_uuid.insert(profile.uuid, session.clone());
        maps.by_name.insert(profile.username, session.clone());
        maps.by_entity_id.insert(entity_id, session.clone());
        Ok(session)
    }

    pub fn remove(&self, uuid: &Uuid) {
        self.maps.lock().unwrap().erase(uuid);
    }

    pub fn by_uuid(&self, uuid: &Uuid) -> Option<Arc<PlayerSession>> {
        self.maps.lock().unwrap().by_uuid.get(uuid).cloned()
    }

    pub fn by_name(&self, username: &str) -> Option<Arc<PlayerSession>> {
        self.maps.lock().unwrap().by_name.get(username).cloned()
    }

    pub fn by_entity_id(&self, entity_id: u32) -> Option<Arc<PlayerSession>> {
        self.maps.lock().unwrap().by_entity_id.get(&entity_id).cloned()
    }

    pub fn online_sessions(&self) -> Vec<Arc<PlayerSession>> {
        self.maps
            .lock()
            .unwrap()
            .by_uuid
            .values()
            .filter(|s| s.is_online())
            .cloned()
            .collect()
    }

    pub fn online_count(&self) -> usize {
        self.maps
            .lock()
            .unwrap()
            .by_uuid
            .values()
            .filter(|s| s.is_online())
            .count()
    }

    pub fn session_count(&self) -> usize {
        self.maps.lock().unwrap().by_uuid.len()
    }

    /// Drop sessions that have been offline for more than ten minutes.
    pub fn cleanup_offline(&self) {
        let now = monotonic_ms();
        let stale: Vec<Uuid> = {
            let maps = self.maps.lock().unwrap();
            maps.by_uuid
                .values()
                .filter(|session| {
                    !session.is_online()
                        && now.saturating_sub(session.last_activity_ms()) > OFFLINE_RETENTION_MS
                })
                .map(|session| session.profile.uuid)
                .collect()
        };
        for uuid in stale {
            debug!("Dropping stale session {uuid}");
            self.remove(&uuid);
        }
    }

    /// Per-tick chunk-view maintenance for every online player.
    pub fn update_all_chunk_views(&self, state: &Arc<ServerState>) {
        for session in self.online_sessions() {
            update_chunk_view(&session, state);
        }
    }
}

// ---------------------------------------------------------------------------
// Chunk view
// ---------------------------------------------------------------------------

/// The disc of chunk coordinates `dx² + dz² ≤ r²` around `center`.
pub fn view_disc(center: ChunkPos, radius: i32) -> HashSet<ChunkPos> {
    let mut disc = HashSet::new();
    for dx in -radius..=radius {
        for dz in -radius..=radius {
            if dx * dx + dz * dz <= radius * radius {
                disc.insert(ChunkPos::new(center.x + dx, center.z + dz));
            }
        }
    }
    disc
}

/// Reconcile a player's streamed chunk set with the disc around its chunk.
///
/// On a view-center change the client is recentered first, new chunks stream
/// in order of increasing squared distance, and chunks that left the disc
/// are unloaded. Chunks not yet generated are requested from the store and
/// picked up on a later tick.
pub fn update_chunk_view(session: &Arc<PlayerSession>, state: &Arc<ServerState>) {
    if !session.is_online() {
        return;
    }

    let center = session.chunk();
    let needed = view_disc(center, session.view_distance());

    {
        let mut view_center = session.view_center.lock().unwrap();
        if *view_center != Some(center) {
            *view_center = Some(center);
            session
                .connection
                .send_packet(&Packet::UpdateViewPosition(UpdateViewPosition {
                    chunk_x: center.x,
                    chunk_z: center.z,
                }));
        }
    }

    let current = session.loaded_chunks();

    let mut additions: Vec<ChunkPos> = needed.difference(&current).copied().collect();
    additions.sort_by_key(|pos| pos.distance_sq(center));
    for position in additions {
        match state.chunks.load(position) {
            ChunkLoad::Loaded(chunk) => {
                let data = serialize_chunk(&chunk);
                session.connection.send_packet(&Packet::ChunkData(ChunkData {
                    chunk_x: position.x,
                    chunk_z: position.z,
                    data,
                    block_entities: Vec::new(),
                }));
                session.loaded_chunks.lock().unwrap().insert(position);
            }
            ChunkLoad::Pending => {
                // Generation in flight; the next tick retries.
            }
        }
    }

    for position in current.difference(&needed) {
        session
            .connection
            .send_packet(&Packet::UnloadChunk(UnloadChunk {
                chunk_x: position.x,
                chunk_z: position.z,
            }));
        session.loaded_chunks.lock().unwrap().remove(position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perf::PerfMonitor;

    fn test_connection() -> Arc<Connection> {
        let (connection, _rx) = Connection::new(
            1,
            "127.0.0.1:54321".parse().unwrap(),
            Arc::new(PerfMonitor::new()),
            500,
        );
        connection
    }

    fn test_registry() -> PlayerRegistry {
        PlayerRegistry::new(2, Location::new(0.0, 65.0, 0.0), 10, GameMode::Survival)
    }

    fn profile(name: &str) -> GameProfile {
        GameProfile {
            uuid: Uuid::offline(name),
            username: name.into(),
        }
    }

    #[test]
    fn view_disc_radius_two_has_thirteen_chunks() {
        let disc = view_disc(ChunkPos::new(0, 0), 2);
        assert_eq!(disc.len(), 13);
        assert!(disc.contains(&ChunkPos::new(0, 0)));
        assert!(disc.contains(&ChunkPos::new(2, 0)));
        assert!(disc.contains(&ChunkPos::new(1, 1)));
        // Corners fail dx² + dz² ≤ 4.
        assert!(!disc.contains(&ChunkPos::new(2, 1)));
        assert!(!disc.contains(&ChunkPos::new(2, 2)));
    }

    #[test]
    fn view_disc_moves_with_center() {
        let old = view_disc(ChunkPos::new(0, 0), 2);
        let new = view_disc(ChunkPos::new(1, 0), 2);
        let added: HashSet<_> = new.difference(&old).copied().collect();
        let dropped: HashSet<_> = old.difference(&new).copied().collect();
        let expected_added: HashSet<_> = [
            ChunkPos::new(3, 0),
            ChunkPos::new(2, 1),
            ChunkPos::new(2, -1),
            ChunkPos::new(1, 2),
            ChunkPos::new(1, -2),
        ]
        .into();
        let expected_dropped: HashSet<_> = [
            ChunkPos::new(-2, 0),
            ChunkPos::new(-1, 1),
            ChunkPos::new(-1, -1),
            ChunkPos::new(0, 2),
            ChunkPos::new(0, -2),
        ]
        .into();
        assert_eq!(added, expected_added);
        assert_eq!(dropped, expected_dropped);
    }

    #[test]
    fn create_allocates_sequential_entity_ids() {
        let registry = test_registry();
        let a = registry.create(test_connection(), profile("Alex")).unwrap();
        let b = registry.create(test_connection(), profile("Steve")).unwrap();
        assert_eq!(a.entity_id, 1);
        assert_eq!(b.entity_id, 2);
        assert_eq!(registry.online_count(), 2);
        assert!(registry.by_name("Alex").is_some());
        assert!(registry.by_entity_id(2).is_some());
    }

    #[test]
    fn duplicate_online_login_is_refused() {
        let registry = test_registry();
        registry.create(test_connection(), profile("Alex")).unwrap();
        let err = registry
            .create(test_connection(), profile("Alex"))
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate);
    }

    #[test]
    fn offline_session_is_replaced_on_rejoin() {
        let registry = test_registry();
        let first = registry.create(test_connection(), profile("Alex")).unwrap();
        first.disconnect();
        let second = registry.create(test_connection(), profile("Alex")).unwrap();
        assert_ne!(first.entity_id, second.entity_id);
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn server_full_counts_online_only() {
        let registry = test_registry();
        let a = registry.create(test_connection(), profile("A_a")).unwrap();
        registry.create(test_connection(), profile("B_b")).unwrap();
        assert_eq!(
            registry.create(test_connection(), profile("C_c")).unwrap_err(),
            RegistryError::ServerFull
        );
        // A slot frees up when someone leaves.
        a.disconnect();
        assert!(registry.create(test_connection(), profile("C_c")).is_ok());
    }

    #[test]
    fn remove_erases_all_three_maps() {
        let registry = test_registry();
        let session = registry.create(test_connection(), profile("Alex")).unwrap();
        registry.remove(&session.profile.uuid);
        assert!(registry.by_uuid(&session.profile.uuid).is_none());
        assert!(registry.by_name("Alex").is_none());
        assert!(registry.by_entity_id(session.entity_id).is_none());
    }

    #[test]
    fn view_distance_is_clamped() {
        let registry = test_registry();
        let session = registry.create(test_connection(), profile("Alex")).unwrap();
        session.set_view_distance(1);
        assert_eq!(session.view_distance(), 2);
        session.set_view_distance(64);
        assert_eq!(session.view_distance(), 32);
        session.set_view_distance(8);
        assert_eq!(session.view_distance(), 8);
    }

    #[test]
    fn inventory_add_merges_then_fills_empty_slots() {
        let mut inventory = Inventory::new();
        assert!(inventory.add(ItemStack::new(1, 60)));
        assert!(inventory.add(ItemStack::new(1, 10)));
        // 60 + 10 = one full stack of 64 plus 6 in the next slot.
        assert_eq!(inventory.get(0), ItemStack::new(1, 64));
        assert_eq!(inventory.get(1), ItemStack::new(1, 6));
        assert!(inventory.contains(1, 70));
        assert!(!inventory.contains(1, 71));
    }

    #[test]
    fn inventory_unstackable_items_take_whole_slots() {
        let mut inventory = Inventory::new();
        assert!(inventory.add(ItemStack::new(300, 1)));
        assert!(inventory.add(ItemStack::new(300, 1)));
        assert_eq!(inventory.get(0), ItemStack::new(300, 1));
        assert_eq!(inventory.get(1), ItemStack::new(300, 1));
    }

    #[test]
    fn inventory_remove_partial() {
        let mut inventory = Inventory::new();
        inventory.add(ItemStack::new(4, 10));
        let taken = inventory.remove(0, 4);
        assert_eq!(taken, ItemStack::new(4, 4));
        assert_eq!(inventory.get(0), ItemStack::new(4, 6));
        let rest = inventory.remove(0, 255);
        assert_eq!(rest.count, 6);
        assert!(inventory.get(0).is_empty());
    }

    #[test]
    fn selected_slot_clamps_to_hotbar() {
        let registry = test_registry();
        let session = registry.create(test_connection(), profile("Alex")).unwrap();
        session.set_selected_slot(20);
        assert_eq!(session.selected_slot(), 8);
    }
}
