//! Concurrent chunk store: membership map, async generation, age-based
//! eviction, and persistence scheduling.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ferrum_proto::types::{BlockPos, ChunkPos};
use tracing::{debug, warn};

use crate::block::BlockId;
use crate::chunk::{monotonic_ms, Chunk};
use crate::generator::Generator;
use crate::pool::WorkerPool;
use crate::region::RegionStore;

/// Most chunks unloaded by a single eviction pass.
const MAX_UNLOADS_PER_PASS: usize = 10;

/// Result of a non-blocking load request.
#[derive(Clone)]
pub enum ChunkLoad {
    Loaded(Arc<Chunk>),
    /// Generation or disk load is in flight; retry later.
    Pending,
}

#[derive(Default)]
struct Inner {
    loaded: HashMap<ChunkPos, Arc<Chunk>>,
    pending: HashSet<ChunkPos>,
}

/// Concurrent map `coordinate → chunk` plus the set of in-flight loads.
///
/// The store mutex guards membership only; block-level work goes through
/// each chunk's own lock.
pub struct ChunkStore {
    inner: Mutex<Inner>,
    max_loaded: AtomicUsize,
    chunk_timeout_ms: AtomicU64,
    auto_unload: AtomicBool,
    pool: Arc<WorkerPool>,
    regions: Arc<RegionStore>,
    generator: Generator,
}

impl ChunkStore {
    pub fn new(pool: Arc<WorkerPool>, regions: Arc<RegionStore>, generator: Generator) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_loaded: AtomicUsize::new(256),
            chunk_timeout_ms: AtomicU64::new(300_000),
            auto_unload: AtomicBool::new(true),
            pool,
            regions,
            generator,
        }
    }

    pub fn set_max_loaded(&self, max: usize) {
        self.max_loaded.store(max, Ordering::Relaxed);
    }

    pub fn set_chunk_timeout_ms(&self, timeout: u64) {
        self.chunk_timeout_ms.store(timeout, Ordering::Relaxed);
    }

    pub fn set_auto_unload(&self, enabled: bool) {
        self.auto_unload.store(enabled, Ordering::Relaxed);
    }

    /// The loaded chunk, touching its access time; `None` if not resident.
    pub fn get(&self, position: ChunkPos) -> Option<Arc<Chunk>> {
        let inner = self.inner.lock().unwrap();
        let chunk = inner.loaded.get(&position).cloned();
        if let Some(chunk) = &chunk {
            chunk.touch();
        }
        chunk
    }

    /// Request a chunk, scheduling an async load when it is not resident.
    pub fn load(self: &Arc<Self>, position: ChunkPos) -> ChunkLoad {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(chunk) = inner.loaded.get(&position) {
                chunk.touch();
                return ChunkLoad::Loaded(chunk.clone());
            }
            if !inner.pending.insert(position) {
                return ChunkLoad::Pending;
            }
        }

        let store = self.clone();
        self.pool.submit(move || {
            let chunk = match store.regions.load_chunk(position) {
                Ok(Some(chunk)) => chunk,
                Ok(None) => store.generator.generate(position),
                Err(e) => {
                    // Leave the coordinate unloaded; a later request retries.
                    warn!("Chunk load {position} failed: {e}");
                    store.inner.lock().unwrap().pending.remove(&position);
                    return;
                }
            };

            {
                let mut inner = store.inner.lock().unwrap();
                inner.loaded.insert(position, Arc::new(chunk));
                inner.pending.remove(&position);
            }
            store.cleanup();
        });

        ChunkLoad::Pending
    }

    /// Remove a chunk from the store, persisting it first when dirty.
    pub fn unload(&self, position: ChunkPos) {
        let chunk = {
            let mut inner = self.inner.lock().unwrap();
            inner.loaded.remove(&position)
        };
        let Some(chunk) = chunk else {
            return;
        };
        if chunk.is_dirty() {
            let regions = self.regions.clone();
            self.pool.submit(move || {
                if let Err(e) = regions.save_chunk(&chunk) {
                    warn!("Failed to persist chunk {} on unload: {e}", chunk.position());
                }
            });
        }
    }

    /// Age-based eviction: runs only above `max_loaded`, unloads at most
    /// [`MAX_UNLOADS_PER_PASS`] chunks older than the timeout.
    pub fn cleanup(&self) {
        if !self.auto_unload.load(Ordering::Relaxed) {
            return;
        }
        let timeout = self.chunk_timeout_ms.load(Ordering::Relaxed);
        let now = monotonic_ms();

        let to_unload: Vec<ChunkPos> = {
            let inner = self.inner.lock().unwrap();
            if inner.loaded.len() <= self.max_loaded.load(Ordering::Relaxed) {
                return;
            }
            inner
                .loaded
                .iter()
                .filter(|(_, chunk)| now.saturating_sub(chunk.last_access()) > timeout)
                .map(|(pos, _)| *pos)
                .take(MAX_UNLOADS_PER_PASS)
                .collect()
        };

        for position in &to_unload {
            self.unload(*position);
        }
        if !to_unload.is_empty() {
            debug!("Evicted {} aged chunks", to_unload.len());
        }
    }

    /// Block read through the chunk map; AIR when the chunk is not loaded.
    pub fn block_get(&self, position: BlockPos) -> BlockId {
        let Some(chunk) = self.get(position.chunk()) else {
            return crate::block::AIR;
        };
        let (x, y, z) = position.local();
        chunk.get_block(x, y, z)
    }

    /// Block write through the chunk map. When the chunk is not resident a
    /// load is requested and the write is dropped; the caller retries once
    /// the chunk arrives.
    pub fn block_set(self: &Arc<Self>, position: BlockPos, id: BlockId) {
        let chunk = match self.get(position.chunk()) {
            Some(chunk) => chunk,
            None => match self.load(position.chunk()) {
                ChunkLoad::Loaded(chunk) => chunk,
                ChunkLoad::Pending => return,
            },
        };
        let (x, y, z) = position.local();
        chunk.set_block(x, y, z, id);
    }

    /// Persist one chunk on the worker pool. A failed persist leaves the
    /// chunk dirty for a later retry.
    pub fn persist_async(&self, chunk: Arc<Chunk>) {
        if !chunk.is_dirty() {
            return;
        }
        let regions = self.regions.clone();
        self.pool.submit(move || {
            if let Err(e) = regions.save_chunk(&chunk) {
                warn!("Failed to persist chunk {}: {e}", chunk.position());
            }
        });
    }

    pub fn loaded_count(&self) -> usize {
        self.inner.lock().unwrap().loaded.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    /// Snapshot of every loaded chunk.
    pub fn loaded_chunks(&self) -> Vec<Arc<Chunk>> {
        self.inner.lock().unwrap().loaded.values().cloned().collect()
    }

    /// Loaded chunks within a square radius of `center`.
    pub fn chunks_in_range(&self, center: ChunkPos, radius: i32) -> Vec<Arc<Chunk>> {
        let inner = self.inner.lock().unwrap();
        let mut result = Vec::new();
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let pos = ChunkPos::new(center.x + dx, center.z + dz);
                if let Some(chunk) = inner.loaded.get(&pos) {
                    result.push(chunk.clone());
                }
            }
        }
        result
    }

    /// Persist every dirty loaded chunk, synchronously. Returns the count.
    pub fn save_all(&self) -> usize {
        let chunks = self.loaded_chunks();
        self.regions.save_all(chunks.iter().map(|c| c.as_ref()))
    }
}
