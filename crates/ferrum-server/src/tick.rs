//! The fixed-rate game tick and the auto-save thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::server::ServerState;

/// Target tick period: 20 TPS.
pub const TICK_DURATION: Duration = Duration::from_millis(50);

/// Dirty chunks in player windows are flushed every this many ticks.
const WORLD_FLUSH_TICKS: u64 = 20;

/// Sessions idle longer than this are kicked.
const IDLE_KICK_MS: u64 = 30 * 60 * 1000;

/// Run `f`, logging a panic instead of taking down the scheduler.
fn guard(name: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".into());
        error!("Tick subsystem {name} failed: {message}");
    }
}

pub fn spawn_tick_loop(state: Arc<ServerState>) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("tick".into())
        .spawn(move || run_tick_loop(&state))
        .expect("failed to spawn tick thread")
}

fn run_tick_loop(state: &Arc<ServerState>) {
    info!("Starting main game loop");
    let mut previous_start = Instant::now();

    while state.running.load(Ordering::Acquire) {
        let start = Instant::now();
        let tick = state.current_tick.fetch_add(1, Ordering::Relaxed) + 1;

        guard("players", || tick_players(state));
        guard("entities", || state.entities.tick_all());
        if tick % WORLD_FLUSH_TICKS == 0 {
            guard("world", || tick_world(state));
        }
        guard("perf", || refresh_perf(state));

        let end = Instant::now();
        let micros = end.duration_since(previous_start).as_micros();
        let tps = if micros == 0 {
            20.0
        } else {
            1_000_000.0 / micros as f64
        };
        state.perf.record_tps(tps);
        previous_start = start;

        let elapsed = start.elapsed();
        if elapsed < TICK_DURATION {
            thread::sleep(TICK_DURATION - elapsed);
        }
    }

    info!("Game loop stopped");
}

/// Chunk-view maintenance, idle kicks, and offline cleanup.
fn tick_players(state: &Arc<ServerState>) {
    state.players.update_all_chunk_views(state);

    let now = ferrum_world::chunk::monotonic_ms();
    for session in state.players.online_sessions() {
        if now.saturating_sub(session.last_activity_ms()) > IDLE_KICK_MS {
            info!(
                "Kicking player {} for inactivity",
                session.profile.username
            );
            session.disconnect();
        }
    }
    state.players.cleanup_offline();
}

/// Flush dirty chunks inside online players' view windows.
fn tick_world(state: &Arc<ServerState>) {
    for session in state.players.online_sessions() {
        for position in session.loaded_chunks() {
            if let Some(chunk) = state.chunks.get(position) {
                if chunk.is_dirty() {
                    state.chunks.persist_async(chunk);
                }
            }
        }
    }
}

fn refresh_perf(state: &Arc<ServerState>) {
    state
        .perf
        .set_active_connections(state.acceptor.active_count() as u32);
    state.perf.update_rates();
}

pub fn spawn_autosave(state: Arc<ServerState>) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("autosave".into())
        .spawn(move || run_autosave(&state))
        .expect("failed to spawn autosave thread")
}

fn run_autosave(state: &Arc<ServerState>) {
    info!("Starting auto-save thread");
    let interval = Duration::from_millis(state.config.performance.auto_save_interval);
    let mut last_save = Instant::now();

    while state.running.load(Ordering::Acquire) {
        thread::sleep(Duration::from_secs(1));
        if last_save.elapsed() < interval {
            continue;
        }
        info!("Performing auto-save...");
        let start = Instant::now();
        let saved = state.chunks.save_all();
        info!(
            "Auto-save completed: {saved} chunks saved in {}ms",
            start.elapsed().as_millis()
        );
        last_save = Instant::now();
    }
    info!("Auto-save thread stopped");
}
