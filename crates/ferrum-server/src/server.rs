//! Server wiring: shared state, lifecycle, and the console control surface.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use ferrum_proto::packets::BlockChange;
use ferrum_proto::registry::{Packet, PacketRegistry};
use ferrum_proto::types::{BlockPos, GameMode, Location};
use ferrum_world::block::BlockRegistry;
use ferrum_world::error::WorldError;
use ferrum_world::generator::Generator;
use ferrum_world::pool::WorkerPool;
use ferrum_world::region::RegionStore;
use ferrum_world::store::ChunkStore;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::entity::EntityTable;
use crate::listener::{self, Acceptor};
use crate::perf::{PerfMonitor, PerfStats};
use crate::player::PlayerRegistry;
use crate::tick;

/// Everything the subsystems share. Built once; components receive borrows
/// of the `Arc` rather than reaching for globals.
pub struct ServerState {
    pub config: ServerConfig,
    pub registry: PacketRegistry,
    pub blocks: BlockRegistry,
    pub pool: Arc<WorkerPool>,
    pub chunks: Arc<ChunkStore>,
    pub players: PlayerRegistry,
    pub entities: EntityTable,
    pub perf: Arc<PerfMonitor>,
    pub acceptor: Acceptor,
    pub running: AtomicBool,
    pub current_tick: AtomicU64,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, WorldError> {
        let pool = Arc::new(WorkerPool::new(config.worker_threads()));
        let regions = Arc::new(RegionStore::open(&config.world.name)?);
        let chunks = Arc::new(ChunkStore::new(
            pool.clone(),
            regions,
            Generator::from_name(&config.world.generator),
        ));
        chunks.set_max_loaded(config.performance.max_chunks_loaded);
        chunks.set_chunk_timeout_ms(config.performance.chunk_unload_timeout);

        let spawn = Location::new(
            config.world.spawn_x,
            config.world.spawn_y,
            config.world.spawn_z,
        );
        let players = PlayerRegistry::new(
            config.server.max_players,
            spawn,
            config.server.view_distance,
            GameMode::from_name(&config.server.gamemode),
        );

        Ok(Arc::new(Self {
            config,
            registry: PacketRegistry::new(),
            blocks: BlockRegistry::new(),
            pool,
            chunks,
            players,
            entities: EntityTable::new(),
            perf: Arc::new(PerfMonitor::new()),
            acceptor: Acceptor::new(),
            running: AtomicBool::new(true),
            current_tick: AtomicU64::new(0),
        }))
    }
}

/// Point-in-time server status for the console.
pub struct ServerStatus {
    pub running: bool,
    pub current_tick: u64,
    pub online_players: usize,
    pub max_players: u32,
    pub play_connections: usize,
    pub loaded_chunks: usize,
    pub total_entities: usize,
    pub perf: PerfStats,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Server Status ===")?;
        writeln!(f, "Running: {}", if self.running { "yes" } else { "no" })?;
        writeln!(f, "Uptime: {}s", self.perf.uptime_seconds as u64)?;
        writeln!(
            f,
            "TPS: {:.1} (avg {:.1}, min {:.1})",
            self.perf.current_tps, self.perf.average_tps, self.perf.min_tps
        )?;
        writeln!(f, "Tick: {}", self.current_tick)?;
        writeln!(f, "Players: {}/{}", self.online_players, self.max_players)?;
        writeln!(f, "Loaded chunks: {}", self.loaded_chunks)?;
        writeln!(f, "Entities: {}", self.total_entities)?;
        writeln!(f, "Memory: {} MB", self.perf.memory_usage_mb)?;
        write!(
            f,
            "Network: {} pkt/s, {} KB/s ({} active connections, {} in play)",
            self.perf.packets_per_second,
            self.perf.bytes_per_second / 1024,
            self.perf.active_connections,
            self.play_connections
        )
    }
}

/// What the console loop should do with a command result.
pub enum ConsoleAction {
    Reply(String),
    Stop,
}

pub struct Server {
    state: Arc<ServerState>,
    config_path: PathBuf,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tick_handle: Option<thread::JoinHandle<()>>,
    autosave_handle: Option<thread::JoinHandle<()>>,
}

impl Server {
    pub fn new(config: ServerConfig, config_path: PathBuf) -> Result<Self, WorldError> {
        let state = ServerState::new(config)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            state,
            config_path,
            shutdown_tx,
            shutdown_rx,
            tick_handle: None,
            autosave_handle: None,
        })
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Bind the listener and bring up the accept loop, janitor, tick loop,
    /// and auto-save thread.
    pub async fn start(&mut self) -> std::io::Result<()> {
        let config = &self.state.config;
        let listener = listener::bind(&config.server.host, config.server.port)?;
        info!(
            "Listening on {}:{} (protocol {})",
            config.server.host,
            config.server.port,
            ferrum_proto::PROTOCOL_VERSION
        );

        tokio::spawn(listener::accept_loop(
            listener,
            self.state.clone(),
            self.shutdown_rx.clone(),
        ));
        tokio::spawn(listener::janitor_loop(
            self.state.clone(),
            self.shutdown_rx.clone(),
        ));

        self.tick_handle = Some(tick::spawn_tick_loop(self.state.clone()));
        self.autosave_handle = Some(tick::spawn_autosave(self.state.clone()));

        info!("Server started");
        Ok(())
    }

    /// Orderly shutdown: stop accepting, close connections, final save,
    /// join the background threads.
    pub fn stop(&mut self) {
        if !self.state.running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("Stopping server...");
        let _ = self.shutdown_tx.send(true);

        self.state.acceptor.close_all();

        let saved = self.state.chunks.save_all();
        info!("Final save wrote {saved} chunks");

        if let Some(handle) = self.tick_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.autosave_handle.take() {
            let _ = handle.join();
        }
        self.state.pool.shutdown();

        info!("Server stopped");
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            running: self.state.running.load(Ordering::Acquire),
            current_tick: self.state.current_tick.load(Ordering::Relaxed),
            online_players: self.state.players.online_count(),
            max_players: self.state.config.server.max_players,
            play_connections: self.state.acceptor.play_count(),
            loaded_chunks: self.state.chunks.loaded_count(),
            total_entities: self.state.entities.count(),
            perf: self.state.perf.stats(),
        }
    }

    /// Disconnect a player by name. Returns whether someone was kicked.
    pub fn kick(&self, username: &str, reason: &str) -> bool {
        match self.state.players.by_name(username) {
            Some(session) if session.is_online() => {
                info!("Kicking player {username}: {reason}");
                session.disconnect();
                true
            }
            _ => false,
        }
    }

    /// Log a broadcast message. There is no chat packet in the protocol
    /// subset this server speaks, so the console is the audience.
    pub fn broadcast(&self, message: &str) {
        info!("[BROADCAST] {message}");
    }

    /// Write one block and announce it to every PLAY connection.
    pub fn set_block(&self, position: BlockPos, block: ferrum_world::BlockId) -> bool {
        if !self.state.blocks.is_valid(block) {
            return false;
        }
        self.state.chunks.block_set(position, block);
        self.state
            .acceptor
            .broadcast_play(&Packet::BlockChange(BlockChange {
                position,
                block_state: block as i32,
            }));
        true
    }

    /// Re-read the config file and apply the hot-swappable knobs.
    pub fn reload_config(&self) {
        info!("Reloading server configuration...");
        match ServerConfig::load(&self.config_path) {
            Ok(config) => {
                self.state
                    .chunks
                    .set_max_loaded(config.performance.max_chunks_loaded);
                self.state
                    .chunks
                    .set_chunk_timeout_ms(config.performance.chunk_unload_timeout);
                info!("Configuration reloaded");
            }
            Err(e) => error!("Failed to reload configuration: {e}"),
        }
    }

    /// Dispatch one console line.
    pub fn handle_console_command(&self, line: &str) -> ConsoleAction {
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");

        match command {
            "stop" => ConsoleAction::Stop,
            "status" => ConsoleAction::Reply(self.status().to_string()),
            "kick" => match parts.next() {
                Some(username) => {
                    let reason = {
                        let rest: Vec<&str> = parts.collect();
                        if rest.is_empty() {
                            "Kicked by server".to_string()
                        } else {
                            rest.join(" ")
                        }
                    };
                    if self.kick(username, &reason) {
                        ConsoleAction::Reply(format!("Kicked {username}"))
                    } else {
                        ConsoleAction::Reply(format!("Player {username} is not online"))
                    }
                }
                None => ConsoleAction::Reply("Usage: kick <player> [reason]".into()),
            },
            "broadcast" => {
                let message: Vec<&str> = parts.collect();
                self.broadcast(&message.join(" "));
                ConsoleAction::Reply("Broadcast sent".into())
            }
            "reload" => {
                self.reload_config();
                ConsoleAction::Reply("Reload triggered".into())
            }
            "setblock" => {
                let args: Vec<&str> = parts.collect();
                let parsed = (|| {
                    let [x, y, z, id] = args.as_slice() else {
                        return None;
                    };
                    Some((
                        BlockPos::new(x.parse().ok()?, y.parse().ok()?, z.parse().ok()?),
                        id.parse::<u16>().ok()?,
                    ))
                })();
                match parsed {
                    Some((position, block)) if self.set_block(position, block) => {
                        ConsoleAction::Reply(format!("Set block {block} at {position}"))
                    }
                    Some((_, block)) => {
                        ConsoleAction::Reply(format!("Unknown block id {block}"))
                    }
                    None => ConsoleAction::Reply("Usage: setblock <x> <y> <z> <block id>".into()),
                }
            }
            "help" => ConsoleAction::Reply(
                "Commands: stop, status, kick <player> [reason], broadcast <message>, \
                 setblock <x> <y> <z> <id>, reload, help"
                    .into(),
            ),
            "" => ConsoleAction::Reply(String::new()),
            other => {
                warn!("Unknown console command: {other}");
                ConsoleAction::Reply(format!("Unknown command: {other} (try 'help')"))
            }
        }
    }
}
