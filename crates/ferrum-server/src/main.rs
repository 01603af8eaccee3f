mod config;
mod connection;
mod entity;
mod listener;
mod perf;
mod player;
mod server;
mod tick;

use std::path::PathBuf;

use config::ServerConfig;
use server::{ConsoleAction, Server};
use tokio::io::AsyncBufReadExt;
use tracing::{error, info};

const CONFIG_PATH: &str = "server.json";

fn main() {
    let config = match ServerConfig::load_or_create(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_PATH}: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        "Ferrum v{} — Minecraft {} (protocol {})",
        env!("CARGO_PKG_VERSION"),
        ferrum_proto::GAME_VERSION,
        ferrum_proto::PROTOCOL_VERSION
    );
    info!("Server: {}", config.server.name);
    info!("MOTD: {}", config.server.motd);
    info!(
        "Max players: {}, view distance: {}",
        config.server.max_players, config.server.view_distance
    );
    info!(
        "World: {} (generator: {}, seed: {})",
        config.world.name, config.world.generator, config.world.seed
    );
    info!(
        "Threads: {} I/O, {} workers",
        config.performance.io_threads,
        config.worker_threads()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.performance.io_threads.max(1))
        .enable_all()
        .build()
        .expect("failed to build the I/O runtime");

    runtime.block_on(run(config));
}

async fn run(config: ServerConfig) {
    let mut server = match Server::new(config, PathBuf::from(CONFIG_PATH)) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to initialise server: {e}");
            return;
        }
    };
    if let Err(e) = server.start().await {
        error!("Failed to start server: {e}");
        return;
    }

    // Console REPL: stdin lines into the control loop.
    let (console_tx, mut console_rx) = tokio::sync::mpsc::channel::<String>(32);
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            Some(line) = console_rx.recv() => {
                match server.handle_console_command(&line) {
                    ConsoleAction::Stop => break,
                    ConsoleAction::Reply(reply) => {
                        if !reply.is_empty() {
                            info!("{reply}");
                        }
                    }
                }
            }
        }
    }

    server.stop();
}
