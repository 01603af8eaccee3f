//! Server configuration, loaded from a JSON document.
//!
//! Every key has a default so a partial (or missing) file still yields a
//! complete configuration. A missing file is written out with the defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub world: WorldSection,
    pub performance: PerformanceSection,
    pub logging: LoggingSection,
    pub security: SecuritySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub name: String,
    pub motd: String,
    pub host: String,
    pub port: u16,
    pub max_players: u32,
    pub view_distance: i32,
    pub simulation_distance: i32,
    pub difficulty: String,
    pub gamemode: String,
    pub hardcore: bool,
    pub pvp: bool,
    pub online_mode: bool,
    pub spawn_protection: i32,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "Ferrum Minecraft Server".into(),
            motd: "A Ferrum server".into(),
            host: "0.0.0.0".into(),
            port: 25565,
            max_players: 100,
            view_distance: 10,
            simulation_distance: 10,
            difficulty: "normal".into(),
            gamemode: "survival".into(),
            hardcore: false,
            pvp: true,
            online_mode: false,
            spawn_protection: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSection {
    pub name: String,
    pub seed: i64,
    pub generator: String,
    pub spawn_x: f64,
    pub spawn_y: f64,
    pub spawn_z: f64,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            name: "world".into(),
            seed: 0,
            generator: "flat".into(),
            spawn_x: 0.0,
            spawn_y: 65.0,
            spawn_z: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSection {
    pub io_threads: usize,
    /// 0 means hardware concurrency.
    pub worker_threads: usize,
    pub max_chunks_loaded: usize,
    pub chunk_unload_timeout: u64,
    pub auto_save_interval: u64,
    /// Parsed and carried; compression is never engaged.
    pub compression_threshold: i32,
    pub network_buffer_size: usize,
}

impl Default for PerformanceSection {
    fn default() -> Self {
        Self {
            io_threads: 4,
            worker_threads: 0,
            max_chunks_loaded: 1000,
            chunk_unload_timeout: 300_000,
            auto_save_interval: 300_000,
            compression_threshold: 256,
            network_buffer_size: 8192,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub file: String,
    pub console: bool,
    pub max_file_size: u64,
    pub max_files: u32,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: "server.log".into(),
            console: true,
            max_file_size: 10_485_760,
            max_files: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub ip_forwarding: bool,
    pub max_connections_per_ip: u32,
    /// Minimum milliseconds between connection attempts from one address.
    pub connection_throttle: u64,
    pub packet_limit_per_second: u32,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            ip_forwarding: false,
            max_connections_per_ip: 3,
            connection_throttle: 4000,
            packet_limit_per_second: 500,
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Load the file, falling back to defaults (and writing them out) when
    /// it does not exist. Parse errors are fatal: a corrupt config should
    /// not silently become a default server.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            if let Err(e) = config.save(path) {
                warn!("Could not write default config to {}: {e}", path.display());
            }
            return Ok(config);
        }
        Self::load(path)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Worker threads resolved against hardware concurrency.
    pub fn worker_threads(&self) -> usize {
        if self.performance.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.performance.worker_threads
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.port, 25565);
        assert_eq!(config.server.max_players, 100);
        assert_eq!(config.world.generator, "flat");
        assert_eq!(config.performance.max_chunks_loaded, 1000);
        assert_eq!(config.security.packet_limit_per_second, 500);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_document_keeps_remaining_defaults() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "server": { "port": 25570, "motd": "hi" },
                "performance": { "io_threads": 2 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 25570);
        assert_eq!(config.server.motd, "hi");
        assert_eq!(config.server.max_players, 100);
        assert_eq!(config.performance.io_threads, 2);
        assert_eq!(config.performance.network_buffer_size, 8192);
    }

    #[test]
    fn worker_threads_zero_is_auto() {
        let config = ServerConfig::default();
        assert!(config.worker_threads() >= 1);

        let fixed: ServerConfig =
            serde_json::from_str(r#"{ "performance": { "worker_threads": 3 } }"#).unwrap();
        assert_eq!(fixed.worker_threads(), 3);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = std::env::temp_dir().join(format!("ferrum_config_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("server.json");

        let config = ServerConfig::load_or_create(&path).unwrap();
        assert_eq!(config.server.port, 25565);
        assert!(path.exists());

        // The written file parses back to the same values.
        let reloaded = ServerConfig::load(&path).unwrap();
        assert_eq!(reloaded.server.port, config.server.port);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("ferrum_config_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("server.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(ServerConfig::load_or_create(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
