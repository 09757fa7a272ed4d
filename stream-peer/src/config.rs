//! Configuration loading for FlashStream.
//!
//! Configuration is loaded from a TOML file (default: `flashstream.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use stream_core::{LinkPolicy, TransferPolicy};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Peer pool and liveness.
    pub connection: ConnectionConfig,
    /// Chunking and flow control.
    pub transfer: TransferConfig,
    /// Chunk staging store.
    pub store: StoreConfig,
    /// Background eviction of abandoned chunks.
    pub eviction: EvictionConfig,
    /// TCP rendezvous.
    pub rendezvous: RendezvousConfig,
}

/// Connection manager configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Maximum simultaneous peers (default: 1).
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,
    /// Seconds to wait for an outbound channel to open (default: 15).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Seconds between pings (default: 2).
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Seconds without a pong before a peer is dropped (default: 10).
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,
    /// Milliseconds a rejected peer gets to read "Room Full" (default: 100).
    #[serde(default = "default_room_full_grace_ms")]
    pub room_full_grace_ms: u64,
}

/// Transfer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Bytes per chunk (default: 256 KiB).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Buffered bytes above which the sender pauses (default: 1 MiB).
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,
    /// Milliseconds between throughput samples (default: 1000).
    #[serde(default = "default_throughput_window_ms")]
    pub throughput_window_ms: u64,
}

/// Chunk store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to SQLite database file, relative to the data directory.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// Byte quota for staged chunks (default: unlimited).
    pub max_bytes: Option<u64>,
    /// Seconds an abandoned file's chunks are kept (default: 1 day).
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

/// Eviction task configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EvictionConfig {
    /// Enable eviction task (default: true).
    #[serde(default = "default_eviction_enabled")]
    pub enabled: bool,
    /// Eviction interval in seconds (default: 3600 = 1 hour).
    #[serde(default = "default_eviction_interval")]
    pub interval_secs: u64,
}

/// TCP rendezvous configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RendezvousConfig {
    /// Listen address (default: 0.0.0.0:7878).
    #[serde(default = "default_listen_address")]
    pub listen: String,
    /// Identity to `host:port` directory.
    #[serde(default)]
    pub peers: HashMap<String, String>,
}

// Default value functions
fn default_max_peers() -> usize {
    1
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_ping_interval_secs() -> u64 {
    2
}

fn default_liveness_timeout_secs() -> u64 {
    10
}

fn default_room_full_grace_ms() -> u64 {
    100
}

fn default_chunk_size() -> u64 {
    256 * 1024
}

fn default_high_water_mark() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_throughput_window_ms() -> u64 {
    1000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("flashstream.db")
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60 // 1 day
}

fn default_eviction_enabled() -> bool {
    true
}

fn default_eviction_interval() -> u64 {
    3600 // 1 hour
}

fn default_listen_address() -> String {
    "0.0.0.0:7878".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_peers: default_max_peers(),
            connect_timeout_secs: default_connect_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            liveness_timeout_secs: default_liveness_timeout_secs(),
            room_full_grace_ms: default_room_full_grace_ms(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            high_water_mark: default_high_water_mark(),
            throughput_window_ms: default_throughput_window_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            max_bytes: None,
            retention_secs: default_retention_secs(),
        }
    }
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            enabled: default_eviction_enabled(),
            interval_secs: default_eviction_interval(),
        }
    }
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_address(),
            peers: HashMap::new(),
        }
    }
}

impl ConnectionConfig {
    /// Admission and liveness policy for the link state machine.
    pub fn link_policy(&self) -> LinkPolicy {
        LinkPolicy {
            max_peers: self.max_peers,
            liveness_timeout: Duration::from_secs(self.liveness_timeout_secs),
        }
    }

    /// Outbound open timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Heartbeat period, at least one second.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    /// Delay between "Room Full" and closing the rejected channel.
    pub fn room_full_grace(&self) -> Duration {
        Duration::from_millis(self.room_full_grace_ms)
    }
}

impl TransferConfig {
    /// Chunking policy for the transfer state machines.
    pub fn policy(&self) -> TransferPolicy {
        TransferPolicy {
            chunk_size: self.chunk_size.max(1),
            throughput_window: Duration::from_millis(self.throughput_window_ms),
        }
    }
}

impl StoreConfig {
    /// Age after which abandoned chunks are evicted.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.connection.max_peers, 1);
        assert_eq!(config.connection.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.transfer.chunk_size, 262_144);
        assert_eq!(config.transfer.high_water_mark, 1_048_576);
        assert_eq!(config.store.retention(), Duration::from_secs(86_400));
        assert_eq!(config.rendezvous.listen, "0.0.0.0:7878");
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[connection]
max_peers = 8
ping_interval_secs = 1

[transfer]
chunk_size = 65536

[store]
database = "/data/chunks.db"
max_bytes = 104857600

[eviction]
interval_secs = 600

[rendezvous]
listen = "127.0.0.1:9000"

[rendezvous.peers]
AB12CD = "10.0.0.2:7878"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.connection.max_peers, 8);
        assert_eq!(config.connection.ping_interval(), Duration::from_secs(1));
        assert_eq!(config.connection.liveness_timeout_secs, 10);
        assert_eq!(config.transfer.policy().chunk_size, 65536);
        assert_eq!(config.store.database, PathBuf::from("/data/chunks.db"));
        assert_eq!(config.store.max_bytes, Some(104_857_600));
        assert_eq!(config.eviction.interval_secs, 600);
        assert!(config.eviction.enabled);
        assert_eq!(config.rendezvous.listen, "127.0.0.1:9000");
        assert_eq!(
            config.rendezvous.peers.get("AB12CD").map(String::as_str),
            Some("10.0.0.2:7878")
        );
    }

    #[test]
    fn zero_ping_interval_is_raised_to_one_second() {
        let config: Config = toml::from_str("[connection]\nping_interval_secs = 0\n").unwrap();
        assert_eq!(config.connection.ping_interval_secs, 0);
        assert_eq!(config.connection.ping_interval(), Duration::from_secs(1));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.connection.room_full_grace(), Duration::from_millis(100));
        assert_eq!(config.transfer.throughput_window_ms, 1000);
        assert!(config.store.max_bytes.is_none());
    }

    #[test]
    fn link_policy_follows_connection_section() {
        let config: Config = toml::from_str("[connection]\nmax_peers = 3").unwrap();
        let policy = config.connection.link_policy();
        assert_eq!(policy.max_peers, 3);
        assert_eq!(policy.liveness_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        let config: Config = toml::from_str("[transfer]\nchunk_size = 0").unwrap();
        assert_eq!(config.transfer.policy().chunk_size, 1);
    }

    #[test]
    fn from_file_reports_read_and_parse_errors() {
        let missing = Config::from_file(std::path::Path::new("/nonexistent/flashstream.toml"));
        assert!(matches!(missing, Err(ConfigError::ReadError { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection]\nmax_peers = \"many\"").unwrap();
        let bad = Config::from_file(file.path());
        assert!(matches!(bad, Err(ConfigError::ParseError { .. })));
    }
}
