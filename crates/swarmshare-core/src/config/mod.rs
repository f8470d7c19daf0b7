//! Configuration management for swarmshare.
//!
//! This module handles loading, saving, and managing swarmshare configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/swarmshare/config.toml` |
//! | macOS | `~/Library/Application Support/Swarmshare/config.toml` |
//! | Windows | `%APPDATA%\Swarmshare\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use swarmshare_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Tracker port: {}", config.tracker.port);
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration struct for swarmshare.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracker (directory service) settings
    pub tracker: TrackerConfig,
    /// Peer listener settings
    pub peer: PeerConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
}

/// Tracker configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Host the tracker binds to, and that clients connect to
    pub host: IpAddr,
    /// Tracker port
    pub port: u16,
    /// Root under which `CREATE_DIR` creates `<user_id>/<name>` directories
    pub shared_root: PathBuf,
    /// JSON catalog file (None = platform data dir)
    pub catalog_path: Option<PathBuf>,
    /// Store the ip a peer declares at login instead of the observed one
    pub trust_declared_address: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: crate::DEFAULT_TRACKER_PORT,
            shared_root: default_data_dir().join("shared"),
            catalog_path: None,
            trust_declared_address: true,
        }
    }
}

impl TrackerConfig {
    /// Socket address of the tracker.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Peer listener configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Address the peer listener binds to
    pub bind: IpAddr,
    /// Peer listener port (0 = ephemeral)
    pub port: u16,
    /// Ip announced to the tracker (None = local address of the tracker connection)
    pub advertise_ip: Option<IpAddr>,
    /// Idle time allowed between two commands on one connection
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: crate::DEFAULT_PEER_PORT,
            advertise_ip: None,
            idle_timeout: Duration::from_secs(crate::DEFAULT_PEER_IDLE_TIMEOUT_SECS),
        }
    }
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk size for swarm downloads
    pub chunk_size: u64,
    /// Chunk workers allowed to perform network I/O at once
    pub max_parallel_chunks: usize,
    /// Timeout for establishing a connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Timeout for each individual socket read or write
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,
    /// Root of the per-peer download areas (None = platform data dir)
    pub download_root: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            max_parallel_chunks: crate::DEFAULT_PARALLEL_CHUNKS,
            connect_timeout: Duration::from_secs(crate::DEFAULT_CONNECT_TIMEOUT_SECS),
            io_timeout: Duration::from_secs(crate::DEFAULT_IO_TIMEOUT_SECS),
            download_root: None,
        }
    }
}

impl TransferConfig {
    /// Resolved download root.
    #[must_use]
    pub fn download_root(&self) -> PathBuf {
        self.download_root
            .clone()
            .unwrap_or_else(|| default_data_dir().join("downloads"))
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to `path`.
    ///
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Resolved catalog file path.
    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.tracker
            .catalog_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("catalog.json"))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "swarmshare", "Swarmshare")
}

fn default_data_dir() -> PathBuf {
    project_dirs().map_or_else(|| PathBuf::from("."), |dirs| dirs.data_dir().to_path_buf())
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.strip_suffix('s')
            .map(|secs| {
                secs.parse()
                    .map(Duration::from_secs)
                    .map_err(serde::de::Error::custom)
            })
            .or_else(|| {
                s.strip_suffix('m').map(|mins| {
                    mins.parse::<u64>()
                        .map(|m| Duration::from_secs(m * 60))
                        .map_err(serde::de::Error::custom)
                })
            })
            .unwrap_or_else(|| Err(serde::de::Error::custom("invalid duration format")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.tracker.port, crate::DEFAULT_TRACKER_PORT);
        assert!(config.tracker.trust_declared_address);
        assert_eq!(config.transfer.chunk_size, 1024 * 1024);
        assert_eq!(config.transfer.io_timeout, Duration::from_secs(30));
        assert_eq!(config.peer.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut original = Config::default();
        original.tracker.port = 6000;
        original.tracker.trust_declared_address = false;
        original.transfer.chunk_size = 256 * 1024;
        original.transfer.download_root = Some(temp_dir.path().join("dl"));

        original.save_to(&config_path).expect("save");

        let loaded = Config::load_from(&config_path).expect("load");

        assert_eq!(loaded.tracker.port, 6000);
        assert!(!loaded.tracker.trust_declared_address);
        assert_eq!(loaded.transfer.chunk_size, 256 * 1024);
        assert_eq!(loaded.transfer.download_root(), temp_dir.path().join("dl"));
    }

    #[test]
    fn test_config_deserialization_partial() {
        let partial_toml = r#"
[tracker]
port = 7000

[transfer]
io_timeout = "2m"
"#;

        let config: Config = toml::from_str(partial_toml).expect("parse partial config");

        assert_eq!(config.tracker.port, 7000);
        assert_eq!(config.transfer.io_timeout, Duration::from_secs(120));
        assert_eq!(config.transfer.chunk_size, crate::DEFAULT_CHUNK_SIZE);
        assert_eq!(
            config.peer.idle_timeout,
            Duration::from_secs(crate::DEFAULT_PEER_IDLE_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("absent.toml")).expect("load");
        assert_eq!(config.tracker.port, crate::DEFAULT_TRACKER_PORT);
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let bad = "[transfer]\nio_timeout = \"soon\"\n";
        assert!(toml::from_str::<Config>(bad).is_err());
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(
            path.ends_with("config.toml"),
            "Config path should end with config.toml"
        );
    }
}
