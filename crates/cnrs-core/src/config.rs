//! Configuration system for cnrs
//!
//! Supports TOML configuration files with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/cnrs/config.toml
//! - Linux: ~/.config/cnrs/config.toml
//! - Windows: %APPDATA%/cnrs/config.toml

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::address::{AddressAllocator, MAX_ADDRESSABLE_SLOTS};
use crate::staleness::StalenessPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Signal server settings
    pub signal: SignalConfig,
    /// Room membership settings
    pub room: RoomConfig,
}

/// Signal server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Signal server port
    pub port: u16,
    /// Bind address
    pub bind: IpAddr,
    /// Database path (None = in-memory)
    pub db_path: Option<PathBuf>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            db_path: None,
        }
    }
}

/// Room membership configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Maximum peers per room
    pub capacity: usize,
    /// Inactivity after which a slot may be reclaimed, in seconds
    pub inactivity_threshold_secs: u64,
    /// First two octets of the tunnel address block
    pub address_prefix: [u8; 2],
    /// Serialize joins to the same room within this process
    pub serialize_joins: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            capacity: crate::MAX_PEERS_PER_ROOM,
            inactivity_threshold_secs: crate::INACTIVITY_THRESHOLD_SECS, // 24 hours
            address_prefix: crate::DEFAULT_ADDRESS_PREFIX,
            serialize_joins: true,
        }
    }
}

impl RoomConfig {
    pub fn allocator(&self) -> AddressAllocator {
        AddressAllocator::new(self.address_prefix)
    }

    pub fn staleness(&self) -> StalenessPolicy {
        StalenessPolicy::from_secs(self.inactivity_threshold_secs)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::Io(e.to_string()))?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Reject settings the room protocol cannot honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacity = self.room.capacity;
        if capacity == 0 || capacity > MAX_ADDRESSABLE_SLOTS {
            return Err(ConfigError::Invalid(format!(
                "room.capacity must be in 1..={}, got {}",
                MAX_ADDRESSABLE_SLOTS, capacity
            )));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "cnrs", "cnrs")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// I/O error
    Io(String),
    /// Parse error
    Parse(String),
    /// Serialization error
    Serialize(String),
    /// Value out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialization error: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.signal.port, 8080);
        assert_eq!(config.room.capacity, 200);
        assert_eq!(config.room.inactivity_threshold_secs, 86_400);
        assert_eq!(config.room.address_prefix, [10, 8]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            [room]
            capacity = 3
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.room.capacity, 3);
        // Other values should be defaults
        assert_eq!(config.signal.port, 8080);
        assert!(config.room.serialize_joins);
    }

    #[test]
    fn test_sample_config() {
        let sample = Config::sample();
        assert!(sample.contains("[signal]"));
        assert!(sample.contains("[room]"));
    }

    #[test]
    fn test_config_load_missing() {
        let config = Config::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.room.capacity, 200);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.room.capacity = 50;
        config.room.address_prefix = [172, 20];
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.room.capacity, 50);
        assert_eq!(loaded.room.allocator().prefix(), [172, 20]);
    }

    #[test]
    fn test_invalid_capacity_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[room]\ncapacity = 0\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
