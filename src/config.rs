//! Configuration management
//!
//! Config file is stored next to the executable as `robolink.toml`.
//! Every section is optional; missing fields take their defaults.

use crate::connection::ReconnectPolicy;
use crate::constants::{
    DEFAULT_IDENTITY_COLOUR_COUNT, DEFAULT_INVENTORY_TIMEOUT_MS, DEFAULT_OTA_APPLY_TIMEOUT_SECS,
    DEFAULT_OTA_CHUNK_INTERVAL_MS, DEFAULT_OTA_CHUNK_SIZE, DEFAULT_RECONNECT_INTERVAL_SECS,
};
use crate::error::{Error, Result};
use crate::transport::TransportKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "robolink.toml";

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub ota: OtaConfig,
    pub logs: LogsConfig,
}

// =============================================================================
// Connection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Link to the device
    pub transport: TransportKind,

    /// IP address or host name (network), device name (wireless)
    pub target: String,

    /// Ask the operator to confirm the device by its indicator colours
    pub verify_identity: bool,

    /// Maximum wait for the inventory after opening the transport
    pub inventory_timeout_ms: u64,

    /// Colours flashed during the identity check
    pub identity_colour_count: usize,

    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Reconnect automatically after an unexpected transport loss
    pub enabled: bool,

    /// Delay between attempts
    pub interval_secs: u64,

    /// Attempts before giving up
    /// Unset = transport default (unlimited for wireless, 5 for network)
    pub max_attempts: Option<u32>,
}

impl ReconnectConfig {
    /// Resolve into a policy for `kind`
    pub fn policy_for(&self, kind: TransportKind) -> ReconnectPolicy {
        let defaults = ReconnectPolicy::default_for(kind);
        ReconnectPolicy {
            enabled: self.enabled,
            interval: Duration::from_secs(self.interval_secs),
            max_attempts: self.max_attempts.or(defaults.max_attempts),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Network,
            target: String::new(),
            verify_identity: false,
            inventory_timeout_ms: DEFAULT_INVENTORY_TIMEOUT_MS,
            identity_colour_count: DEFAULT_IDENTITY_COLOUR_COUNT,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_RECONNECT_INTERVAL_SECS,
            max_attempts: None,
        }
    }
}

// =============================================================================
// Firmware update
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtaConfig {
    /// Where to fetch the firmware manifest (no URL = updates disabled)
    pub manifest_url: Option<String>,

    /// Firmware bytes per transfer chunk
    pub chunk_size: usize,

    /// Delay between chunks
    pub chunk_interval_ms: u64,

    /// Maximum wait for the device to confirm the new image
    pub apply_timeout_secs: u64,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            manifest_url: None,
            chunk_size: DEFAULT_OTA_CHUNK_SIZE,
            chunk_interval_ms: DEFAULT_OTA_CHUNK_INTERVAL_MS,
            apply_timeout_secs: DEFAULT_OTA_APPLY_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// Logs
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Debug-level logging unless RUST_LOG says otherwise
    pub verbose: bool,
}

// =============================================================================
// Load
// =============================================================================

/// Default config path: next to the executable, else the working directory
pub fn default_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Read and parse a config file
pub fn read(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&content).map_err(|e| Error::ConfigParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load config from file, falling back to defaults
pub fn load(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }
    match read(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, using defaults", e);
            Config::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();

        assert_eq!(config.connection.transport, TransportKind::Network);
        assert_eq!(config.connection.inventory_timeout_ms, 5000);
        assert_eq!(config.connection.identity_colour_count, 3);
        assert!(config.connection.reconnect.enabled);
        assert_eq!(config.connection.reconnect.interval_secs, 10);
        assert_eq!(config.ota.chunk_size, 500);
        assert_eq!(config.ota.manifest_url, None);
        assert!(!config.logs.verbose);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [connection]
            transport = "wireless"
            target = "Robot-7"

            [connection.reconnect]
            interval_secs = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.transport, TransportKind::Wireless);
        assert_eq!(config.connection.target, "Robot-7");
        assert_eq!(config.connection.reconnect.interval_secs, 3);
        assert!(config.connection.reconnect.enabled);
        assert_eq!(config.ota, OtaConfig::default());
    }

    #[test]
    fn test_reconnect_policy_resolution() {
        let reconnect = ReconnectConfig::default();
        assert_eq!(reconnect.policy_for(TransportKind::Wireless).max_attempts, None);
        assert_eq!(reconnect.policy_for(TransportKind::Network).max_attempts, Some(5));

        let bounded = ReconnectConfig {
            max_attempts: Some(2),
            ..Default::default()
        };
        assert_eq!(bounded.policy_for(TransportKind::Wireless).max_attempts, Some(2));
    }

    #[test]
    fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "[connection]\ntarget = \"10.0.0.5\"\n\n[ota]\nmanifest_url = \"https://updates.example.com/manifest.json\"\n",
        )
        .unwrap();

        let config = load(&path);
        assert_eq!(config.connection.target, "10.0.0.5");
        assert_eq!(
            config.ota.manifest_url.as_deref(),
            Some("https://updates.example.com/manifest.json")
        );
        assert_eq!(read(&path).unwrap(), config);
    }

    #[test]
    fn test_load_invalid_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "connection = 12").unwrap();

        assert!(matches!(read(&path), Err(Error::ConfigParse { .. })));
        assert_eq!(load(&path), Config::default());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load(&dir.path().join("absent.toml")), Config::default());
    }
}
