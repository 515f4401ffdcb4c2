//! TOML-based configuration for the host application.
//!
//! Reads and writes [`HostConfig`] from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\RemoteMouse\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/remotemouse/config.toml` or `~/.config/remotemouse/config.toml`
//! - macOS:    `~/Library/Application Support/RemoteMouse/config.toml`
//!
//! Example:
//!
//! ```toml
//! [host]
//! name = "Living room PC"
//! pin = "123456"
//! max_connections = 10
//! pointer_speed = 1.5
//!
//! [network]
//! bind_address = "0.0.0.0"
//! ws_port = 8765
//! discovery_port = 9876
//! ping_interval_secs = 10
//! ping_timeout_secs = 30
//! auth_timeout_secs = 5
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section, or
//! an older file without newer fields all load cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rmouse_core::{
    discovery::DEFAULT_DISCOVERY_PORT,
    protocol::messages::{DEFAULT_CONTROL_PORT, MAX_MESSAGE_SIZE},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level host configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub network: NetworkSection,
}

/// Identity, authentication and input behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostSection {
    /// Display name advertised in discovery replies and the `ok` message.
    #[serde(default = "default_name")]
    pub name: String,
    /// Shared secret.  An empty string disables PIN checking.
    #[serde(default = "default_pin")]
    pub pin: String,
    /// Concurrent session cap.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Multiplier applied to relative motion.
    #[serde(default = "default_pointer_speed")]
    pub pointer_speed: f64,
}

/// Socket and timing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// IP address to bind both sockets to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// WebSocket control-channel port.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    /// UDP discovery port.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// A session with no inbound frame for this long is closed.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,
    /// Time allowed for the first (`hello`) message.
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_name() -> String {
    "RemoteMouse".to_string()
}
fn default_pin() -> String {
    "123456".to_string()
}
fn default_max_connections() -> usize {
    10
}
fn default_pointer_speed() -> f64 {
    1.5
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_ws_port() -> u16 {
    DEFAULT_CONTROL_PORT
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
fn default_ping_interval() -> u64 {
    10
}
fn default_ping_timeout() -> u64 {
    30
}
fn default_auth_timeout() -> u64 {
    5
}
fn default_max_message_size() -> usize {
    MAX_MESSAGE_SIZE
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            pin: default_pin(),
            max_connections: default_max_connections(),
            pointer_speed: default_pointer_speed(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            ws_port: default_ws_port(),
            discovery_port: default_discovery_port(),
            ping_interval_secs: default_ping_interval(),
            ping_timeout_secs: default_ping_timeout(),
            auth_timeout_secs: default_auth_timeout(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl NetworkSection {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

impl HostConfig {
    /// Rejects values that would make the host unusable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.max_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "host.max_connections",
                reason: "must be at least 1".into(),
            });
        }
        if !(self.host.pointer_speed.is_finite() && self.host.pointer_speed > 0.0) {
            return Err(ConfigError::Invalid {
                field: "host.pointer_speed",
                reason: format!("{} is not a positive number", self.host.pointer_speed),
            });
        }
        if self.network.ping_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "network.ping_interval_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.network.bind_address.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::Invalid {
                field: "network.bind_address",
                reason: format!("'{}' is not an IP address", self.network.bind_address),
            });
        }
        Ok(())
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the default location.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<HostConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `HostConfig` from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<HostConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HostConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &HostConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `RemoteMouse` folder.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("RemoteMouse"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("remotemouse"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("RemoteMouse")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("rmouse_test_{}", Uuid::new_v4()))
            .join("config.toml")
    }

    #[test]
    fn test_default_config_matches_documented_values() {
        // Arrange / Act
        let cfg = HostConfig::default();

        // Assert
        assert_eq!(cfg.host.pin, "123456");
        assert_eq!(cfg.host.max_connections, 10);
        assert_eq!(cfg.host.pointer_speed, 1.5);
        assert_eq!(cfg.network.ws_port, 8765);
        assert_eq!(cfg.network.discovery_port, 9876);
        assert_eq!(cfg.network.ping_interval(), Duration::from_secs(10));
        assert_eq!(cfg.network.ping_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.network.auth_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(HostConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: HostConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, HostConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_named_fields() {
        // Arrange
        let toml_str = r#"
[network]
ws_port = 9999
"#;

        // Act
        let cfg: HostConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.network.ws_port, 9999);
        assert_eq!(cfg.network.discovery_port, 9876);
        assert_eq!(cfg.host.name, "RemoteMouse");
    }

    #[test]
    fn test_empty_pin_round_trips() {
        let mut cfg = HostConfig::default();
        cfg.host.pin = String::new();

        let restored: HostConfig = toml::from_str(&toml::to_string_pretty(&cfg).unwrap()).unwrap();

        assert_eq!(restored.host.pin, "");
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let result: Result<HostConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_connections() {
        let mut cfg = HostConfig::default();
        cfg.host.max_connections = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "host.max_connections", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_bind_address() {
        let mut cfg = HostConfig::default();
        cfg.network.bind_address = "localhost:80".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let cfg = load_config_from(&temp_path()).unwrap();
        assert_eq!(cfg, HostConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        // Arrange
        let path = temp_path();
        let mut cfg = HostConfig::default();
        cfg.host.name = "Office".into();
        cfg.network.ws_port = 12345;

        // Act
        save_config_to(&cfg, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"), "got {path:?}");
        }
    }
}
