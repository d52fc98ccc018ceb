//! Bridge configuration
//!
//! Loaded from a TOML file at `$WHEELBRIDGE_CONFIG` or
//! `<config dir>/wheelbridge/config.toml`. A missing file is created with
//! the defaults so users have something to edit; every field falls back to
//! its default when absent.

use crate::control::state::DEFAULT_MAX_ROTATION;
use crate::device::KeyboardSettings;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const CONFIG_ENV: &str = "WHEELBRIDGE_CONFIG";
const CONFIG_DIR: &str = "wheelbridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config directory available on this system")]
    NoConfigDir,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize default config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Keepalive ping period
    pub ping_interval_secs: u64,
    /// How long a ping may stay unanswered before the client is dropped
    pub ping_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8765,
            ping_interval_secs: 20,
            ping_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SteeringConfig {
    /// Full lock in degrees, each side
    pub max_rotation: f64,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            max_rotation: DEFAULT_MAX_ROTATION,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub steering: SteeringConfig,
    pub keyboard: KeyboardSettings,
}

impl Config {
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = self.steering.max_rotation;
        if !max.is_finite() || max <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "steering.max_rotation must be positive, got {}",
                max
            )));
        }
        let deadzone = self.keyboard.deadzone;
        if !deadzone.is_finite() || deadzone < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "keyboard.deadzone must not be negative, got {}",
                deadzone
            )));
        }
        let threshold = self.keyboard.pedal_threshold;
        if !(0.0..1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "keyboard.pedal_threshold must be in [0, 1), got {}",
                threshold
            )));
        }
        if self.server.ping_interval_secs == 0 || self.server.ping_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server ping interval and timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves the config location: the environment override first, then
    /// the per-user config directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    /// Loads `path`, writing the defaults there first if it does not exist.
    pub async fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if !tokio::fs::try_exists(path).await.map_err(io_err)? {
            info!("No config at {}, writing defaults", path.display());
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
            let content = toml::to_string_pretty(&Config::default())?;
            tokio::fs::write(path, content).await.map_err(io_err)?;
            return Ok(Config::default());
        }

        let content = tokio::fs::read_to_string(path).await.map_err(io_err)?;
        let config = Self::from_toml(&content, path)?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }
}
