use std::path::{Path, PathBuf};

use arena::{ArenaError, GridConfig};
use engine_core::{RoomSettings, TickConfig};
use serde::Deserialize;

pub const ENV_ADDR: &str = "SERVER_ADDR";
pub const ENV_PORT: &str = "SERVER_PORT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    #[error(transparent)]
    Room(#[from] ArenaError),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Usage(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetSection {
    pub addr: String,
    pub port: u16,
    pub max_input_length: usize,
}

impl Default for NetSection {
    fn default() -> Self {
        Self {
            addr: "localhost".to_string(),
            port: 8080,
            max_input_length: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomSection {
    pub width: u32,
    pub height: u32,
    pub rubble_probability: f64,
    pub tick_interval_ms: u64,
    pub max_players: usize,
    /// Created at startup. Empty disables it.
    pub default_room: String,
    pub seed: Option<u64>,
}

impl Default for RoomSection {
    fn default() -> Self {
        let grid = GridConfig::default();
        Self {
            width: grid.width,
            height: grid.height,
            rubble_probability: grid.rubble_probability,
            tick_interval_ms: 500,
            max_players: 16,
            default_room: "room-1".to_string(),
            seed: None,
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub net: NetSection,
    pub room: RoomSection,
}

impl ServerConfig {
    /// Load from an optional TOML file. A missing file falls back to defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match config_path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&content)?
            }
            Some(path) => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        Ok(config)
    }

    /// File, then `SERVER_ADDR` / `SERVER_PORT`, then validation.
    pub fn resolve(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(config_path)?;
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`, so tests need not touch
    /// the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(addr) = lookup(ENV_ADDR).filter(|v| !v.is_empty()) {
            self.net.addr = addr;
        }
        if let Some(port) = lookup(ENV_PORT).filter(|v| !v.is_empty()) {
            self.net.port = port.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_PORT,
                value: port.clone(),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid_config().validate()?;
        if self.room.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("room.tick_interval_ms must be positive".into()));
        }
        if self.room.max_players == 0 {
            return Err(ConfigError::Invalid("room.max_players must be positive".into()));
        }
        if self.net.max_input_length == 0 {
            return Err(ConfigError::Invalid("net.max_input_length must be positive".into()));
        }
        Ok(())
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn listen_addr(&self) -> String {
        if self.net.addr.contains(':') {
            format!("[{}]:{}", self.net.addr, self.net.port)
        } else {
            format!("{}:{}", self.net.addr, self.net.port)
        }
    }

    pub fn grid_config(&self) -> GridConfig {
        GridConfig {
            width: self.room.width,
            height: self.room.height,
            rubble_probability: self.room.rubble_probability,
        }
    }

    pub fn room_settings(&self) -> RoomSettings {
        RoomSettings {
            grid: self.grid_config(),
            tick: TickConfig::from_millis(self.room.tick_interval_ms),
            max_players: self.room.max_players,
            seed: self.room.seed,
        }
    }

    pub fn default_room(&self) -> Option<&str> {
        let name = self.room.default_room.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// Supports: `--config <path>`.
pub fn parse_cli_args<I>(args: I) -> Result<Option<PathBuf>, ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut config_path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => return Err(ConfigError::Usage("--config requires a path argument".into())),
            },
            other => return Err(ConfigError::Usage(format!("Unknown argument: {}", other))),
        }
    }
    Ok(config_path)
}
