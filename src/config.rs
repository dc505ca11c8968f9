//! Persistent configuration model, defaults and loading.

use std::path::{Path, PathBuf};

use log::info;

use crate::coordinator::CoordinatorOptions;
use crate::error::ConfigError;
use crate::protocol::RepeatMode;

const CONFIG_FILE_NAME: &str = "castplay.toml";
const MIN_POSITION_POLL_INTERVAL_MS: u64 = 100;

/// Root configuration persisted to `castplay.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Local engine and polling behavior.
    pub playback: PlaybackConfig,
    #[serde(default)]
    /// Remote item construction.
    pub cast: CastConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    /// Continue into the next item without pausing at item boundaries.
    #[serde(default)]
    pub auto_play: bool,
    #[serde(default)]
    pub repeat_mode: RepeatMode,
    #[serde(default = "default_position_poll_interval_ms")]
    pub position_poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CastConfig {
    /// Media type tag for items built from bare video URLs.
    #[serde(default = "default_mime_type")]
    pub default_mime_type: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            auto_play: false,
            repeat_mode: RepeatMode::All,
            position_poll_interval_ms: default_position_poll_interval_ms(),
        }
    }
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            default_mime_type: default_mime_type(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_position_poll_interval_ms() -> u64 {
    1_000
}

fn default_mime_type() -> String {
    "video/mp4".to_string()
}

fn default_log_level() -> String {
    "debug".to_string()
}

impl From<&PlaybackConfig> for CoordinatorOptions {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            auto_play: config.auto_play,
            repeat_mode: config.repeat_mode,
        }
    }
}

impl LoggingConfig {
    /// Parsed level filter, falling back to `Debug` for unknown names.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Debug)
    }
}

impl Config {
    /// Clamps values that would misbehave at runtime.
    pub fn sanitized(self) -> Self {
        let position_poll_interval_ms = self
            .playback
            .position_poll_interval_ms
            .max(MIN_POSITION_POLL_INTERVAL_MS);
        let default_mime_type = if self.cast.default_mime_type.trim().is_empty() {
            default_mime_type()
        } else {
            self.cast.default_mime_type
        };

        Config {
            playback: PlaybackConfig {
                position_poll_interval_ms,
                ..self.playback
            },
            cast: CastConfig { default_mime_type },
            logging: self.logging,
        }
    }

    /// Reads the config at `path`, writing the defaults there first if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            info!(
                "Config file not found. Creating default config. path={}",
                path.display()
            );
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let default_text = toml::to_string(&Config::default())?;
            std::fs::write(path, default_text).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str::<Config>(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config.sanitized())
    }
}

/// `<platform config dir>/castplay.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoConfigDir)
}
