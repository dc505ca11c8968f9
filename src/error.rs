//! Error types surfaced by the coordinator, its backends and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Failures returned by coordinator operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("item '{id}' is not in the playback queue")]
    NotFound { id: String },
    #[error("index {index} is out of range for a queue of {len} items")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no playback backend is available")]
    BackendUnavailable,
    #[error("local item '{local}' and remote item '{remote}' do not share an id")]
    IdentityMismatch { local: String, remote: String },
}

/// Failures reported by a playback backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("index {index} is out of range for a timeline of {len} items")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("backend has been released")]
    Released,
}

/// Failures while reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no config directory available on this platform")]
    NoConfigDir,
}
