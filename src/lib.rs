//! Dual-backend playback coordination.
//!
//! A `PlaybackCoordinator` keeps one logical queue in two lock-step shapes, one
//! per playback engine, tracks the current item across both engines, and hands
//! playback off between the local engine and a remote cast engine whenever
//! cast session availability changes.

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handoff;
pub mod media_item;
pub mod position_poller;
pub mod protocol;
pub mod queue;
pub mod sim;
pub mod view_model;

pub use backend::{PlaybackBackend, RemoteBackend};
pub use config::Config;
pub use coordinator::{CoordinatorOptions, PlaybackCoordinator};
pub use error::{BackendError, ConfigError, CoordinatorError};
pub use media_item::{MediaItem, QueueEntry};
pub use protocol::{BackendKind, Message, PlaybackMessage, PlaybackState};
pub use view_model::{PlayerControllerState, PlayerViewModel, Video};
