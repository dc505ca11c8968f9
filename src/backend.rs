//! Capability interface the coordinator drives both playback engines through.
//!
//! The local engine and the remote cast engine are external collaborators; the
//! coordinator only ever sees them through these traits.

use tokio::sync::broadcast::Sender;

use crate::error::BackendError;
use crate::media_item::MediaItem;
use crate::protocol::{Message, PlaybackState, RepeatMode};

/// Converts a caller-supplied start offset to a backend start position.
///
/// Zero means "unset": the backend picks its own default position.
pub fn start_position(position_ms: u64) -> Option<u64> {
    (position_ms > 0).then_some(position_ms)
}

/// Transport surface shared by the local and remote engines.
///
/// Backends report callbacks by publishing `Message::Backend` on the bus they
/// were built with; the coordinator filters by source.
pub trait PlaybackBackend: Send {
    /// Replaces the timeline. `None` start fields leave the choice to the backend.
    fn set_items(
        &mut self,
        items: &[MediaItem],
        start_index: Option<usize>,
        start_position_ms: Option<u64>,
    ) -> Result<(), BackendError>;
    fn clear_items(&mut self);
    fn add_item(&mut self, item: &MediaItem);
    fn remove_item(&mut self, index: usize) -> Result<(), BackendError>;
    fn move_item(&mut self, from: usize, to: usize) -> Result<(), BackendError>;
    fn seek_to(&mut self, index: usize, position_ms: Option<u64>) -> Result<(), BackendError>;
    fn seek_to_position(&mut self, position_ms: u64);
    fn seek_forward(&mut self);
    fn seek_to_next(&mut self);
    fn seek_to_previous(&mut self);

    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn prepare(&mut self);
    fn release(&mut self);

    fn set_play_when_ready(&mut self, play_when_ready: bool);
    fn play_when_ready(&self) -> bool;

    fn current_position_ms(&self) -> u64;
    fn is_playing(&self) -> bool;
    fn playback_state(&self) -> PlaybackState;
    fn current_item_index(&self) -> Option<usize>;
    fn current_item(&self) -> Option<MediaItem>;
    /// Number of items in the backend's live timeline.
    fn timeline_len(&self) -> usize;

    fn set_repeat_mode(&mut self, _mode: RepeatMode) {}
    fn set_pause_at_end_of_items(&mut self, _pause: bool) {}
}

/// Remote engine: the transport surface plus cast session availability.
pub trait RemoteBackend: PlaybackBackend {
    fn is_session_available(&self) -> bool;
    /// Registers where `SessionMessage` availability signals are published.
    /// `None` removes the registration.
    fn set_availability_sink(&mut self, sink: Option<Sender<Message>>);
}
