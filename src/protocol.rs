//! Event-bus protocol shared by the coordinator, its backends and the UI layer.
//!
//! Commands flow into the coordinator as `Control`, availability signals from
//! the casting session layer as `Session`, raw backend callbacks as `Backend`,
//! and everything the coordinator reports outward as `Playback`.

use crate::media_item::{MediaItem, QueueEntry};

/// Which playback engine a handle or callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Local,
    Remote,
}

/// Coarse backend lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Nothing loaded or stopped.
    #[default]
    Idle,
    Buffering,
    Ready,
    /// Reached the end of the timeline.
    Ended,
}

/// Repeat behavior applied by the local backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    Off, // Stop after the last item
    One, // Repeat the current item
    #[default]
    All, // Wrap to the first item
}

/// Why a backend's playback position jumped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscontinuityReason {
    AutoTransition,
    Seek,
    SeekAdjustment,
    Skip,
    Remove,
    Internal,
}

/// Snapshot of a backend position at a discontinuity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionInfo {
    /// Item index inside the backend's own timeline.
    pub item_index: Option<usize>,
    pub position_ms: u64,
}

/// Media track categories a backend may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
    Text,
}

/// One group of tracks of a single kind, with the backend's capability verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackGroup {
    pub kind: TrackKind,
    /// Whether the backend can render this group, capability limits ignored.
    pub supported: bool,
}

/// Track groups currently exposed by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tracks {
    pub groups: Vec<TrackGroup>,
}

impl Tracks {
    /// Returns `true` when any group of `kind` is present.
    pub fn contains_kind(&self, kind: TrackKind) -> bool {
        self.groups.iter().any(|group| group.kind == kind)
    }

    /// Returns `true` when at least one group of `kind` can be rendered.
    pub fn is_kind_supported(&self, kind: TrackKind) -> bool {
        self.groups
            .iter()
            .any(|group| group.kind == kind && group.supported)
    }
}

/// Generic player event flags forwarded to the listener verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    TimelineChanged,
    MediaItemTransition,
    TracksChanged,
    IsLoadingChanged,
    PlaybackStateChanged,
    PlayWhenReadyChanged,
    IsPlayingChanged,
    PositionDiscontinuity,
    MetadataChanged,
}

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Control(ControlMessage),
    Session(SessionMessage),
    Backend(BackendMessage),
    Playback(PlaybackMessage),
}

/// Commands addressed to the coordinator.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    SetQueue {
        entries: Vec<QueueEntry>,
        start_index: usize,
        start_position_ms: u64,
    },
    SelectItem {
        index: usize,
        position_ms: u64,
    },
    AddItem(QueueEntry),
    RemoveItem(MediaItem),
    MoveItem {
        item: MediaItem,
        new_index: usize,
    },
    Play,
    Pause,
    SeekTo {
        index: usize,
        position_ms: u64,
    },
    SeekToPosition(u64),
    SeekForward,
    SeekToNext,
    SeekToPrevious,
    SetPlayWhenReady(bool),
    /// Periodic tick asking for a position sample from the active backend.
    SamplePosition,
    Release,
}

/// Cast session availability signals from the casting session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMessage {
    Available,
    Unavailable,
}

/// Raw callback emitted by one backend.
#[derive(Debug, Clone)]
pub struct BackendMessage {
    pub source: BackendKind,
    pub event: BackendEvent,
}

/// Callback payloads a backend may emit.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    PlaybackStateChanged(PlaybackState),
    PositionDiscontinuity {
        old: PositionInfo,
        new: PositionInfo,
        reason: DiscontinuityReason,
    },
    TimelineChanged,
    TracksChanged(Tracks),
    Events(Vec<PlayerEvent>),
}

/// Notifications published by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackMessage {
    QueuePositionChanged {
        previous: Option<usize>,
        current: Option<usize>,
    },
    UnsupportedTrack(TrackKind),
    PlaybackStateChanged(PlaybackState),
    PositionDiscontinuity {
        old: PositionInfo,
        new: PositionInfo,
        reason: DiscontinuityReason,
    },
    Events {
        source: BackendKind,
        events: Vec<PlayerEvent>,
    },
    CastSessionAvailable,
    CastSessionUnavailable,
    PositionSampled {
        position_ms: u64,
    },
}
