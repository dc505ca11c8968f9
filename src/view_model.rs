//! Headless player screen state.
//!
//! Builds queue entries from plain videos, owns the coordinator and reflects
//! its bus notifications into `PlayerControllerState` for a UI layer to read.

use std::time::Duration;

use log::{debug, trace, warn};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::{Receiver, Sender};

use crate::backend::{PlaybackBackend, RemoteBackend};
use crate::config::Config;
use crate::coordinator::{CoordinatorOptions, PlaybackCoordinator};
use crate::media_item::{MediaItem, QueueEntry};
use crate::position_poller::PositionPoller;
use crate::protocol::{BackendKind, Message, PlaybackMessage, PlaybackState, TrackKind};

/// A playable video as the UI knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Video {
    pub id: u64,
    pub url: String,
    pub title: String,
}

impl Video {
    pub fn new(id: u64, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            title: title.into(),
        }
    }

    fn to_media_item(&self, mime_type: &str) -> MediaItem {
        MediaItem::new(self.id.to_string(), &self.url, &self.title, mime_type)
    }
}

/// Observable controller state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerControllerState {
    pub current_position_ms: u64,
    pub playback_state: PlaybackState,
    pub queue_position: Option<usize>,
    pub casting: bool,
    pub unsupported_tracks: Vec<TrackKind>,
}

pub struct PlayerViewModel<L, R> {
    coordinator: PlaybackCoordinator<L, R>,
    bus_producer: Sender<Message>,
    bus_consumer: Receiver<Message>,
    state: PlayerControllerState,
    default_mime_type: String,
    poll_interval: Duration,
    poller: Option<PositionPoller>,
}

impl<L: PlaybackBackend, R: RemoteBackend> PlayerViewModel<L, R> {
    pub fn new(local: L, remote: R, config: &Config, bus_producer: Sender<Message>) -> Self {
        let bus_consumer = bus_producer.subscribe();
        let coordinator = PlaybackCoordinator::new(
            local,
            remote,
            CoordinatorOptions::from(&config.playback),
            bus_producer.clone(),
        );
        let state = PlayerControllerState {
            casting: coordinator.active_backend() == Some(BackendKind::Remote),
            ..PlayerControllerState::default()
        };
        Self {
            coordinator,
            bus_producer,
            bus_consumer,
            state,
            default_mime_type: config.cast.default_mime_type.clone(),
            poll_interval: Duration::from_millis(config.playback.position_poll_interval_ms),
            poller: None,
        }
    }

    pub fn state(&self) -> &PlayerControllerState {
        &self.state
    }

    pub fn coordinator(&self) -> &PlaybackCoordinator<L, R> {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut PlaybackCoordinator<L, R> {
        &mut self.coordinator
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .as_ref()
            .is_some_and(|poller| poller.is_running())
    }

    /// Loads `videos` into both queue shapes, keeping the active backend on
    /// the item it is already positioned at when that item still exists.
    pub fn set_videos(&mut self, videos: &[Video], slider_position_ms: u64) {
        let entries: Vec<QueueEntry> = videos
            .iter()
            .map(|video| QueueEntry::mirrored(video.to_media_item(&self.default_mime_type)))
            .collect();
        let start_index = self
            .coordinator
            .backend_item_index()
            .filter(|index| *index < entries.len())
            .unwrap_or(0);
        debug!(
            "PlayerViewModel: loading {} videos at item {} ({}ms)",
            entries.len(),
            start_index,
            slider_position_ms
        );
        self.coordinator
            .set_queue(entries, start_index, slider_position_ms);
    }

    /// Drains the bus, feeding commands and callbacks to the coordinator and
    /// its notifications into the controller state. Returns the number of
    /// messages handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let message = match self.bus_consumer.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("PlayerViewModel: bus lagged by {} messages", skipped);
                    continue;
                }
            };
            handled += 1;
            match message {
                Message::Playback(notification) => self.apply(notification),
                other => {
                    if !self.coordinator.handle_message(other) {
                        self.stop_polling();
                    }
                }
            }
        }
        handled
    }

    fn apply(&mut self, notification: PlaybackMessage) {
        match notification {
            PlaybackMessage::QueuePositionChanged { current, .. } => {
                self.state.queue_position = current;
            }
            PlaybackMessage::UnsupportedTrack(kind) => {
                if !self.state.unsupported_tracks.contains(&kind) {
                    self.state.unsupported_tracks.push(kind);
                }
            }
            PlaybackMessage::PlaybackStateChanged(playback_state) => {
                self.state.playback_state = playback_state;
                if playback_state == PlaybackState::Ready {
                    self.start_polling();
                }
            }
            PlaybackMessage::PositionSampled { position_ms } => {
                self.state.current_position_ms = position_ms;
            }
            PlaybackMessage::CastSessionAvailable => self.state.casting = true,
            PlaybackMessage::CastSessionUnavailable => self.state.casting = false,
            PlaybackMessage::PositionDiscontinuity { old, new, reason } => {
                debug!(
                    "PlayerViewModel: discontinuity {:?} -> {:?} ({:?})",
                    old.item_index, new.item_index, reason
                );
            }
            PlaybackMessage::Events { source, events } => {
                trace!("PlayerViewModel: {:?} events {:?}", source, events);
            }
        }
    }

    fn start_polling(&mut self) {
        if self.is_polling() {
            return;
        }
        match Handle::try_current() {
            Ok(runtime) => {
                self.poller = Some(PositionPoller::spawn(
                    &runtime,
                    self.bus_producer.clone(),
                    self.poll_interval,
                ));
            }
            Err(_) => debug!("PlayerViewModel: no tokio runtime, position polling disabled"),
        }
    }

    fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.cancel();
        }
    }

    /// Stops polling and releases the coordinator together with both backends.
    pub fn on_release(&mut self) {
        self.stop_polling();
        self.coordinator.release();
        self.pump();
    }
}
