//! In-memory playback engine used by the demo driver and tests.
//!
//! `SimulatedPlayer` implements both backend traits. Clones share state, so a
//! caller can keep a clone to inspect and script the engine after handing the
//! original to the coordinator.

use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use tokio::sync::broadcast::Sender;

use crate::backend::{PlaybackBackend, RemoteBackend};
use crate::error::BackendError;
use crate::media_item::MediaItem;
use crate::protocol::{
    BackendEvent, BackendKind, BackendMessage, Message, PlaybackState, RepeatMode, SessionMessage,
};

const SEEK_FORWARD_INCREMENT_MS: u64 = 15_000;

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    SetItems {
        ids: Vec<String>,
        start_index: Option<usize>,
        start_position_ms: Option<u64>,
    },
    ClearItems,
    AddItem(String),
    RemoveItem(usize),
    MoveItem {
        from: usize,
        to: usize,
    },
    SeekTo {
        index: usize,
        position_ms: Option<u64>,
    },
    SeekToPosition(u64),
    SeekForward,
    SeekToNext,
    SeekToPrevious,
    Play,
    Pause,
    Stop,
    Prepare,
    Release,
    SetPlayWhenReady(bool),
}

#[derive(Debug)]
struct SimulatedState {
    kind: BackendKind,
    items: Vec<MediaItem>,
    index: Option<usize>,
    position_ms: u64,
    play_when_ready: bool,
    playback_state: PlaybackState,
    repeat_mode: RepeatMode,
    pause_at_end_of_items: bool,
    released: bool,
    clears_timeline_on_end: bool,
    session_available: bool,
    availability_sink: Option<Sender<Message>>,
    bus_producer: Option<Sender<Message>>,
    calls: Vec<BackendCall>,
}

#[derive(Debug, Clone)]
pub struct SimulatedPlayer {
    inner: Arc<Mutex<SimulatedState>>,
}

impl SimulatedPlayer {
    /// Creates an engine of `kind`. Remote engines clear their timeline when
    /// playback runs to the end, like a cast receiver does.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimulatedState {
                kind,
                items: Vec::new(),
                index: None,
                position_ms: 0,
                play_when_ready: false,
                playback_state: PlaybackState::Idle,
                repeat_mode: RepeatMode::Off,
                pause_at_end_of_items: false,
                released: false,
                clears_timeline_on_end: kind == BackendKind::Remote,
                session_available: false,
                availability_sink: None,
                bus_producer: None,
                calls: Vec::new(),
            })),
        }
    }

    /// Publishes backend callbacks on `bus_producer`.
    pub fn with_bus(self, bus_producer: Sender<Message>) -> Self {
        self.state().bus_producer = Some(bus_producer);
        self
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        match self.inner.lock() {
            Ok(locked) => locked,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(state: &mut SimulatedState, call: BackendCall) {
        state.calls.push(call);
    }

    fn publish(state: &SimulatedState, event: BackendEvent) {
        if let Some(bus_producer) = state.bus_producer.as_ref() {
            let _ = bus_producer.send(Message::Backend(BackendMessage {
                source: state.kind,
                event,
            }));
        }
    }

    /// Publishes an arbitrary backend callback.
    pub fn emit(&self, event: BackendEvent) {
        let state = self.state();
        Self::publish(&state, event);
    }

    /// Flips session availability and signals the registered sink.
    pub fn set_session_available(&self, available: bool) {
        let mut state = self.state();
        state.session_available = available;
        if let Some(sink) = state.availability_sink.as_ref() {
            let signal = if available {
                SessionMessage::Available
            } else {
                SessionMessage::Unavailable
            };
            let _ = sink.send(Message::Session(signal));
        }
    }

    /// Plays the timeline through to the end.
    pub fn finish_playback(&self) {
        let mut state = self.state();
        state.playback_state = PlaybackState::Ended;
        if state.clears_timeline_on_end {
            debug!("SimulatedPlayer: receiver cleared its timeline after playback ended");
            state.items.clear();
            state.index = None;
            state.position_ms = 0;
        }
        Self::publish(&state, BackendEvent::PlaybackStateChanged(PlaybackState::Ended));
    }

    /// Moves the playhead forward as if `elapsed_ms` had been played.
    pub fn advance(&self, elapsed_ms: u64) {
        let mut state = self.state();
        state.position_ms = state.position_ms.saturating_add(elapsed_ms);
    }

    pub fn set_playback_state(&self, playback_state: PlaybackState) {
        self.state().playback_state = playback_state;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn item_ids(&self) -> Vec<String> {
        self.state().items.iter().map(|item| item.id.clone()).collect()
    }

    pub fn items(&self) -> Vec<MediaItem> {
        self.state().items.clone()
    }

    pub fn is_released(&self) -> bool {
        self.state().released
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.state().repeat_mode
    }

    pub fn pauses_at_end_of_items(&self) -> bool {
        self.state().pause_at_end_of_items
    }

    pub fn has_availability_sink(&self) -> bool {
        self.state().availability_sink.is_some()
    }
}

impl PlaybackBackend for SimulatedPlayer {
    fn set_items(
        &mut self,
        items: &[MediaItem],
        start_index: Option<usize>,
        start_position_ms: Option<u64>,
    ) -> Result<(), BackendError> {
        let mut state = self.state();
        Self::record(
            &mut state,
            BackendCall::SetItems {
                ids: items.iter().map(|item| item.id.clone()).collect(),
                start_index,
                start_position_ms,
            },
        );
        if state.released {
            return Err(BackendError::Released);
        }
        if let Some(index) = start_index {
            if index >= items.len() {
                return Err(BackendError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
        }
        let fallback = state.index.filter(|index| *index < items.len());
        state.items = items.to_vec();
        state.index = start_index
            .or(fallback)
            .or_else(|| (!items.is_empty()).then_some(0));
        state.position_ms = start_position_ms.unwrap_or(0);
        Self::publish(&state, BackendEvent::TimelineChanged);
        Ok(())
    }

    fn clear_items(&mut self) {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::ClearItems);
        state.items.clear();
        state.index = None;
        state.position_ms = 0;
    }

    fn add_item(&mut self, item: &MediaItem) {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::AddItem(item.id.clone()));
        state.items.push(item.clone());
        if state.index.is_none() {
            state.index = Some(0);
        }
    }

    fn remove_item(&mut self, index: usize) -> Result<(), BackendError> {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::RemoveItem(index));
        let len = state.items.len();
        if index >= len {
            return Err(BackendError::IndexOutOfRange { index, len });
        }
        state.items.remove(index);
        let remaining = state.items.len();
        state.index = match state.index {
            Some(current) if index < current => Some(current - 1),
            Some(current) if index == current => {
                (remaining > 0).then(|| current.min(remaining - 1))
            }
            other => other,
        };
        Ok(())
    }

    fn move_item(&mut self, from: usize, to: usize) -> Result<(), BackendError> {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::MoveItem { from, to });
        let len = state.items.len();
        if from >= len || to >= len {
            return Err(BackendError::IndexOutOfRange {
                index: from.max(to),
                len,
            });
        }
        let item = state.items.remove(from);
        state.items.insert(to, item);
        state.index = match state.index {
            Some(current) if current == from => Some(to),
            Some(current) if from < current && current <= to => Some(current - 1),
            Some(current) if to <= current && current < from => Some(current + 1),
            other => other,
        };
        Ok(())
    }

    fn seek_to(&mut self, index: usize, position_ms: Option<u64>) -> Result<(), BackendError> {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::SeekTo { index, position_ms });
        let len = state.items.len();
        if index >= len {
            return Err(BackendError::IndexOutOfRange { index, len });
        }
        state.index = Some(index);
        state.position_ms = position_ms.unwrap_or(0);
        Ok(())
    }

    fn seek_to_position(&mut self, position_ms: u64) {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::SeekToPosition(position_ms));
        state.position_ms = position_ms;
    }

    fn seek_forward(&mut self) {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::SeekForward);
        state.position_ms = state.position_ms.saturating_add(SEEK_FORWARD_INCREMENT_MS);
    }

    fn seek_to_next(&mut self) {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::SeekToNext);
        let len = state.items.len();
        if let Some(current) = state.index {
            if current + 1 < len {
                state.index = Some(current + 1);
                state.position_ms = 0;
            } else if state.repeat_mode == RepeatMode::All && len > 0 {
                state.index = Some(0);
                state.position_ms = 0;
            }
        }
    }

    fn seek_to_previous(&mut self) {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::SeekToPrevious);
        if let Some(current) = state.index {
            state.index = Some(current.saturating_sub(1));
            state.position_ms = 0;
        }
    }

    fn play(&mut self) {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::Play);
        state.play_when_ready = true;
    }

    fn pause(&mut self) {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::Pause);
        state.play_when_ready = false;
    }

    fn stop(&mut self) {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::Stop);
        state.playback_state = PlaybackState::Idle;
    }

    fn prepare(&mut self) {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::Prepare);
        let next = if state.items.is_empty() {
            PlaybackState::Ended
        } else {
            PlaybackState::Ready
        };
        if state.playback_state != next {
            state.playback_state = next;
            Self::publish(&state, BackendEvent::PlaybackStateChanged(next));
        }
    }

    fn release(&mut self) {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::Release);
        state.released = true;
        state.items.clear();
        state.index = None;
        state.playback_state = PlaybackState::Idle;
    }

    fn set_play_when_ready(&mut self, play_when_ready: bool) {
        let mut state = self.state();
        Self::record(&mut state, BackendCall::SetPlayWhenReady(play_when_ready));
        state.play_when_ready = play_when_ready;
    }

    fn play_when_ready(&self) -> bool {
        self.state().play_when_ready
    }

    fn current_position_ms(&self) -> u64 {
        self.state().position_ms
    }

    fn is_playing(&self) -> bool {
        let state = self.state();
        state.play_when_ready && state.playback_state == PlaybackState::Ready
    }

    fn playback_state(&self) -> PlaybackState {
        self.state().playback_state
    }

    fn current_item_index(&self) -> Option<usize> {
        self.state().index
    }

    fn current_item(&self) -> Option<MediaItem> {
        let state = self.state();
        state.index.and_then(|index| state.items.get(index).cloned())
    }

    fn timeline_len(&self) -> usize {
        self.state().items.len()
    }

    fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.state().repeat_mode = mode;
    }

    fn set_pause_at_end_of_items(&mut self, pause: bool) {
        self.state().pause_at_end_of_items = pause;
    }
}

impl RemoteBackend for SimulatedPlayer {
    fn is_session_available(&self) -> bool {
        self.state().session_available
    }

    fn set_availability_sink(&mut self, sink: Option<Sender<Message>>) {
        self.state().availability_sink = sink;
    }
}
