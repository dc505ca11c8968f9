//! Dual-backend playback coordinator.
//!
//! Owns the lock-step queue and the logical current item index, routes
//! transport commands to whichever backend is active, and hands playback off
//! between the local engine and the remote cast engine when session
//! availability changes. All calls are expected from one serialized owner.

use log::{debug, info, trace, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{Receiver, Sender};

use crate::backend::{start_position, PlaybackBackend, RemoteBackend};
use crate::error::CoordinatorError;
use crate::handoff::{plan_handoff, HandoffPlan, OutgoingStatus};
use crate::media_item::{MediaItem, QueueEntry};
use crate::protocol::{
    BackendEvent, BackendKind, BackendMessage, ControlMessage, Message, PlaybackMessage,
    PlaybackState, RepeatMode, SessionMessage, TrackKind, Tracks,
};
use crate::queue::PlaybackQueue;

/// Local-engine setup applied once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// When `false`, the local engine pauses at the end of every item.
    pub auto_play: bool,
    pub repeat_mode: RepeatMode,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            auto_play: false,
            repeat_mode: RepeatMode::All,
        }
    }
}

struct Backends<L, R> {
    local: L,
    remote: R,
}

impl<L: PlaybackBackend, R: RemoteBackend> Backends<L, R> {
    fn get(&self, kind: BackendKind) -> &dyn PlaybackBackend {
        match kind {
            BackendKind::Local => &self.local,
            BackendKind::Remote => &self.remote,
        }
    }

    fn get_mut(&mut self, kind: BackendKind) -> &mut dyn PlaybackBackend {
        match kind {
            BackendKind::Local => &mut self.local,
            BackendKind::Remote => &mut self.remote,
        }
    }
}

pub struct PlaybackCoordinator<L, R> {
    backends: Backends<L, R>,
    bus_producer: Sender<Message>,
    queue: PlaybackQueue,
    current_item_index: Option<usize>,
    // Last index known to be current; survives the backend reporting Ended.
    snapshot_index: Option<usize>,
    active: BackendKind,
    released: bool,
    last_seen_tracks: Option<Tracks>,
}

impl<L: PlaybackBackend, R: RemoteBackend> PlaybackCoordinator<L, R> {
    /// Takes ownership of both engines and activates the remote one if a cast
    /// session is already available, the local one otherwise.
    pub fn new(
        mut local: L,
        mut remote: R,
        options: CoordinatorOptions,
        bus_producer: Sender<Message>,
    ) -> Self {
        local.prepare();
        local.set_play_when_ready(true);
        local.set_repeat_mode(options.repeat_mode);
        local.set_pause_at_end_of_items(!options.auto_play);

        remote.set_availability_sink(Some(bus_producer.clone()));
        let initial = if remote.is_session_available() {
            BackendKind::Remote
        } else {
            BackendKind::Local
        };

        let mut coordinator = Self {
            backends: Backends { local, remote },
            bus_producer,
            queue: PlaybackQueue::new(),
            current_item_index: None,
            snapshot_index: None,
            active: initial,
            released: false,
            last_seen_tracks: None,
        };
        info!("PlaybackCoordinator: starting on {:?} backend", initial);
        coordinator.activate(HandoffPlan::initial(initial));
        coordinator
    }

    fn emit(&self, message: PlaybackMessage) {
        let _ = self.bus_producer.send(Message::Playback(message));
    }

    fn active_player_mut(&mut self) -> Option<&mut dyn PlaybackBackend> {
        if self.released {
            return None;
        }
        Some(self.backends.get_mut(self.active))
    }

    /// The engine a surface should currently be bound to, `None` after release.
    pub fn active_player(&self) -> Option<&dyn PlaybackBackend> {
        if self.released {
            return None;
        }
        Some(self.backends.get(self.active))
    }

    pub fn active_backend(&self) -> Option<BackendKind> {
        (!self.released).then_some(self.active)
    }

    pub fn current_item_index(&self) -> Option<usize> {
        self.current_item_index
    }

    pub fn snapshot_index(&self) -> Option<usize> {
        self.snapshot_index
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Local-shaped item at `index`.
    pub fn item(&self, index: usize) -> Option<&MediaItem> {
        self.queue.get(index)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    // The only place the current index changes.
    fn set_current_item_and_notify(&mut self, index: Option<usize>) {
        if self.current_item_index == index {
            return;
        }
        let previous = self.current_item_index;
        self.current_item_index = index;
        if index.is_some() {
            self.snapshot_index = index;
        }
        debug!(
            "PlaybackCoordinator: queue position {:?} -> {:?}",
            previous, index
        );
        self.emit(PlaybackMessage::QueuePositionChanged {
            previous,
            current: index,
        });
    }

    /// Reloads the active backend when its timeline no longer matches the
    /// queue, seeks in place otherwise, then resumes auto-play.
    fn load_or_seek(&mut self, index: usize, position_ms: Option<u64>) {
        if self.released {
            return;
        }
        let kind = self.active;
        let queue_len = self.queue.len();
        let items = self.queue.items_for(kind);
        let player = self.backends.get_mut(kind);

        if player.timeline_len() != queue_len {
            // A cast receiver clears its timeline once the last item has played to the end.
            debug!(
                "PlaybackCoordinator: {:?} timeline has {} items, queue has {}; reloading",
                kind,
                player.timeline_len(),
                queue_len
            );
            player.stop();
            if let Err(err) = player.set_items(items, Some(index), position_ms) {
                warn!("PlaybackCoordinator: reload at item {} failed: {}", index, err);
            }
            player.prepare();
        } else if let Err(err) = player.seek_to(index, position_ms) {
            warn!("PlaybackCoordinator: seek to item {} failed: {}", index, err);
        }
        player.set_play_when_ready(true);
    }

    /// Replaces the queue and starts playing `start_index`.
    ///
    /// A `start_position_ms` of zero lets the backend choose the start position.
    pub fn set_queue(&mut self, entries: Vec<QueueEntry>, start_index: usize, start_position_ms: u64) {
        if self.released {
            debug!("PlaybackCoordinator: set_queue ignored after release");
            return;
        }
        self.queue.replace(entries);

        if self.queue.is_empty() {
            self.set_current_item_and_notify(None);
            self.snapshot_index = None;
            if let Some(player) = self.active_player_mut() {
                player.stop();
                player.clear_items();
            }
            return;
        }

        let (start_index, start_position_ms) = if start_index < self.queue.len() {
            (start_index, start_position_ms)
        } else {
            warn!(
                "PlaybackCoordinator: {}; starting at item 0",
                CoordinatorError::IndexOutOfRange {
                    index: start_index,
                    len: self.queue.len()
                }
            );
            (0, 0)
        };
        self.set_current_item_and_notify(Some(start_index));
        self.load_or_seek(start_index, start_position(start_position_ms));
    }

    /// Plays the queue item at `index`.
    pub fn select_item(&mut self, index: usize, position_ms: u64) {
        if self.released {
            debug!("PlaybackCoordinator: select_item ignored after release");
            return;
        }
        if index >= self.queue.len() {
            warn!(
                "PlaybackCoordinator: {}",
                CoordinatorError::IndexOutOfRange {
                    index,
                    len: self.queue.len()
                }
            );
            return;
        }
        self.set_current_item_and_notify(Some(index));
        self.load_or_seek(index, start_position(position_ms));
    }

    /// Appends an entry to the queue and to the active backend's timeline.
    pub fn add_item(&mut self, entry: QueueEntry) {
        if self.released {
            debug!("PlaybackCoordinator: add_item ignored after release");
            return;
        }
        self.queue.push(entry);
        let kind = self.active;
        if let Some(item) = self.queue.items_for(kind).last() {
            self.backends.get_mut(kind).add_item(item);
        }
    }

    /// Removes the item with the same id as `item`.
    pub fn remove_item(&mut self, item: &MediaItem) -> Result<(), CoordinatorError> {
        if self.released {
            return Err(CoordinatorError::BackendUnavailable);
        }
        let index = self
            .queue
            .position_of(item)
            .ok_or_else(|| CoordinatorError::NotFound {
                id: item.id.clone(),
            })?;

        if let Some(player) = self.active_player_mut() {
            if let Err(err) = player.remove_item(index) {
                warn!("PlaybackCoordinator: backend removal of item {} failed: {}", index, err);
            }
        }
        self.queue.remove(index);

        match self.current_item_index {
            Some(current) if current == index && index == self.queue.len() => {
                self.set_current_item_and_notify(None);
            }
            Some(current) if index < current => {
                self.set_current_item_and_notify(Some(current - 1));
            }
            _ => {}
        }
        Ok(())
    }

    /// Moves the item with the same id as `item` to `new_index`.
    pub fn move_item(&mut self, item: &MediaItem, new_index: usize) -> Result<(), CoordinatorError> {
        if self.released {
            return Err(CoordinatorError::BackendUnavailable);
        }
        let from = self
            .queue
            .position_of(item)
            .ok_or_else(|| CoordinatorError::NotFound {
                id: item.id.clone(),
            })?;
        let len = self.queue.len();
        if new_index >= len {
            return Err(CoordinatorError::IndexOutOfRange {
                index: new_index,
                len,
            });
        }

        if let Some(player) = self.active_player_mut() {
            if let Err(err) = player.move_item(from, new_index) {
                warn!(
                    "PlaybackCoordinator: backend move {} -> {} failed: {}",
                    from, new_index, err
                );
            }
        }
        self.queue.move_entry(from, new_index);

        match self.current_item_index {
            Some(current) if current == from => {
                self.set_current_item_and_notify(Some(new_index));
            }
            Some(current) if from < current && current <= new_index => {
                self.set_current_item_and_notify(Some(current - 1));
            }
            Some(current) if new_index <= current && current < from => {
                self.set_current_item_and_notify(Some(current + 1));
            }
            _ => {}
        }
        Ok(())
    }

    /// Switches playback to `target`, carrying queue position and play intent.
    pub fn handoff(&mut self, target: BackendKind) {
        if self.released {
            debug!("PlaybackCoordinator: handoff ignored after release");
            return;
        }
        let outgoing = self.backends.get(self.active);
        let status = OutgoingStatus {
            playback_state: outgoing.playback_state(),
            position_ms: outgoing.current_position_ms(),
            play_when_ready: outgoing.play_when_ready(),
        };
        let snapshot_index = self.snapshot_index.filter(|index| *index < self.queue.len());
        let Some(plan) = plan_handoff(
            self.active,
            target,
            status,
            self.current_item_index,
            snapshot_index,
        ) else {
            return;
        };

        info!(
            "PlaybackCoordinator: handing off {:?} -> {:?} (item {:?}, position {:?}ms, play_when_ready {})",
            self.active, target, plan.start_index, plan.start_position_ms, plan.play_when_ready
        );
        let outgoing = self.backends.get_mut(self.active);
        outgoing.stop();
        outgoing.clear_items();

        self.active = target;
        self.activate(plan);
    }

    fn activate(&mut self, plan: HandoffPlan) {
        let items = self.queue.items_for(plan.target);
        let incoming = self.backends.get_mut(plan.target);
        if let Err(err) = incoming.set_items(items, plan.start_index, plan.start_position_ms) {
            warn!(
                "PlaybackCoordinator: loading {:?} backend failed: {}",
                plan.target, err
            );
        }
        incoming.set_play_when_ready(plan.play_when_ready);
        incoming.prepare();
    }

    pub fn on_session_available(&mut self) {
        if self.released {
            return;
        }
        self.handoff(BackendKind::Remote);
        self.emit(PlaybackMessage::CastSessionAvailable);
    }

    pub fn on_session_unavailable(&mut self) {
        if self.released {
            return;
        }
        self.handoff(BackendKind::Local);
        self.emit(PlaybackMessage::CastSessionUnavailable);
    }

    /// Routes a raw backend callback. Callbacks from the inactive backend are dropped.
    pub fn on_backend_event(&mut self, message: BackendMessage) {
        if self.released || message.source != self.active {
            trace!(
                "PlaybackCoordinator: dropping {:?} callback from inactive backend",
                message.source
            );
            return;
        }
        match message.event {
            BackendEvent::PlaybackStateChanged(state) => {
                self.emit(PlaybackMessage::PlaybackStateChanged(state));
            }
            BackendEvent::PositionDiscontinuity { old, new, reason } => {
                self.sync_current_item_index();
                self.emit(PlaybackMessage::PositionDiscontinuity { old, new, reason });
            }
            BackendEvent::TimelineChanged => self.sync_current_item_index(),
            BackendEvent::TracksChanged(tracks) => self.check_tracks(tracks),
            BackendEvent::Events(events) => {
                self.emit(PlaybackMessage::Events {
                    source: message.source,
                    events,
                });
            }
        }
    }

    fn sync_current_item_index(&mut self) {
        let player = self.backends.get(self.active);
        let index = match player.playback_state() {
            PlaybackState::Idle | PlaybackState::Ended => None,
            _ => player.current_item_index(),
        };
        self.set_current_item_and_notify(index);
    }

    fn check_tracks(&mut self, tracks: Tracks) {
        if self.active != BackendKind::Local || self.last_seen_tracks.as_ref() == Some(&tracks) {
            return;
        }
        for kind in [TrackKind::Video, TrackKind::Audio] {
            if tracks.contains_kind(kind) && !tracks.is_kind_supported(kind) {
                warn!("PlaybackCoordinator: local backend cannot render {:?} track", kind);
                self.emit(PlaybackMessage::UnsupportedTrack(kind));
            }
        }
        self.last_seen_tracks = Some(tracks);
    }

    /// Publishes the active position if the active backend is playing.
    pub fn sample_position(&self) {
        if let Some(player) = self.active_player() {
            if player.is_playing() {
                self.emit(PlaybackMessage::PositionSampled {
                    position_ms: player.current_position_ms(),
                });
            }
        }
    }

    pub fn play(&mut self) {
        if let Some(player) = self.active_player_mut() {
            player.play();
        }
    }

    pub fn pause(&mut self) {
        if let Some(player) = self.active_player_mut() {
            player.pause();
        }
    }

    /// Seeks the active backend to `position_ms` inside item `index`.
    pub fn seek_to(&mut self, index: usize, position_ms: u64) {
        if index >= self.queue.len() {
            warn!(
                "PlaybackCoordinator: {}",
                CoordinatorError::IndexOutOfRange {
                    index,
                    len: self.queue.len()
                }
            );
            return;
        }
        if let Some(player) = self.active_player_mut() {
            if let Err(err) = player.seek_to(index, Some(position_ms)) {
                warn!("PlaybackCoordinator: seek to item {} failed: {}", index, err);
            }
        }
    }

    pub fn seek_to_position(&mut self, position_ms: u64) {
        if let Some(player) = self.active_player_mut() {
            player.seek_to_position(position_ms);
        }
    }

    pub fn seek_forward(&mut self) {
        if let Some(player) = self.active_player_mut() {
            player.seek_forward();
        }
    }

    pub fn seek_to_next(&mut self) {
        if let Some(player) = self.active_player_mut() {
            player.seek_to_next();
        }
    }

    pub fn seek_to_previous(&mut self) {
        if let Some(player) = self.active_player_mut() {
            player.seek_to_previous();
        }
    }

    pub fn set_play_when_ready(&mut self, play_when_ready: bool) {
        if let Some(player) = self.active_player_mut() {
            player.set_play_when_ready(play_when_ready);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.active_player().is_some_and(|player| player.is_playing())
    }

    pub fn current_position_ms(&self) -> Option<u64> {
        self.active_player().map(|player| player.current_position_ms())
    }

    /// Item the active backend is positioned on, as that backend sees it.
    pub fn current_item(&self) -> Option<MediaItem> {
        self.active_player().and_then(|player| player.current_item())
    }

    /// Index the active backend reports for itself, which may lag the coordinator's.
    pub fn backend_item_index(&self) -> Option<usize> {
        self.active_player()
            .and_then(|player| player.current_item_index())
    }

    pub fn is_cast_session_available(&self) -> bool {
        self.backends.remote.is_session_available()
    }

    /// Stops and releases both backends and drops all queue state. Safe to call twice.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        info!("PlaybackCoordinator: releasing");
        self.set_current_item_and_notify(None);
        self.queue.clear();
        self.snapshot_index = None;
        self.last_seen_tracks = None;

        self.backends.remote.set_availability_sink(None);
        self.backends.remote.stop();
        self.backends.remote.release();
        self.backends.local.stop();
        self.backends.local.release();
        self.released = true;
    }

    fn handle_control(&mut self, control: ControlMessage) -> bool {
        match control {
            ControlMessage::SetQueue {
                entries,
                start_index,
                start_position_ms,
            } => self.set_queue(entries, start_index, start_position_ms),
            ControlMessage::SelectItem { index, position_ms } => {
                self.select_item(index, position_ms)
            }
            ControlMessage::AddItem(entry) => self.add_item(entry),
            ControlMessage::RemoveItem(item) => {
                if let Err(err) = self.remove_item(&item) {
                    debug!("PlaybackCoordinator: remove request failed: {}", err);
                }
            }
            ControlMessage::MoveItem { item, new_index } => {
                if let Err(err) = self.move_item(&item, new_index) {
                    debug!("PlaybackCoordinator: move request failed: {}", err);
                }
            }
            ControlMessage::Play => self.play(),
            ControlMessage::Pause => self.pause(),
            ControlMessage::SeekTo { index, position_ms } => self.seek_to(index, position_ms),
            ControlMessage::SeekToPosition(position_ms) => self.seek_to_position(position_ms),
            ControlMessage::SeekForward => self.seek_forward(),
            ControlMessage::SeekToNext => self.seek_to_next(),
            ControlMessage::SeekToPrevious => self.seek_to_previous(),
            ControlMessage::SetPlayWhenReady(value) => self.set_play_when_ready(value),
            ControlMessage::SamplePosition => self.sample_position(),
            ControlMessage::Release => {
                self.release();
                return false;
            }
        }
        true
    }

    /// Processes one bus message. Returns `false` once the coordinator has been released.
    pub fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Control(control) => return self.handle_control(control),
            Message::Session(SessionMessage::Available) => self.on_session_available(),
            Message::Session(SessionMessage::Unavailable) => self.on_session_unavailable(),
            Message::Backend(backend_message) => self.on_backend_event(backend_message),
            Message::Playback(_) => {}
        }
        !self.released
    }

    /// Drives the coordinator from the bus until release or bus closure.
    pub fn run(&mut self, mut bus_consumer: Receiver<Message>) {
        loop {
            match bus_consumer.blocking_recv() {
                Ok(message) => {
                    if !self.handle_message(message) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("PlaybackCoordinator: bus lagged by {} messages", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tokio::sync::broadcast::{self, error::TryRecvError, Receiver};

    use super::{CoordinatorOptions, PlaybackCoordinator};
    use crate::backend::PlaybackBackend;
    use crate::error::CoordinatorError;
    use crate::media_item::{MediaItem, QueueEntry};
    use crate::protocol::{
        BackendEvent, BackendKind, BackendMessage, ControlMessage, DiscontinuityReason, Message,
        PlaybackMessage, PlaybackState, PositionInfo, RepeatMode, SessionMessage, TrackGroup,
        TrackKind, Tracks,
    };
    use crate::sim::{BackendCall, SimulatedPlayer};

    struct CoordinatorHarness {
        coordinator: PlaybackCoordinator<SimulatedPlayer, SimulatedPlayer>,
        local: SimulatedPlayer,
        remote: SimulatedPlayer,
        receiver: Receiver<Message>,
    }

    impl CoordinatorHarness {
        fn new(session_available: bool) -> Self {
            let (bus_sender, _) = broadcast::channel(256);
            let local = SimulatedPlayer::new(BackendKind::Local);
            let remote = SimulatedPlayer::new(BackendKind::Remote);
            remote.set_session_available(session_available);
            let receiver = bus_sender.subscribe();
            let coordinator = PlaybackCoordinator::new(
                local.clone(),
                remote.clone(),
                CoordinatorOptions::default(),
                bus_sender,
            );
            local.clear_calls();
            remote.clear_calls();
            Self {
                coordinator,
                local,
                remote,
                receiver,
            }
        }

        fn with_queue(ids: &[&str], start_index: usize) -> Self {
            let mut harness = Self::new(false);
            harness.coordinator.set_queue(entries(ids), start_index, 0);
            harness.local.clear_calls();
            harness.drain_playback_messages();
            harness
        }

        fn drain_playback_messages(&mut self) -> Vec<PlaybackMessage> {
            let mut messages = Vec::new();
            loop {
                match self.receiver.try_recv() {
                    Ok(Message::Playback(message)) => messages.push(message),
                    Ok(_) => {}
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Closed) => break,
                }
            }
            messages
        }

        fn position_changes(&mut self) -> Vec<(Option<usize>, Option<usize>)> {
            self.drain_playback_messages()
                .into_iter()
                .filter_map(|message| match message {
                    PlaybackMessage::QueuePositionChanged { previous, current } => {
                        Some((previous, current))
                    }
                    _ => None,
                })
                .collect()
        }

        fn queue_ids(&self) -> Vec<String> {
            self.coordinator
                .queue()
                .local()
                .iter()
                .map(|item| item.id.clone())
                .collect()
        }
    }

    fn entry(id: &str) -> QueueEntry {
        let local = MediaItem::new(id, format!("file:///videos/{id}.mp4"), id, "video/mp4");
        let remote = MediaItem::new(id, format!("https://cdn/{id}.mp4"), id, "video/mp4");
        QueueEntry::new(local, remote).expect("ids match")
    }

    fn entries(ids: &[&str]) -> Vec<QueueEntry> {
        ids.iter().map(|id| entry(id)).collect()
    }

    fn item(id: &str) -> MediaItem {
        entry(id).local().clone()
    }

    fn owned(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_construction_configures_local_engine_and_starts_local() {
        let harness = CoordinatorHarness::new(false);

        assert_eq!(harness.coordinator.active_backend(), Some(BackendKind::Local));
        assert_eq!(harness.local.repeat_mode(), RepeatMode::All);
        assert!(harness.local.pauses_at_end_of_items());
        assert!(harness.remote.has_availability_sink());
        assert_eq!(harness.coordinator.current_item_index(), None);
    }

    #[test]
    fn test_construction_starts_remote_when_session_available() {
        let harness = CoordinatorHarness::new(true);
        assert_eq!(harness.coordinator.active_backend(), Some(BackendKind::Remote));
        assert!(harness.coordinator.is_cast_session_available());
    }

    #[test]
    fn test_position_event_fires_only_on_actual_change() {
        let mut harness = CoordinatorHarness::new(false);
        harness.coordinator.set_queue(entries(&["a", "b", "c"]), 1, 0);
        assert_eq!(harness.position_changes(), vec![(None, Some(1))]);

        harness.coordinator.select_item(1, 0);
        harness.coordinator.select_item(1, 2_000);
        assert!(harness.position_changes().is_empty());

        harness.coordinator.select_item(2, 0);
        assert_eq!(harness.position_changes(), vec![(Some(1), Some(2))]);
    }

    #[test]
    fn test_set_queue_reloads_on_timeline_mismatch_and_seeks_otherwise() {
        let mut harness = CoordinatorHarness::new(true);

        harness.coordinator.set_queue(entries(&["a", "b", "c"]), 0, 0);
        assert_eq!(
            harness.remote.calls(),
            vec![
                BackendCall::Stop,
                BackendCall::SetItems {
                    ids: owned(&["a", "b", "c"]),
                    start_index: Some(0),
                    start_position_ms: None,
                },
                BackendCall::Prepare,
                BackendCall::SetPlayWhenReady(true),
            ]
        );

        harness.remote.clear_calls();
        harness.coordinator.set_queue(entries(&["a", "b", "c"]), 2, 5_000);
        assert_eq!(
            harness.remote.calls(),
            vec![
                BackendCall::SeekTo {
                    index: 2,
                    position_ms: Some(5_000),
                },
                BackendCall::SetPlayWhenReady(true),
            ]
        );
    }

    #[test]
    fn test_set_queue_reloads_after_receiver_clears_timeline() {
        let mut harness = CoordinatorHarness::new(true);
        harness.coordinator.set_queue(entries(&["a", "b"]), 1, 0);
        harness.remote.finish_playback();
        harness.remote.clear_calls();

        harness.coordinator.set_queue(entries(&["a", "b"]), 0, 0);
        assert_eq!(harness.remote.item_ids(), owned(&["a", "b"]));
        assert!(harness.remote.calls().contains(&BackendCall::Stop));
        assert_eq!(harness.coordinator.current_item_index(), Some(0));
    }

    #[test]
    fn test_set_queue_with_no_entries_unsets_current_item() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b"], 1);

        harness.coordinator.set_queue(Vec::new(), 0, 0);
        assert_eq!(harness.coordinator.current_item_index(), None);
        assert_eq!(harness.position_changes(), vec![(Some(1), None)]);
        assert_eq!(
            harness.local.calls(),
            vec![BackendCall::Stop, BackendCall::ClearItems]
        );
    }

    #[test]
    fn test_select_item_feeds_remote_shaped_items_to_remote() {
        let mut harness = CoordinatorHarness::new(true);
        harness.coordinator.set_queue(entries(&["a", "b"]), 0, 0);
        harness.remote.finish_playback();

        harness.coordinator.select_item(1, 0);
        let uris: Vec<String> = harness.remote.items().into_iter().map(|item| item.uri).collect();
        assert_eq!(uris, vec!["https://cdn/a.mp4", "https://cdn/b.mp4"]);
    }

    #[test]
    fn test_select_item_out_of_range_leaves_state_unchanged() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b"], 0);

        harness.coordinator.select_item(7, 0);
        assert_eq!(harness.coordinator.current_item_index(), Some(0));
        assert!(harness.position_changes().is_empty());
        assert!(harness.local.calls().is_empty());
    }

    #[test]
    fn test_seek_to_unresolvable_index_is_absorbed() {
        let mut harness = CoordinatorHarness::with_queue(&["a"], 0);

        harness.coordinator.seek_to(4, 1_000);
        assert!(harness.local.calls().is_empty());
        assert_eq!(harness.local.current_item_index(), Some(0));
        assert_eq!(harness.coordinator.current_item_index(), Some(0));
    }

    #[test]
    fn test_remove_preceding_item_shifts_current_index_down() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b", "c"], 1);

        harness
            .coordinator
            .remove_item(&item("a"))
            .expect("item is queued");

        assert_eq!(harness.coordinator.current_item_index(), Some(0));
        assert_eq!(harness.queue_ids(), owned(&["b", "c"]));
        assert_eq!(harness.coordinator.item(0).map(|item| item.id.as_str()), Some("b"));
        assert_eq!(harness.position_changes(), vec![(Some(1), Some(0))]);
        assert_eq!(harness.local.calls(), vec![BackendCall::RemoveItem(0)]);
    }

    #[test]
    fn test_remove_following_item_keeps_current_index() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b", "c"], 1);

        harness
            .coordinator
            .remove_item(&item("c"))
            .expect("item is queued");
        assert_eq!(harness.coordinator.current_item_index(), Some(1));
        assert!(harness.position_changes().is_empty());
    }

    #[test]
    fn test_remove_only_item_unsets_current_index() {
        let mut harness = CoordinatorHarness::with_queue(&["a"], 0);

        harness
            .coordinator
            .remove_item(&item("a"))
            .expect("item is queued");
        assert_eq!(harness.coordinator.current_item_index(), None);
        assert_eq!(harness.position_changes(), vec![(Some(0), None)]);
    }

    #[test]
    fn test_remove_current_tail_item_unsets_current_index() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b"], 1);

        harness
            .coordinator
            .remove_item(&item("b"))
            .expect("item is queued");
        assert_eq!(harness.coordinator.current_item_index(), None);
    }

    #[test]
    fn test_remove_unknown_item_fails_without_side_effects() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b"], 0);

        let result = harness.coordinator.remove_item(&item("z"));
        assert_eq!(
            result,
            Err(CoordinatorError::NotFound {
                id: "z".to_string()
            })
        );
        assert_eq!(harness.queue_ids(), owned(&["a", "b"]));
        assert!(harness.local.calls().is_empty());
    }

    #[test]
    fn test_move_current_item_follows_it() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b", "c", "d"], 1);

        harness
            .coordinator
            .move_item(&item("b"), 3)
            .expect("item is queued");
        assert_eq!(harness.coordinator.current_item_index(), Some(3));
        assert_eq!(harness.queue_ids(), owned(&["a", "c", "d", "b"]));
        assert_eq!(
            harness.local.calls(),
            vec![BackendCall::MoveItem { from: 1, to: 3 }]
        );
    }

    #[test]
    fn test_move_across_current_item_shifts_it() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b", "c", "d"], 2);

        harness
            .coordinator
            .move_item(&item("a"), 3)
            .expect("item is queued");
        assert_eq!(harness.coordinator.current_item_index(), Some(1));

        harness
            .coordinator
            .move_item(&item("d"), 0)
            .expect("item is queued");
        assert_eq!(harness.coordinator.current_item_index(), Some(2));
        assert_eq!(
            harness.position_changes(),
            vec![(Some(2), Some(1)), (Some(1), Some(2))]
        );
    }

    #[test]
    fn test_move_outside_shifted_range_keeps_current_index() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b", "c", "d"], 0);

        harness
            .coordinator
            .move_item(&item("c"), 3)
            .expect("item is queued");
        assert_eq!(harness.coordinator.current_item_index(), Some(0));
        assert!(harness.position_changes().is_empty());
    }

    #[test]
    fn test_move_rejects_unknown_item_and_out_of_range_target() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b"], 0);

        assert_eq!(
            harness.coordinator.move_item(&item("z"), 0),
            Err(CoordinatorError::NotFound {
                id: "z".to_string()
            })
        );
        assert_eq!(
            harness.coordinator.move_item(&item("a"), 2),
            Err(CoordinatorError::IndexOutOfRange { index: 2, len: 2 })
        );
        assert_eq!(harness.queue_ids(), owned(&["a", "b"]));
        assert!(harness.local.calls().is_empty());
    }

    #[test]
    fn test_add_item_updates_both_queue_shapes_and_active_timeline() {
        let mut harness = CoordinatorHarness::new(true);
        harness.coordinator.set_queue(entries(&["a"]), 0, 0);
        harness.remote.clear_calls();

        harness.coordinator.add_item(entry("b"));

        let queue = harness.coordinator.queue();
        assert_eq!(queue.local().len(), 2);
        assert_eq!(queue.remote()[1].uri, "https://cdn/b.mp4");
        assert_eq!(harness.remote.calls(), vec![BackendCall::AddItem("b".to_string())]);
        assert_eq!(harness.remote.items()[1].uri, "https://cdn/b.mp4");
    }

    #[test]
    fn test_queue_edits_keep_both_shapes_aligned() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b", "c"], 0);

        harness.coordinator.add_item(entry("d"));
        harness
            .coordinator
            .move_item(&item("d"), 1)
            .expect("item is queued");
        harness
            .coordinator
            .remove_item(&item("b"))
            .expect("item is queued");
        harness.coordinator.add_item(entry("e"));
        harness
            .coordinator
            .move_item(&item("a"), 3)
            .expect("item is queued");

        let queue = harness.coordinator.queue();
        let local_ids: Vec<&str> = queue.local().iter().map(|item| item.id.as_str()).collect();
        let remote_ids: Vec<&str> = queue.remote().iter().map(|item| item.id.as_str()).collect();
        assert_eq!(local_ids, vec!["d", "c", "e", "a"]);
        assert_eq!(local_ids, remote_ids);
        assert_eq!(harness.local.item_ids(), owned(&["d", "c", "e", "a"]));
        assert_eq!(harness.coordinator.current_item_index(), Some(3));
    }

    #[test]
    fn test_edits_at_both_ends_keep_shapes_and_current_item_aligned() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b", "c", "d", "e"], 2);

        harness.coordinator.remove_item(&item("a")).expect("item is queued");
        harness.coordinator.remove_item(&item("e")).expect("item is queued");
        harness.coordinator.move_item(&item("d"), 0).expect("item is queued");
        harness.coordinator.move_item(&item("d"), 2).expect("item is queued");
        harness.coordinator.add_item(entry("f"));
        harness.coordinator.remove_item(&item("b")).expect("item is queued");
        harness.coordinator.move_item(&item("f"), 0).expect("item is queued");

        let queue = harness.coordinator.queue();
        let local_ids: Vec<&str> = queue.local().iter().map(|item| item.id.as_str()).collect();
        let remote_ids: Vec<&str> = queue.remote().iter().map(|item| item.id.as_str()).collect();
        assert_eq!(local_ids, vec!["f", "c", "d"]);
        assert_eq!(local_ids, remote_ids);
        assert!(queue
            .remote()
            .iter()
            .all(|item| item.uri.starts_with("https://cdn/")));
        assert_eq!(harness.local.item_ids(), owned(&["f", "c", "d"]));

        assert_eq!(harness.coordinator.current_item_index(), Some(1));
        assert_eq!(harness.coordinator.item(1).map(|item| item.id.as_str()), Some("c"));
        assert_eq!(harness.local.current_item_index(), Some(1));
    }

    #[test]
    fn test_set_queue_with_start_past_end_starts_at_first_item() {
        let mut harness = CoordinatorHarness::new(false);

        harness.coordinator.set_queue(entries(&["a", "b", "c"]), 7, 5_000);
        assert_eq!(harness.coordinator.current_item_index(), Some(0));
        assert_eq!(harness.position_changes(), vec![(None, Some(0))]);
        assert_eq!(harness.local.item_ids(), owned(&["a", "b", "c"]));
        assert!(harness.local.calls().contains(&BackendCall::SetItems {
            ids: owned(&["a", "b", "c"]),
            start_index: Some(0),
            start_position_ms: None,
        }));

        harness.coordinator.remove_item(&item("a")).expect("item is queued");
        let current = harness.coordinator.current_item_index().expect("queue not empty");
        assert!(current < harness.coordinator.queue_len());
    }

    #[test]
    fn test_handoff_round_trip_restores_index_and_play_intent() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b", "c"], 1);
        harness.local.advance(30_000);

        harness.coordinator.handoff(BackendKind::Remote);
        assert_eq!(harness.coordinator.active_backend(), Some(BackendKind::Remote));
        assert_eq!(
            harness.local.calls(),
            vec![BackendCall::Stop, BackendCall::ClearItems]
        );
        assert_eq!(
            harness.remote.calls(),
            vec![
                BackendCall::SetItems {
                    ids: owned(&["a", "b", "c"]),
                    start_index: Some(1),
                    start_position_ms: Some(30_000),
                },
                BackendCall::SetPlayWhenReady(true),
                BackendCall::Prepare,
            ]
        );

        harness.local.clear_calls();
        harness.remote.advance(5_000);
        harness.coordinator.handoff(BackendKind::Local);

        assert_eq!(harness.coordinator.active_backend(), Some(BackendKind::Local));
        assert_eq!(harness.coordinator.current_item_index(), Some(1));
        assert_eq!(harness.coordinator.snapshot_index(), Some(1));
        assert_eq!(
            harness.local.calls(),
            vec![
                BackendCall::SetItems {
                    ids: owned(&["a", "b", "c"]),
                    start_index: Some(1),
                    start_position_ms: Some(35_000),
                },
                BackendCall::SetPlayWhenReady(true),
                BackendCall::Prepare,
            ]
        );
        assert!(harness.coordinator.is_playing());
        assert!(harness.position_changes().is_empty());
    }

    #[test]
    fn test_handoff_from_ended_backend_seeds_last_known_item_paused() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b", "c"], 2);
        harness.local.set_playback_state(PlaybackState::Ended);
        harness.coordinator.on_backend_event(BackendMessage {
            source: BackendKind::Local,
            event: BackendEvent::TimelineChanged,
        });
        assert_eq!(harness.coordinator.current_item_index(), None);
        assert_eq!(harness.coordinator.snapshot_index(), Some(2));
        harness.local.clear_calls();

        harness.coordinator.handoff(BackendKind::Remote);
        assert_eq!(harness.remote.current_item_index(), Some(2));
        assert_eq!(
            harness.remote.calls(),
            vec![
                BackendCall::SetItems {
                    ids: owned(&["a", "b", "c"]),
                    start_index: Some(2),
                    start_position_ms: None,
                },
                BackendCall::SetPlayWhenReady(false),
                BackendCall::Prepare,
            ]
        );
        assert_eq!(
            harness.local.calls(),
            vec![BackendCall::Stop, BackendCall::ClearItems]
        );
    }

    #[test]
    fn test_handoff_round_trip_keeps_paused_intent() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b", "c"], 1);
        harness.coordinator.pause();
        harness.local.advance(12_000);

        harness.coordinator.handoff(BackendKind::Remote);
        let remote_calls = harness.remote.calls();
        assert!(remote_calls.contains(&BackendCall::SetPlayWhenReady(false)));
        assert!(!remote_calls.contains(&BackendCall::SetPlayWhenReady(true)));
        assert!(!harness.coordinator.is_playing());

        harness.local.clear_calls();
        harness.coordinator.handoff(BackendKind::Local);
        assert_eq!(
            harness.local.calls(),
            vec![
                BackendCall::SetItems {
                    ids: owned(&["a", "b", "c"]),
                    start_index: Some(1),
                    start_position_ms: Some(12_000),
                },
                BackendCall::SetPlayWhenReady(false),
                BackendCall::Prepare,
            ]
        );
        assert_eq!(harness.coordinator.current_item_index(), Some(1));
        assert!(!harness.coordinator.is_playing());
    }

    #[test]
    fn test_handoff_to_active_backend_is_no_op() {
        let mut harness = CoordinatorHarness::with_queue(&["a"], 0);

        harness.coordinator.handoff(BackendKind::Local);
        assert!(harness.local.calls().is_empty());
        assert!(harness.remote.calls().is_empty());
    }

    #[test]
    fn test_session_signals_hand_off_and_notify_after_switch() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b"], 0);

        harness.remote.set_session_available(true);
        let signal = harness.receiver.try_recv().expect("sink registered on bus");
        assert!(matches!(signal, Message::Session(SessionMessage::Available)));
        assert!(harness.coordinator.handle_message(signal));

        assert_eq!(harness.coordinator.active_backend(), Some(BackendKind::Remote));
        assert_eq!(
            harness.drain_playback_messages(),
            vec![PlaybackMessage::CastSessionAvailable]
        );

        harness.coordinator.on_session_unavailable();
        assert_eq!(harness.coordinator.active_backend(), Some(BackendKind::Local));
        assert_eq!(
            harness.drain_playback_messages(),
            vec![PlaybackMessage::CastSessionUnavailable]
        );
    }

    #[test]
    fn test_backend_callbacks_are_forwarded_only_from_active_backend() {
        let mut harness = CoordinatorHarness::with_queue(&["a"], 0);

        harness.coordinator.on_backend_event(BackendMessage {
            source: BackendKind::Remote,
            event: BackendEvent::PlaybackStateChanged(PlaybackState::Buffering),
        });
        assert!(harness.drain_playback_messages().is_empty());

        harness.coordinator.on_backend_event(BackendMessage {
            source: BackendKind::Local,
            event: BackendEvent::PlaybackStateChanged(PlaybackState::Ready),
        });
        assert_eq!(
            harness.drain_playback_messages(),
            vec![PlaybackMessage::PlaybackStateChanged(PlaybackState::Ready)]
        );
    }

    #[test]
    fn test_discontinuity_resyncs_current_index_from_backend() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b", "c"], 0);
        harness.coordinator.seek_to_next();

        let old = PositionInfo {
            item_index: Some(0),
            position_ms: 9_000,
        };
        let new = PositionInfo {
            item_index: Some(1),
            position_ms: 0,
        };
        harness.coordinator.on_backend_event(BackendMessage {
            source: BackendKind::Local,
            event: BackendEvent::PositionDiscontinuity {
                old,
                new,
                reason: DiscontinuityReason::Skip,
            },
        });

        assert_eq!(harness.coordinator.current_item_index(), Some(1));
        assert_eq!(
            harness.drain_playback_messages(),
            vec![
                PlaybackMessage::QueuePositionChanged {
                    previous: Some(0),
                    current: Some(1),
                },
                PlaybackMessage::PositionDiscontinuity {
                    old,
                    new,
                    reason: DiscontinuityReason::Skip,
                },
            ]
        );
    }

    #[test]
    fn test_timeline_change_on_ended_backend_unsets_current_index() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b"], 1);
        harness.local.set_playback_state(PlaybackState::Ended);

        harness.coordinator.on_backend_event(BackendMessage {
            source: BackendKind::Local,
            event: BackendEvent::TimelineChanged,
        });
        assert_eq!(harness.coordinator.current_item_index(), None);
    }

    #[test]
    fn test_unsupported_tracks_reported_once_and_only_for_local() {
        let mut harness = CoordinatorHarness::with_queue(&["a"], 0);
        let tracks = Tracks {
            groups: vec![
                TrackGroup {
                    kind: TrackKind::Video,
                    supported: false,
                },
                TrackGroup {
                    kind: TrackKind::Audio,
                    supported: true,
                },
            ],
        };
        let message = BackendMessage {
            source: BackendKind::Local,
            event: BackendEvent::TracksChanged(tracks.clone()),
        };

        harness.coordinator.on_backend_event(message.clone());
        assert_eq!(
            harness.drain_playback_messages(),
            vec![PlaybackMessage::UnsupportedTrack(TrackKind::Video)]
        );

        harness.coordinator.on_backend_event(message);
        assert!(harness.drain_playback_messages().is_empty());

        harness.coordinator.handoff(BackendKind::Remote);
        harness.coordinator.on_backend_event(BackendMessage {
            source: BackendKind::Remote,
            event: BackendEvent::TracksChanged(Tracks {
                groups: vec![TrackGroup {
                    kind: TrackKind::Audio,
                    supported: false,
                }],
            }),
        });
        assert!(harness.drain_playback_messages().is_empty());
    }

    #[test]
    fn test_sample_position_reports_only_while_playing() {
        let mut harness = CoordinatorHarness::with_queue(&["a"], 0);
        harness.local.advance(4_000);

        harness.coordinator.sample_position();
        assert_eq!(
            harness.drain_playback_messages(),
            vec![PlaybackMessage::PositionSampled { position_ms: 4_000 }]
        );

        harness.coordinator.pause();
        harness.coordinator.sample_position();
        assert!(harness.drain_playback_messages().is_empty());
    }

    #[test]
    fn test_release_tears_down_everything_once() {
        let mut harness = CoordinatorHarness::with_queue(&["a", "b"], 1);

        harness.coordinator.release();
        assert!(harness.local.is_released());
        assert!(harness.remote.is_released());
        assert!(!harness.remote.has_availability_sink());
        assert_eq!(harness.coordinator.queue_len(), 0);
        assert_eq!(harness.coordinator.current_item_index(), None);
        assert_eq!(harness.coordinator.active_backend(), None);
        assert_eq!(harness.position_changes(), vec![(Some(1), None)]);

        harness.local.clear_calls();
        harness.remote.clear_calls();
        harness.coordinator.release();
        assert_eq!(
            harness.coordinator.remove_item(&item("a")),
            Err(CoordinatorError::BackendUnavailable)
        );
        harness.coordinator.play();
        harness.coordinator.select_item(0, 0);
        harness.coordinator.handoff(BackendKind::Remote);
        assert!(harness.local.calls().is_empty());
        assert!(harness.remote.calls().is_empty());
        assert!(harness.drain_playback_messages().is_empty());
    }

    #[test]
    fn test_run_loop_processes_bus_until_release() {
        let (bus_sender, _) = broadcast::channel(256);
        let local = SimulatedPlayer::new(BackendKind::Local);
        let remote = SimulatedPlayer::new(BackendKind::Remote);
        let consumer = bus_sender.subscribe();
        let mut coordinator = PlaybackCoordinator::new(
            local.clone(),
            remote.clone(),
            CoordinatorOptions::default(),
            bus_sender.clone(),
        );

        let worker = thread::spawn(move || {
            coordinator.run(consumer);
            coordinator
        });

        bus_sender
            .send(Message::Control(ControlMessage::SetQueue {
                entries: entries(&["a", "b"]),
                start_index: 1,
                start_position_ms: 0,
            }))
            .expect("bus has receivers");
        bus_sender
            .send(Message::Control(ControlMessage::Release))
            .expect("bus has receivers");

        let coordinator = worker.join().expect("run loop should not panic");
        assert!(coordinator.is_released());
        assert!(local.calls().contains(&BackendCall::SetItems {
            ids: owned(&["a", "b"]),
            start_index: Some(1),
            start_position_ms: None,
        }));
    }
}
