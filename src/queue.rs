//! Lock-step local/remote playback queue.
//!
//! Both lists always have the same length and the same id ordering. Every
//! mutation goes through one of the methods here, which apply it to both.

use crate::media_item::{MediaItem, QueueEntry};
use crate::protocol::BackendKind;

#[derive(Debug, Clone, Default)]
pub struct PlaybackQueue {
    local: Vec<MediaItem>,
    remote: Vec<MediaItem>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Replaces both lists wholesale.
    pub fn replace(&mut self, entries: Vec<QueueEntry>) {
        let (local, remote): (Vec<_>, Vec<_>) =
            entries.into_iter().map(QueueEntry::into_parts).unzip();
        self.local = local;
        self.remote = remote;
    }

    pub fn push(&mut self, entry: QueueEntry) {
        let (local, remote) = entry.into_parts();
        self.local.push(local);
        self.remote.push(remote);
    }

    /// Removes the entry at `index` from both lists.
    pub fn remove(&mut self, index: usize) -> Option<QueueEntry> {
        if index >= self.len() {
            return None;
        }
        let local = self.local.remove(index);
        let remote = self.remote.remove(index);
        Some(QueueEntry::from_queue_parts(local, remote))
    }

    /// Relocates the entry at `from` to `to` in both lists.
    ///
    /// Returns `false` without touching either list when an index is out of range.
    pub fn move_entry(&mut self, from: usize, to: usize) -> bool {
        let len = self.len();
        if from >= len || to >= len {
            return false;
        }
        let local = self.local.remove(from);
        self.local.insert(to, local);
        let remote = self.remote.remove(from);
        self.remote.insert(to, remote);
        true
    }

    pub fn clear(&mut self) {
        self.local.clear();
        self.remote.clear();
    }

    /// Position of the item with the same id as `item`.
    pub fn position_of(&self, item: &MediaItem) -> Option<usize> {
        self.local.iter().position(|queued| queued.id == item.id)
    }

    pub fn local(&self) -> &[MediaItem] {
        &self.local
    }

    pub fn remote(&self) -> &[MediaItem] {
        &self.remote
    }

    /// The list shaped for `kind`.
    pub fn items_for(&self, kind: BackendKind) -> &[MediaItem] {
        match kind {
            BackendKind::Local => &self.local,
            BackendKind::Remote => &self.remote,
        }
    }

    pub fn get(&self, index: usize) -> Option<&MediaItem> {
        self.local.get(index)
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        self.local.len() == self.remote.len()
            && self
                .local
                .iter()
                .zip(self.remote.iter())
                .all(|(local, remote)| local.id == remote.id)
    }
}
