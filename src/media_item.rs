//! Playable queue items and their paired local/remote representations.

use std::collections::BTreeMap;

use crate::error::CoordinatorError;

/// One playable unit as consumed by a single backend.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct MediaItem {
    /// Stable id shared by every representation of the same logical item.
    pub id: String,
    pub uri: String,
    pub title: String,
    /// Media type tag, e.g. `video/mp4`.
    pub mime_type: String,
    /// Transport-specific fields a backend may require.
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl MediaItem {
    pub fn new(
        id: impl Into<String>,
        uri: impl Into<String>,
        title: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            title: title.into(),
            mime_type: mime_type.into(),
            extras: BTreeMap::new(),
        }
    }

    /// Adds a transport-specific field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

/// A logical queue item in both backend shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    local: MediaItem,
    remote: MediaItem,
}

impl QueueEntry {
    /// Pairs two representations; both must carry the same id.
    pub fn new(local: MediaItem, remote: MediaItem) -> Result<Self, CoordinatorError> {
        if local.id != remote.id {
            return Err(CoordinatorError::IdentityMismatch {
                local: local.id,
                remote: remote.id,
            });
        }
        Ok(Self { local, remote })
    }

    /// Uses the same representation for both backends.
    pub fn mirrored(item: MediaItem) -> Self {
        Self {
            remote: item.clone(),
            local: item,
        }
    }

    /// Re-pairs items taken out of the queue, whose ids already match.
    pub(crate) fn from_queue_parts(local: MediaItem, remote: MediaItem) -> Self {
        debug_assert_eq!(local.id, remote.id);
        Self { local, remote }
    }

    pub fn id(&self) -> &str {
        &self.local.id
    }

    pub fn local(&self) -> &MediaItem {
        &self.local
    }

    pub fn remote(&self) -> &MediaItem {
        &self.remote
    }

    pub fn into_parts(self) -> (MediaItem, MediaItem) {
        (self.local, self.remote)
    }
}
