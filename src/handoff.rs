//! Backend handoff planning.
//!
//! The coordinator, not either backend, owns the logical current index: a
//! cast receiver clears its timeline after playing through to the end, so the
//! incoming backend is always seeded from the coordinator's snapshot.

use crate::protocol::{BackendKind, PlaybackState};

/// What the outgoing backend reported right before the swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingStatus {
    pub playback_state: PlaybackState,
    pub position_ms: u64,
    pub play_when_ready: bool,
}

/// How the incoming backend gets loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffPlan {
    pub target: BackendKind,
    /// `None` lets the incoming backend fall back to its own default.
    pub start_index: Option<usize>,
    pub start_position_ms: Option<u64>,
    pub play_when_ready: bool,
}

impl HandoffPlan {
    /// First activation, with no previous backend to carry state from.
    pub fn initial(target: BackendKind) -> Self {
        Self {
            target,
            start_index: None,
            start_position_ms: None,
            play_when_ready: false,
        }
    }
}

/// Computes the load parameters for switching from `active` to `target`.
///
/// An ended outgoing backend carries no position or play intent; the incoming
/// one is seeded with `snapshot_index`, the last index known to be current.
/// Returns `None` when no switch is needed.
pub fn plan_handoff(
    active: BackendKind,
    target: BackendKind,
    outgoing: OutgoingStatus,
    current_index: Option<usize>,
    snapshot_index: Option<usize>,
) -> Option<HandoffPlan> {
    if active == target {
        return None;
    }
    if outgoing.playback_state == PlaybackState::Ended {
        return Some(HandoffPlan {
            start_index: snapshot_index,
            ..HandoffPlan::initial(target)
        });
    }
    Some(HandoffPlan {
        target,
        start_index: current_index,
        start_position_ms: Some(outgoing.position_ms),
        play_when_ready: outgoing.play_when_ready,
    })
}
