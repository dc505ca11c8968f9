//! Periodic position sampling.
//!
//! The poller never touches a backend itself: it ticks
//! `ControlMessage::SamplePosition` onto the bus and the coordinator answers
//! with `PlaybackMessage::PositionSampled` while the active backend is playing.

use std::time::Duration;

use log::debug;
use tokio::runtime::Handle;
use tokio::sync::broadcast::Sender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::protocol::{ControlMessage, Message};

pub struct PositionPoller {
    handle: JoinHandle<()>,
}

impl PositionPoller {
    /// Starts ticking every `interval` on `runtime`. The first tick fires one
    /// interval after spawning.
    pub fn spawn(runtime: &Handle, bus_producer: Sender<Message>, interval: Duration) -> Self {
        debug!("PositionPoller: sampling every {}ms", interval.as_millis());
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if bus_producer
                    .send(Message::Control(ControlMessage::SamplePosition))
                    .is_err()
                {
                    debug!("PositionPoller: bus has no receivers, stopping");
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for PositionPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
