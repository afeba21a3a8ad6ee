//! Channel broadcaster: hands loop events to another task.
//!
//! Uses a bounded `embassy-sync` channel so the sampling loop never waits
//! on a slow subscriber.  When the channel is full the new event is
//! dropped and counted; subscribers that fall behind can pull the latest
//! state from the snapshot instead.
//!
//! ```text
//! ┌──────────────┐  LoopEvent  ┌──────────────┐
//! │ Orchestrator │────────────▶│  EventFeed   │
//! │  (sampling)  │  try_send   │ (subscriber) │
//! └──────────────┘             └──────────────┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::app::events::LoopEvent;
use crate::app::ports::Broadcaster;

/// Channel depth for outbound events.
pub const EVENT_DEPTH: usize = 16;

type EventChannel = Channel<CriticalSectionRawMutex, LoopEvent, EVENT_DEPTH>;

struct Shared {
    channel: EventChannel,
    dropped: AtomicU32,
}

/// Sending half, used as the orchestrator's broadcaster.
pub struct ChannelBroadcaster {
    shared: Arc<Shared>,
}

/// Receiving half.
#[derive(Clone)]
pub struct EventFeed {
    shared: Arc<Shared>,
}

/// Create a connected broadcaster / feed pair.
pub fn event_channel() -> (ChannelBroadcaster, EventFeed) {
    let shared = Arc::new(Shared {
        channel: Channel::new(),
        dropped: AtomicU32::new(0),
    });
    (
        ChannelBroadcaster {
            shared: Arc::clone(&shared),
        },
        EventFeed { shared },
    )
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&mut self, event: &LoopEvent) {
        if self.shared.channel.try_send(event.clone()).is_err() {
            let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            // Warn on the first drop and every 100th after that.
            if dropped == 1 || dropped % 100 == 0 {
                warn!("ChannelBroadcaster: feed full, {dropped} events dropped");
            }
        }
    }
}

impl ChannelBroadcaster {
    pub fn dropped(&self) -> u32 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl EventFeed {
    /// Next queued event, if any.
    pub fn try_next(&self) -> Option<LoopEvent> {
        self.shared.channel.try_receive().ok()
    }

    /// Wait for the next event.
    pub async fn next(&self) -> LoopEvent {
        self.shared.channel.receive().await
    }

    /// Take everything currently queued.
    pub fn drain(&self) -> Vec<LoopEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}
