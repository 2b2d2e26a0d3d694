//! # Event Publisher
//!
//! In-memory fan-out of Xmsg lifecycle events.

use crate::domain::XmsgEvent;
use crate::ports::XmsgEventPublisher;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// Default channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Publisher over a `tokio::sync::broadcast` channel.
///
/// Slow subscribers lag and lose the oldest events; publishing never blocks
/// event application.
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<XmsgEvent>,
    events_published: AtomicU64,
}

impl BroadcastEventPublisher {
    /// Create a publisher with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a publisher with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            events_published: AtomicU64::new(0),
        }
    }

    /// Receiver for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<XmsgEvent> {
        self.sender.subscribe()
    }

    /// Stream of events published from now on.
    ///
    /// Lag is reported in-stream as an error item.
    #[must_use]
    pub fn event_stream(&self) -> BroadcastStream<XmsgEvent> {
        BroadcastStream::new(self.subscribe())
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl XmsgEventPublisher for BroadcastEventPublisher {
    async fn publish(&self, event: XmsgEvent) -> usize {
        let kind = event.kind();
        let index = event.index();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(kind, xmsg = %index.short(), receivers, "[xc-02] Event published");
                receivers
            }
            Err(_) => {
                warn!(kind, xmsg = %index.short(), "[xc-02] Event published with no subscribers");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
