//! Broadcast-backed fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::event::{topic_matches, Event};

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Per-subscriber mailbox capacity.
    pub buffer_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { buffer_size: 1024 }
    }
}

/// Cheap-to-clone handle; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    published: Arc<AtomicU64>,
    buffer_size: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.buffer_size);
        Self {
            sender,
            published: Arc::new(AtomicU64::new(0)),
            buffer_size: config.buffer_size,
        }
    }

    /// Publish an event. Never blocks and never fails: with no subscribers
    /// the event is simply dropped.
    pub fn publish(&self, event: Event) {
        self.published.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(event) {
            Ok(subscribers) => {
                debug!(subscribers, "event published");
            }
            Err(broadcast::error::SendError(ev)) => {
                debug!(topic = %ev.topic, "event dropped, no subscribers");
            }
        }
    }

    /// Subscribe with topic patterns (`*`, `browser.*`, exact).
    /// An empty pattern list subscribes to everything.
    pub fn subscribe(&self, patterns: Vec<String>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            patterns,
            dropped: 0,
        }
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            buffer_size: self.buffer_size,
            subscribers: self.sender.receiver_count(),
            published: self.published.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BusStats {
    pub buffer_size: usize,
    pub subscribers: usize,
    pub published: u64,
}

/// A filtered view over one subscriber mailbox.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
    patterns: Vec<String>,
    dropped: u64,
}

impl Subscription {
    /// Next matching event, or `None` once the bus is gone.
    ///
    /// Lagging is absorbed here: skipped events are counted and logged, and
    /// the subscriber keeps receiving from wherever the mailbox resumes.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.matches(&event.topic) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    self.dropped += count;
                    warn!(
                        lagged = count,
                        total_dropped = self.dropped,
                        "slow event subscriber dropped events"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Events this subscriber lost to backpressure.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn matches(&self, topic: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| topic_matches(topic, p))
    }
}
