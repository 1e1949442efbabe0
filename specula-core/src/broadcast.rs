//! Broadcast hub
//!
//! Maintains the set of connected subscribers and fans every push
//! message out to all of them. Sends are non-blocking: a subscriber
//! whose channel is closed or full is removed on the spot — ingestion
//! never waits for a slow viewer.
//!
//! Ingestion components never see the hub directly; they publish through
//! the [`EventSink`] port, which the composition root wires up.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::types::{Event, StreamMessage};

/// Abstract publish capability handed to the ingestion pipelines.
pub trait EventSink: Send + Sync {
    /// Deliver one message to whoever is listening. Must not block.
    fn publish(&self, message: StreamMessage);
}

/// Subscriber id
pub type SubscriberId = u64;

/// Fanout of normalized events and task updates to all subscribers.
pub struct BroadcastHub {
    senders: RwLock<HashMap<SubscriberId, mpsc::Sender<StreamMessage>>>,
    next_id: RwLock<SubscriberId>,
    channel_capacity: usize,
}

impl BroadcastHub {
    /// Create a hub whose per-subscriber channels hold `channel_capacity`
    /// undelivered messages before the subscriber is considered dead.
    pub fn new(channel_capacity: usize) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            senders: RwLock::new(HashMap::new()),
            next_id: RwLock::new(1),
            channel_capacity: channel_capacity.max(1),
        })
    }

    /// Register a new subscriber.
    ///
    /// The snapshot is enqueued as the `initial` message before the
    /// sender becomes visible to `publish`, so a subscriber can never
    /// observe a live push ahead of its snapshot.
    pub fn subscribe(
        &self,
        snapshot: Vec<Event>,
    ) -> (SubscriberId, mpsc::Receiver<StreamMessage>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        // Fresh channel with capacity >= 1: this cannot fail.
        let _ = tx.try_send(StreamMessage::Initial(snapshot));

        let id = {
            let mut next = self.next_id.write();
            let id = *next;
            *next += 1;
            id
        };
        self.senders.write().insert(id, tx);

        tracing::debug!(subscriber = id, "Subscriber registered");
        (id, rx)
    }

    /// Remove a subscriber explicitly (e.g. on disconnect).
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.senders.write().remove(&id).is_some() {
            tracing::debug!(subscriber = id, "Subscriber unregistered");
        }
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.senders.read().len()
    }

    fn fan_out(&self, message: StreamMessage) {
        let targets: Vec<(SubscriberId, mpsc::Sender<StreamMessage>)> = {
            let senders = self.senders.read();
            senders.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        if targets.is_empty() {
            return;
        }

        let mut dead = Vec::new();
        for (id, sender) in targets {
            if sender.try_send(message.clone()).is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut senders = self.senders.write();
            for id in dead {
                senders.remove(&id);
                tracing::debug!(subscriber = id, "Dropped dead subscriber");
            }
        }
    }
}

impl EventSink for BroadcastHub {
    fn publish(&self, message: StreamMessage) {
        self.fan_out(message);
    }
}
