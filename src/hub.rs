//! # Live Broadcast Hub
//! In-process publish/subscribe for the live feed.
//!
//! One bounded channel per connected viewer. `broadcast` never waits: a viewer whose
//! buffer is full simply misses that payload, so a stalled connection can neither block
//! other viewers nor the processing pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};

pub const DEFAULT_CAPACITY: usize = 10;

/// Opaque handle identifying one registered channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Receiving side handed to the connection that owns the subscription.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub rx: mpsc::Receiver<String>,
}

#[derive(Debug)]
pub struct BroadcastHub {
    subscribers: RwLock<HashMap<SubscriberId, mpsc::Sender<String>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BroadcastHub {
    /// `capacity` of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().insert(id, tx);
        tracing::debug!(subscriber = id.0, "hub subscribe");
        Subscription { id, rx }
    }

    /// Deregister and release the channel. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        // Dropping the sender closes the receiver once it is drained.
        if self.subscribers.write().remove(&id).is_some() {
            tracing::debug!(subscriber = id.0, "hub unsubscribe");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Non-blocking fan-out. Returns how many subscribers accepted the payload.
    ///
    /// Subscribers whose receiver was dropped without `unsubscribe` are removed here.
    pub fn broadcast(&self, payload: &str) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in self.subscribers.read().iter() {
            match tx.try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    counter!("hub_dropped_total").increment(1);
                    tracing::trace!(subscriber = id.0, "subscriber buffer full; payload dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in closed {
                if subscribers.remove(&id).is_some() {
                    tracing::debug!(subscriber = id.0, "hub pruned closed subscriber");
                }
            }
        }
        delivered
    }
}
