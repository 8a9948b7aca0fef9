//! Message bus contract between the ingestion producer and the processing pipeline.
//!
//! Publishing appends a JSON-encoded `Message` keyed by its id. Consuming is pull-based
//! with at-least-once semantics: a record is acknowledged only after the handler
//! succeeded, so anything not acknowledged is delivered again by the next `consume` run.

pub mod memory;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::Message;

pub use memory::{MemoryBus, MemoryConsumer, Record};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("encode message {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("bus transport: {0}")]
    Transport(String),
}

#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, msg: &Message) -> Result<(), BusError>;
}

/// Per-record callback. `Err` means "do not acknowledge".
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: &Message) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait Consumer: Send + Sync {
    /// Runs until `cancel` fires; the record in flight is finished first.
    async fn consume(
        &self,
        handler: &dyn MessageHandler,
        cancel: CancellationToken,
    ) -> anyhow::Result<ConsumeStats>;
}

/// Retry discipline for handler failures inside one consume run.
#[derive(Clone, Copy, Debug)]
pub struct ConsumePolicy {
    /// Total handler invocations per record (>= 1).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further one.
    pub backoff: Duration,
}

impl Default for ConsumePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeStats {
    pub delivered: u64,
    pub committed: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}

pub fn encode(msg: &Message) -> Result<Vec<u8>, BusError> {
    serde_json::to_vec(msg).map_err(|source| BusError::Encode {
        id: msg.id.clone(),
        source,
    })
}

pub fn decode(payload: &[u8]) -> serde_json::Result<Message> {
    serde_json::from_slice(payload)
}

/// Invoke `handler` up to `policy.max_attempts` times. Returns `true` once it succeeds.
pub async fn deliver_with_retry(
    handler: &dyn MessageHandler,
    msg: &Message,
    policy: &ConsumePolicy,
    cancel: &CancellationToken,
) -> bool {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match handler.handle(msg).await {
            Ok(()) => return true,
            Err(e) => {
                tracing::warn!(id = %msg.id, attempt, error = ?e, "bus handler failed");
                if attempt < attempts {
                    let delay = policy.backoff * (1u32 << (attempt - 1).min(16));
                    tokio::select! {
                        _ = cancel.cancelled() => return false,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
    false
}
