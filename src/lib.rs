// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod domain;

// Ingest side: connectors, account registry, dedup, polling loop.
pub mod ingest;
pub mod bus;

// Consume side: classify, persist, fan out, alert.
pub mod classify;
pub mod store;
pub mod notify;
pub mod hub;
pub mod pipeline;

pub mod api;
pub mod app;
pub mod config;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::app::{Services, Workers};
pub use crate::config::AppConfig;
pub use crate::domain::{message_id, Classification, ClassificationResult, Message, Source};
pub use crate::hub::BroadcastHub;
pub use crate::notify::NotifierMux;
pub use crate::pipeline::Pipeline;
