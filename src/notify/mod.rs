pub mod discord;
pub mod email;
pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::future::join_all;

use crate::domain::{Classification, ClassificationResult, Message};

pub use discord::DiscordNotifier;
pub use email::EmailSender;
pub use telegram::TelegramNotifier;

/// Alert delivery for a detected launch/endorsement.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, msg: &Message, verdict: &ClassificationResult) -> Result<()>;
    fn name(&self) -> &'static str;
}

pub fn alert_icon(c: Classification) -> &'static str {
    match c {
        Classification::Launch => "🚀",
        _ => "📢",
    }
}

/// Plain-text alert body shared by the non-HTML destinations.
pub fn alert_text(msg: &Message, verdict: &ClassificationResult) -> String {
    format!(
        "{} {} detected\n\nAuthor: @{}\nToken: {}\nConfidence: {:.0}%\n\nTweet:\n{}\n\nReason: {}",
        alert_icon(verdict.classification),
        verdict.classification.as_str(),
        msg.username,
        verdict.token,
        verdict.confidence * 100.0,
        msg.content,
        verdict.reason
    )
}

/// Fans one alert out to every configured destination.
///
/// All destinations are attempted concurrently, each under its own deadline when one is
/// set; any failure is surfaced as one error.
#[derive(Default, Clone)]
pub struct NotifierMux {
    sinks: Vec<Arc<dyn Notifier>>,
    sink_timeout: Option<Duration>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Deadline applied to each destination separately.
    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = Some(timeout);
        self
    }

    pub fn sink_timeout(&self) -> Option<Duration> {
        self.sink_timeout
    }

    pub fn push(&mut self, sink: Arc<dyn Notifier>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }
}

#[async_trait::async_trait]
impl Notifier for NotifierMux {
    async fn notify(&self, msg: &Message, verdict: &ClassificationResult) -> Result<()> {
        if self.sinks.is_empty() {
            tracing::debug!(id = %msg.id, "no alert destinations configured");
            return Ok(());
        }

        let attempts = self.sinks.iter().map(|sink| async move {
            let res = match self.sink_timeout {
                Some(limit) => tokio::time::timeout(limit, sink.notify(msg, verdict))
                    .await
                    .unwrap_or_else(|_| Err(anyhow!("timed out after {}ms", limit.as_millis()))),
                None => sink.notify(msg, verdict).await,
            };
            (sink.name(), res)
        });

        let mut failed = Vec::new();
        for (name, res) in join_all(attempts).await {
            match res {
                Ok(()) => tracing::info!(id = %msg.id, sink = name, "alert sent"),
                Err(e) => {
                    tracing::warn!(id = %msg.id, sink = name, error = ?e, "alert failed");
                    failed.push(format!("{name}: {e:#}"));
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("alert delivery failed: {}", failed.join("; ")))
        }
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}
