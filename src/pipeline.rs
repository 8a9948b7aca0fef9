//! Per-message processing: persist → classify → persist verdict → broadcast → alert.
//!
//! Only a failed raw-message upsert fails the message (and therefore blocks the bus
//! acknowledgement). Every later step is enrichment and degrades to a log line.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::bus::{ConsumeStats, Consumer, MessageHandler};
use crate::classify::Classifier;
use crate::domain::{ClassificationResult, Message};
use crate::hub::BroadcastHub;
use crate::ingest::truncate;
use crate::notify::Notifier;
use crate::store::MessageRepository;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_processed_total", "Messages fully processed.");
        describe_counter!(
            "pipeline_persist_errors_total",
            "Raw message upserts that failed (message redelivered)."
        );
        describe_counter!(
            "pipeline_classify_errors_total",
            "Classifier failures/timeouts mapped to `none`."
        );
        describe_counter!("pipeline_alerts_total", "Launch/endorsement alerts raised.");
        describe_counter!("pipeline_notify_errors_total", "Notifier failures.");
        describe_counter!("hub_dropped_total", "Payloads dropped for slow subscribers.");
    });
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("persist message {id}: {source:#}")]
    Persist {
        id: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineCfg {
    pub classify_timeout: Duration,
    pub notify_timeout: Duration,
}

impl Default for PipelineCfg {
    fn default() -> Self {
        Self {
            classify_timeout: Duration::from_secs(60),
            notify_timeout: Duration::from_secs(10),
        }
    }
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub verdict: ClassificationResult,
    /// `true` when the backend failed and the default verdict was substituted.
    pub classify_failed: bool,
    /// Hub payloads emitted (1 feed item, plus 1 toast for alerts).
    pub events_broadcast: usize,
    /// `None` when no alert was due.
    pub notified: Option<bool>,
}

pub struct Pipeline {
    repo: Arc<dyn MessageRepository>,
    classifier: Arc<dyn Classifier>,
    notifier: Arc<dyn Notifier>,
    hub: Arc<BroadcastHub>,
    cfg: PipelineCfg,
}

impl Pipeline {
    pub fn new(
        repo: Arc<dyn MessageRepository>,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn Notifier>,
        hub: Arc<BroadcastHub>,
        cfg: PipelineCfg,
    ) -> Self {
        Self {
            repo,
            classifier,
            notifier,
            hub,
            cfg,
        }
    }

    /// Drive `consumer` with this pipeline as handler until `cancel` fires.
    pub async fn run(
        &self,
        consumer: &dyn Consumer,
        cancel: CancellationToken,
    ) -> anyhow::Result<ConsumeStats> {
        ensure_metrics_described();
        tracing::info!(classifier = self.classifier.name(), "pipeline started");
        let stats = consumer.consume(self, cancel).await?;
        tracing::info!(
            delivered = stats.delivered,
            committed = stats.committed,
            failed = stats.failed,
            dead_lettered = stats.dead_lettered,
            "pipeline stopped"
        );
        Ok(stats)
    }

    pub async fn process(&self, msg: &Message) -> Result<Outcome, PipelineError> {
        ensure_metrics_described();
        tracing::info!(
            id = %msg.id,
            username = %msg.username,
            content = %truncate(&msg.content, 60),
            "received"
        );

        // 1) Persist raw message. The only fatal step.
        if let Err(e) = self.repo.upsert_message(msg).await {
            counter!("pipeline_persist_errors_total").increment(1);
            tracing::warn!(id = %msg.id, error = ?e, "persist failed");
            return Err(PipelineError::Persist {
                id: msg.id.clone(),
                source: e,
            });
        }

        // 2) Classify (best effort).
        let (verdict, classify_failed) = match tokio::time::timeout(
            self.cfg.classify_timeout,
            self.classifier.classify(msg),
        )
        .await
        {
            Ok(Ok(v)) => {
                tracing::info!(
                    id = %msg.id,
                    classification = v.classification.as_str(),
                    token = %v.token,
                    confidence = v.confidence,
                    reason = %truncate(&v.reason, 50),
                    "classified"
                );
                (v, false)
            }
            Ok(Err(e)) => {
                counter!("pipeline_classify_errors_total").increment(1);
                tracing::warn!(id = %msg.id, error = ?e, "classify failed; defaulting to none");
                (ClassificationResult::none(), true)
            }
            Err(_) => {
                counter!("pipeline_classify_errors_total").increment(1);
                tracing::warn!(
                    id = %msg.id,
                    timeout_secs = self.cfg.classify_timeout.as_secs(),
                    "classify timed out; defaulting to none"
                );
                (ClassificationResult::none(), true)
            }
        };
        let signal = verdict.classification.is_signal();

        // 3) Persist verdict, only for launch/endorsement.
        if signal {
            if let Err(e) = self
                .repo
                .upsert_classification(
                    &msg.id,
                    verdict.classification,
                    &verdict.token,
                    verdict.confidence,
                )
                .await
            {
                tracing::warn!(id = %msg.id, error = ?e, "persist classification failed");
            }
        }

        // 4) Feed update, always.
        let mut events_broadcast = 1;
        let reached = self.hub.broadcast(&render_feed_item(msg, &verdict, Utc::now()));
        tracing::debug!(id = %msg.id, subscribers = reached, "feed item broadcast");

        // 5) Toast + notifier, only for launch/endorsement.
        let mut notified = None;
        if signal {
            counter!("pipeline_alerts_total").increment(1);
            tracing::info!(
                id = %msg.id,
                classification = verdict.classification.as_str(),
                token = %verdict.token,
                "alert"
            );
            self.hub.broadcast(&render_toast(&verdict));
            events_broadcast += 1;

            let sent = match tokio::time::timeout(
                self.cfg.notify_timeout,
                self.notifier.notify(msg, &verdict),
            )
            .await
            {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::warn!(
                        id = %msg.id,
                        notifier = self.notifier.name(),
                        error = ?e,
                        "notify failed"
                    );
                    false
                }
                Err(_) => {
                    tracing::warn!(
                        id = %msg.id,
                        notifier = self.notifier.name(),
                        "notify timed out"
                    );
                    false
                }
            };
            if !sent {
                counter!("pipeline_notify_errors_total").increment(1);
            }
            notified = Some(sent);
        }

        counter!("pipeline_processed_total").increment(1);
        tracing::info!(id = %msg.id, "processed");
        Ok(Outcome {
            verdict,
            classify_failed,
            events_broadcast,
            notified,
        })
    }
}

#[async_trait::async_trait]
impl MessageHandler for Pipeline {
    async fn handle(&self, msg: &Message) -> anyhow::Result<()> {
        self.process(msg).await?;
        Ok(())
    }
}

/// Compact relative age: `just now`, `5m ago`, `3h ago`, `2d ago`.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(then).num_seconds();
    match secs {
        s if s < 60 => "just now".to_string(),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}

/// Empty for `none`, otherwise the classification label.
pub fn classification_tag(verdict: &ClassificationResult) -> &'static str {
    if verdict.classification.is_signal() {
        verdict.classification.as_str()
    } else {
        ""
    }
}

/// Feed item markup for the live dashboard.
pub fn render_feed_item(
    msg: &Message,
    verdict: &ClassificationResult,
    now: DateTime<Utc>,
) -> String {
    let tag = classification_tag(verdict);
    let tag_html = if tag.is_empty() {
        String::new()
    } else {
        format!("\n    <div class=\"tag {tag}\">{tag}</div>")
    };
    format!(
        "<div class=\"item {tag}\">\n    <div class=\"item-head\">\n        <div class=\"item-author\">@{}</div>\n        <div class=\"item-time\">{}</div>\n    </div>\n    <div class=\"item-body\">{}</div>{tag_html}\n</div>",
        html_escape::encode_text(&msg.username),
        time_ago(msg.created_at, now),
        html_escape::encode_text(&msg.content),
    )
}

/// Out-of-band toast for launch/endorsement alerts.
pub fn render_toast(verdict: &ClassificationResult) -> String {
    format!(
        "<div id=\"toast\" class=\"toast show\" hx-swap-oob=\"true\">{} detected: {}</div>",
        verdict.classification.as_str(),
        html_escape::encode_text(&verdict.token)
    )
}
