// src/ingest/producer.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::dedup::SeenSet;
use super::types::{AccountRegistry, SourceConnector};
use super::{ensure_metrics_described, truncate};
use crate::bus::Publisher;

#[derive(Clone, Copy, Debug)]
pub struct ProducerCfg {
    pub interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for ProducerCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(15),
        }
    }
}

/// Counters for one poll pass over all accounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub accounts: usize,
    pub failed_accounts: usize,
    pub fetched: usize,
    pub published: usize,
    pub duplicates: usize,
    pub publish_errors: usize,
}

/// Polls every tracked account on a fixed interval and publishes unseen messages.
///
/// Owns its dedup set; run exactly one loop per instance.
pub struct Producer {
    connector: Arc<dyn SourceConnector>,
    publisher: Arc<dyn Publisher>,
    accounts: Arc<dyn AccountRegistry>,
    cfg: ProducerCfg,
    seen: SeenSet,
}

impl Producer {
    pub fn new(
        connector: Arc<dyn SourceConnector>,
        publisher: Arc<dyn Publisher>,
        accounts: Arc<dyn AccountRegistry>,
        cfg: ProducerCfg,
    ) -> Self {
        Self {
            connector,
            publisher,
            accounts,
            cfg,
            seen: SeenSet::unbounded(),
        }
    }

    pub fn with_seen_set(mut self, seen: SeenSet) -> Self {
        self.seen = seen;
        self
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Immediate first pass, then one pass per tick until `cancel` fires.
    /// A pass in progress always completes.
    pub async fn run(mut self, cancel: CancellationToken) {
        ensure_metrics_described();
        tracing::info!(
            target: "ingest",
            connector = self.connector.name(),
            interval_secs = self.cfg.interval.as_secs(),
            "producer started"
        );

        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        tracing::info!(target: "ingest", seen_total = self.seen.len(), "producer stopped");
    }

    /// One pass over the current account list.
    pub async fn poll_once(&mut self) -> PassStats {
        ensure_metrics_described();
        let mut pass = PassStats::default();

        let accounts = match self.accounts.list().await {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(
                    target: "ingest",
                    error = ?e,
                    "account registry unavailable; pass skipped"
                );
                return pass;
            }
        };
        pass.accounts = accounts.len();

        for account in &accounts {
            let fetched =
                tokio::time::timeout(self.cfg.fetch_timeout, self.connector.fetch(account)).await;
            let messages = match fetched {
                Ok(Ok(m)) => m,
                Ok(Err(e)) => {
                    tracing::warn!(
                        target: "ingest",
                        account = %account,
                        error = ?e,
                        "fetch failed"
                    );
                    counter!("ingest_fetch_errors_total").increment(1);
                    pass.failed_accounts += 1;
                    continue;
                }
                Err(_) => {
                    tracing::warn!(
                        target: "ingest",
                        account = %account,
                        timeout_secs = self.cfg.fetch_timeout.as_secs(),
                        "fetch timed out"
                    );
                    counter!("ingest_fetch_errors_total").increment(1);
                    pass.failed_accounts += 1;
                    continue;
                }
            };

            pass.fetched += messages.len();
            counter!("ingest_fetched_total").increment(messages.len() as u64);

            let mut new_count = 0usize;
            let mut dup_count = 0usize;
            let mut queued = 0usize;
            for msg in &messages {
                if !self.seen.insert(&msg.id) {
                    dup_count += 1;
                    continue;
                }
                new_count += 1;

                if let Err(e) = self.publisher.publish(msg).await {
                    tracing::warn!(
                        target: "ingest",
                        account = %account,
                        id = %msg.id,
                        error = ?e,
                        "publish failed"
                    );
                    counter!("ingest_publish_errors_total").increment(1);
                    pass.publish_errors += 1;
                    continue;
                }
                queued += 1;
                tracing::debug!(
                    target: "ingest",
                    username = %msg.username,
                    id = %msg.id,
                    content = %truncate(&msg.content, 60),
                    "queued"
                );
            }

            pass.published += queued;
            pass.duplicates += dup_count;
            counter!("ingest_published_total").increment(queued as u64);
            counter!("ingest_duplicates_total").increment(dup_count as u64);
            tracing::info!(
                target: "ingest",
                account = %account,
                new = new_count,
                duplicates = dup_count,
                seen_total = self.seen.len(),
                "account polled"
            );
        }

        gauge!("ingest_seen_size").set(self.seen.len() as f64);
        gauge!("ingest_last_pass_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
        pass
    }
}
