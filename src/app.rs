//! Wiring: concrete collaborators from config, long-running workers, HTTP state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::AppState;
use crate::bus::{ConsumeStats, MemoryBus};
use crate::classify::{Classifier, DisabledClassifier, OpenRouterClassifier};
use crate::config::AppConfig;
use crate::hub::BroadcastHub;
use crate::ingest::accounts::{MemoryAccounts, StaticAccounts};
use crate::ingest::providers::nitter::NitterConnector;
use crate::ingest::types::{AccountRegistry, SourceConnector};
use crate::ingest::{Producer, SeenSet};
use crate::notify::{DiscordNotifier, EmailSender, Notifier, NotifierMux, TelegramNotifier};
use crate::pipeline::Pipeline;
use crate::store::{MemoryRepository, MessageRepository};

pub const TOPIC: &str = "messages";

/// Every collaborator the workers and the HTTP layer share.
#[derive(Clone)]
pub struct Services {
    pub connector: Arc<dyn SourceConnector>,
    pub accounts: Arc<dyn AccountRegistry>,
    pub bus: Arc<MemoryBus>,
    pub repo: Arc<dyn MessageRepository>,
    pub classifier: Arc<dyn Classifier>,
    pub notifier: Arc<dyn Notifier>,
    pub hub: Arc<BroadcastHub>,
}

pub struct Workers {
    pub producer: JoinHandle<()>,
    pub pipeline: JoinHandle<Result<ConsumeStats>>,
}

impl Services {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let connector =
            NitterConnector::new(cfg.nitter_instance.clone(), cfg.producer.fetch_timeout)?;
        Ok(Self {
            connector: Arc::new(connector),
            accounts: build_accounts(cfg),
            bus: MemoryBus::new(TOPIC),
            repo: Arc::new(MemoryRepository::new()),
            classifier: build_classifier(cfg)?,
            notifier: Arc::new(build_notifier(cfg)),
            hub: Arc::new(BroadcastHub::new(cfg.hub_capacity)),
        })
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            repo: Arc::clone(&self.repo),
            accounts: Arc::clone(&self.accounts),
            hub: Arc::clone(&self.hub),
        }
    }

    /// Spawn one producer loop and one pipeline consume loop.
    pub fn spawn_workers(&self, cfg: &AppConfig, cancel: CancellationToken) -> Workers {
        let seen = match cfg.dedup_capacity {
            Some(cap) => SeenSet::with_capacity_limit(cap),
            None => SeenSet::unbounded(),
        };
        let producer = Producer::new(
            Arc::clone(&self.connector),
            self.bus.clone(),
            Arc::clone(&self.accounts),
            cfg.producer,
        )
        .with_seen_set(seen);

        let pipeline = Pipeline::new(
            Arc::clone(&self.repo),
            Arc::clone(&self.classifier),
            Arc::clone(&self.notifier),
            Arc::clone(&self.hub),
            cfg.pipeline,
        );
        let consumer = self.bus.consumer(cfg.consumer_group.clone(), cfg.consume_policy);

        let producer_cancel = cancel.clone();
        Workers {
            producer: tokio::spawn(producer.run(producer_cancel)),
            pipeline: tokio::spawn(async move { pipeline.run(&consumer, cancel).await }),
        }
    }
}

fn build_accounts(cfg: &AppConfig) -> Arc<dyn AccountRegistry> {
    if cfg.accounts_readonly {
        Arc::new(StaticAccounts::new(&cfg.accounts))
    } else {
        Arc::new(MemoryAccounts::new(&cfg.accounts))
    }
}

fn build_classifier(cfg: &AppConfig) -> Result<Arc<dyn Classifier>> {
    match &cfg.openrouter_api_key {
        Some(key) => Ok(Arc::new(OpenRouterClassifier::new(
            key.clone(),
            Some(&cfg.openrouter_model),
            cfg.pipeline.classify_timeout,
        )?)),
        None => {
            tracing::warn!("OPENROUTER_API_KEY not set; every message classifies as none");
            Ok(Arc::new(DisabledClassifier))
        }
    }
}

/// Destinations run concurrently, each bounded below the pipeline's notify timeout so the
/// mux can still report which ones failed.
fn build_notifier(cfg: &AppConfig) -> NotifierMux {
    let sink_budget = sink_budget(cfg.pipeline.notify_timeout);
    let mut mux = NotifierMux::new().with_sink_timeout(sink_budget);

    if let Some(token) = &cfg.telegram_token {
        if cfg.telegram_chat_ids.is_empty() {
            tracing::warn!("TELEGRAM_BOT_TOKEN set without TELEGRAM_CHAT_IDS; telegram disabled");
        } else {
            mux.push(Arc::new(
                TelegramNotifier::new(token.clone(), cfg.telegram_chat_ids.clone())
                    .with_timeout(sink_budget),
            ));
        }
    }
    if let Some(url) = &cfg.discord_webhook {
        mux.push(Arc::new(
            DiscordNotifier::new(url.clone()).with_budget(sink_budget),
        ));
    }
    if let Some(smtp) = &cfg.smtp {
        match EmailSender::from_cfg(smtp, sink_budget) {
            Ok(sender) => mux.push(Arc::new(sender)),
            Err(e) => tracing::warn!(error = ?e, "email notifier disabled"),
        }
    }

    tracing::info!(
        destinations = mux.len(),
        sink_timeout_ms = sink_budget.as_millis() as u64,
        "notifier configured"
    );
    mux
}

fn sink_budget(notify_timeout: Duration) -> Duration {
    notify_timeout * 9 / 10
}
