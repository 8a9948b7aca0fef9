// tests/e2e_smoke.rs
//
// Whole flow in-process: saved feed → producer → bus → pipeline → store + live hub.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use tokenlaunch_radar::bus::MemoryBus;
use tokenlaunch_radar::classify::Classifier;
use tokenlaunch_radar::ingest::accounts::MemoryAccounts;
use tokenlaunch_radar::ingest::providers::nitter::NitterConnector;
use tokenlaunch_radar::notify::Notifier;
use tokenlaunch_radar::store::{MemoryRepository, MessageRepository};
use tokenlaunch_radar::{
    AppConfig, BroadcastHub, Classification, ClassificationResult, Message, Services,
};

const FEED: &str = include_str!("fixtures/nitter_rss.xml");

/// Deterministic stand-in for the LLM.
struct KeywordClassifier;

#[async_trait::async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, msg: &Message) -> Result<ClassificationResult> {
        let text = msg.content.to_lowercase();
        let (classification, token) = if text.contains("launching") {
            (Classification::Launch, "FOO")
        } else if text.contains("bullish") {
            (Classification::Endorsement, "BAR")
        } else {
            return Ok(ClassificationResult::none());
        };
        Ok(ClassificationResult {
            classification,
            token: token.into(),
            confidence: 0.8,
            reason: "keyword".into(),
        })
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

#[derive(Default)]
struct CountingNotifier(AtomicUsize);

#[async_trait::async_trait]
impl Notifier for CountingNotifier {
    async fn notify(&self, _msg: &Message, _verdict: &ClassificationResult) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

#[tokio::test]
async fn saved_feed_flows_through_to_store_and_viewers() {
    let cfg = AppConfig::from_lookup(|k| match k {
        "ACCOUNTS" => Some("degen".into()),
        "CONSUMER_BACKOFF_MS" => Some("1".into()),
        _ => None,
    })
    .expect("config");

    let repo = Arc::new(MemoryRepository::new());
    let notifier = Arc::new(CountingNotifier::default());
    let bus = MemoryBus::new("messages");
    let services = Services {
        connector: Arc::new(NitterConnector::from_fixture(FEED)),
        accounts: Arc::new(MemoryAccounts::new(&cfg.accounts)),
        bus: bus.clone(),
        repo: repo.clone(),
        classifier: Arc::new(KeywordClassifier),
        notifier: notifier.clone(),
        hub: Arc::new(BroadcastHub::new(cfg.hub_capacity)),
    };
    let mut viewer = services.hub.subscribe();

    let cancel = CancellationToken::new();
    let workers = services.spawn_workers(&cfg, cancel.clone());

    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.pending(&cfg.consumer_group) > 0 || bus.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("all records committed");

    let stats = repo.stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.launches, 1);
    assert_eq!(stats.endorsements, 1);
    assert_eq!(notifier.0.load(Ordering::SeqCst), 2);

    let mut events = Vec::new();
    while let Ok(e) = viewer.rx.try_recv() {
        events.push(e);
    }
    // Three feed items plus one toast per alert, in processing order.
    assert_eq!(events.len(), 5, "{events:#?}");
    assert!(events[0].contains("tag launch"));
    assert!(events[1].contains("launch detected: FOO"));
    assert!(events[2].contains("tag endorsement"));
    assert!(events[3].contains("endorsement detected: BAR"));
    assert!(!events[4].contains("class=\"tag"));

    let newest = repo.find_all(1, 0).await.unwrap();
    assert!(newest[0].content.starts_with("Stealth launching $FOO"));
    assert!(newest[0].content.contains("LP locked, CA below & fair launch"));

    cancel.cancel();
    workers.producer.await.expect("producer task");
    let consumed = workers.pipeline.await.expect("pipeline task").expect("consume");
    assert_eq!(consumed.committed, 3);
    assert_eq!(consumed.failed, 0);
}
