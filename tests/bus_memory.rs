// tests/bus_memory.rs
//
// At-least-once delivery over the in-process bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use tokenlaunch_radar::bus::{ConsumePolicy, Consumer, MemoryBus, MessageHandler, Publisher};
use tokenlaunch_radar::{Message, Source};

fn msg(n: u32) -> Message {
    Message::new(
        format!("https://nitter.example/alice/status/{n}"),
        "Alice",
        "alice",
        format!("post {n}"),
        Source::Twitter,
        Utc::now(),
    )
}

fn quick_policy(max_attempts: u32) -> ConsumePolicy {
    ConsumePolicy {
        max_attempts,
        backoff: Duration::from_millis(1),
    }
}

/// Records every delivery; fails the first `fail_first[id]` attempts for an id.
#[derive(Default)]
struct Flaky {
    seen: Mutex<Vec<String>>,
    fail_first: Mutex<HashMap<String, u32>>,
}

#[async_trait::async_trait]
impl MessageHandler for Flaky {
    async fn handle(&self, m: &Message) -> Result<()> {
        self.seen.lock().push(m.id.clone());
        let mut fails = self.fail_first.lock();
        if let Some(left) = fails.get_mut(&m.id) {
            if *left > 0 {
                *left -= 1;
                return Err(anyhow!("downstream unavailable"));
            }
        }
        Ok(())
    }
}

/// Consume until `n` deliveries were observed, then cancel and return.
async fn drain(
    consumer: &dyn Consumer,
    handler: &Flaky,
    n: usize,
) -> tokenlaunch_radar::bus::ConsumeStats {
    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    let watch = async {
        while handler.seen.lock().len() < n {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        stopper.cancel();
    };
    let (stats, ()) = tokio::join!(consumer.consume(handler, cancel), watch);
    stats.expect("consume")
}

#[tokio::test]
async fn records_are_delivered_in_publish_order_and_committed() {
    let bus = MemoryBus::new("messages");
    let (a, b) = (msg(1), msg(2));
    bus.publish(&a).await.unwrap();
    bus.publish(&b).await.unwrap();

    let handler = Flaky::default();
    let stats = drain(&bus.consumer("pipeline", quick_policy(1)), &handler, 2).await;

    assert_eq!(handler.seen.lock().clone(), vec![a.id.clone(), b.id.clone()]);
    assert_eq!(stats.committed, 2);
    assert_eq!(bus.committed("pipeline"), vec![0, 1]);
    assert_eq!(bus.pending("pipeline"), 0);
    assert_eq!(bus.records()[0].key, a.id, "record keyed by message id");
}

#[tokio::test]
async fn transient_failure_is_retried_within_the_run() {
    let bus = MemoryBus::new("messages");
    let m = msg(1);
    bus.publish(&m).await.unwrap();

    let handler = Flaky::default();
    handler.fail_first.lock().insert(m.id.clone(), 2);
    let stats = drain(&bus.consumer("pipeline", quick_policy(3)), &handler, 3).await;

    assert_eq!(handler.seen.lock().len(), 3);
    assert_eq!(stats.committed, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(bus.committed("pipeline"), vec![0]);
}

#[tokio::test]
async fn exhausted_record_is_not_committed_and_is_redelivered_next_run() {
    let bus = MemoryBus::new("messages");
    let (bad, good) = (msg(1), msg(2));
    bus.publish(&bad).await.unwrap();
    bus.publish(&good).await.unwrap();

    let handler = Flaky::default();
    handler.fail_first.lock().insert(bad.id.clone(), 2);
    let consumer = bus.consumer("pipeline", quick_policy(2));

    let first = drain(&consumer, &handler, 3).await;
    assert_eq!(first.failed, 1);
    assert_eq!(first.committed, 1);
    assert_eq!(bus.committed("pipeline"), vec![1], "later record still commits");

    // Simulated restart: the uncommitted record comes back, the committed one does not.
    handler.seen.lock().clear();
    let second = drain(&consumer, &handler, 1).await;
    assert_eq!(handler.seen.lock().clone(), vec![bad.id.clone()]);
    assert_eq!(second.committed, 1);
    assert_eq!(bus.committed("pipeline"), vec![0, 1]);
}

#[tokio::test]
async fn undecodable_payload_is_dead_lettered_and_skipped() {
    let bus = MemoryBus::new("messages");
    bus.append_raw("garbage", b"{not json".to_vec());
    let m = msg(9);
    bus.publish(&m).await.unwrap();

    let handler = Flaky::default();
    let stats = drain(&bus.consumer("pipeline", quick_policy(1)), &handler, 1).await;

    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(handler.seen.lock().clone(), vec![m.id.clone()]);
    assert_eq!(bus.dead_letters().len(), 1);
    assert_eq!(bus.dead_letters()[0].key, "garbage");
    assert_eq!(bus.pending("pipeline"), 0);
}

#[tokio::test]
async fn groups_track_acknowledgements_independently() {
    let bus = MemoryBus::new("messages");
    bus.publish(&msg(1)).await.unwrap();

    let handler = Flaky::default();
    drain(&bus.consumer("pipeline", quick_policy(1)), &handler, 1).await;

    assert_eq!(bus.pending("pipeline"), 0);
    assert_eq!(bus.pending("archive"), 1);
}

#[tokio::test]
async fn consumer_waits_for_records_published_later() {
    let bus = MemoryBus::new("messages");
    let handler = Arc::new(Flaky::default());
    let consumer = bus.consumer("pipeline", quick_policy(1));
    let cancel = CancellationToken::new();

    let run = {
        let handler = Arc::clone(&handler);
        let cancel = cancel.clone();
        tokio::spawn(async move { consumer.consume(handler.as_ref(), cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(handler.seen.lock().is_empty());

    let m = msg(5);
    bus.publish(&m).await.unwrap();
    while handler.seen.lock().is_empty() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cancel.cancel();

    let stats = run.await.unwrap().unwrap();
    assert_eq!(stats.committed, 1);
    assert_eq!(handler.seen.lock().clone(), vec![m.id]);
}

/// Counts deliveries per id and yields so concurrent consumers interleave.
#[derive(Default)]
struct Tally {
    calls: Mutex<HashMap<String, u32>>,
}

#[async_trait::async_trait]
impl MessageHandler for Tally {
    async fn handle(&self, m: &Message) -> Result<()> {
        *self.calls.lock().entry(m.id.clone()).or_default() += 1;
        tokio::task::yield_now().await;
        Ok(())
    }
}

#[tokio::test]
async fn consumers_of_one_group_split_the_records() {
    let bus = MemoryBus::new("messages");
    let mut ids = Vec::new();
    for n in 0..10 {
        let m = msg(n);
        bus.publish(&m).await.unwrap();
        ids.push(m.id);
    }

    let first = bus.consumer("pipeline", quick_policy(1));
    let second = bus.consumer("pipeline", quick_policy(1));
    let handler = Tally::default();
    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    let watch = async {
        while bus.pending("pipeline") > 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        stopper.cancel();
    };

    let (a, b, ()) = tokio::join!(
        first.consume(&handler, cancel.clone()),
        second.consume(&handler, cancel.clone()),
        watch
    );
    let (a, b) = (a.expect("first"), b.expect("second"));

    assert_eq!(a.committed + b.committed, 10);
    let calls = handler.calls.lock();
    assert_eq!(calls.len(), 10);
    for id in &ids {
        assert_eq!(calls.get(id), Some(&1), "{id} handled more than once");
    }
    assert_eq!(bus.in_flight("pipeline"), 0);
}
