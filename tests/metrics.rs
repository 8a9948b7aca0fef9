// tests/metrics.rs
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use tower::ServiceExt;

use tokenlaunch_radar::hub::BroadcastHub;
use tokenlaunch_radar::metrics::Metrics;
use tokenlaunch_radar::{Message, Source};

// The recorder is process-global, so everything lives in one test.
#[tokio::test]
async fn metrics_endpoint_contains_expected_series() {
    let metrics = Metrics::init(7).expect("first install succeeds");
    assert!(Metrics::init(7).is_err(), "second install is rejected");

    // Overflow a subscriber to bump the drop counter.
    let hub = BroadcastHub::new(1);
    let _sub = hub.subscribe();
    hub.broadcast("a");
    hub.broadcast("b");

    // Undecodable record on the bus.
    let bus = tokenlaunch_radar::bus::MemoryBus::new("messages");
    bus.append_raw("junk", b"nope".to_vec());
    let m = Message::new("x", "A", "a", "hello", Source::Twitter, Utc::now());
    tokenlaunch_radar::bus::Publisher::publish(bus.as_ref(), &m)
        .await
        .unwrap();

    struct Accept;
    #[async_trait::async_trait]
    impl tokenlaunch_radar::bus::MessageHandler for Accept {
        async fn handle(&self, _m: &Message) -> anyhow::Result<()> {
            Ok(())
        }
    }
    let consumer = bus.consumer("g", Default::default());
    let cancel = tokio_util::sync::CancellationToken::new();
    let stopper = cancel.clone();
    let (stats, ()) = tokio::join!(
        tokenlaunch_radar::bus::Consumer::consume(&consumer, &Accept, cancel),
        async {
            while bus.pending("g") > 0 {
                tokio::task::yield_now().await;
            }
            stopper.cancel();
        }
    );
    assert_eq!(stats.unwrap().dead_lettered, 1);

    let req = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = metrics.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(
        body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap()
            .to_vec(),
    )
    .unwrap();

    for series in [
        "hub_subscriber_capacity 7",
        "hub_dropped_total 1",
        "bus_dead_letters_total 1",
    ] {
        assert!(text.contains(series), "missing `{series}` in:\n{text}");
    }
}
