use super::support::{cached, live, Harness, Script, Step, Timing};
use inventory_rpc_fallback::{FallbackStore, MemoryStore};
use inventory_rpc_retry::{AttemptOutcome, UpstreamError};
use inventory_rpc_router::RouterOutcome;
use serde_json::json;
use std::time::{Duration, Instant};

#[tokio::test]
async fn upstream_answers_immediately() {
    let mut harness = Harness::new(Timing::default(), MemoryStore::new());
    harness.start_worker(Script::new([Step::Answer(json!({"items": 5}))]));

    let reply = harness.request().await;

    assert_eq!(reply, live(json!({"items": 5})));
    assert_eq!(harness.attempts(), vec![(0, AttemptOutcome::Ok)]);
    assert_eq!(harness.router_outcomes(), vec![RouterOutcome::Ok]);
    assert_eq!(harness.broker.stats().retries_published, 0);
    assert_eq!(harness.stop_worker().await, 1);
}

#[tokio::test]
async fn two_timeouts_then_live_answer() {
    let mut harness = Harness::new(Timing::default(), MemoryStore::new());
    harness.start_worker(Script::new([
        Step::Hang,
        Step::Hang,
        Step::Answer(json!({"items": 7})),
    ]));

    let reply = harness.request().await;

    assert_eq!(reply, json!({"items": 7, "fromCache": false}));
    assert_eq!(
        harness.attempts(),
        vec![
            (0, AttemptOutcome::UpstreamTimeout),
            (1, AttemptOutcome::UpstreamTimeout),
            (2, AttemptOutcome::Ok),
        ]
    );
    assert_eq!(harness.broker.stats().retries_published, 2);
    assert_eq!(harness.store.load().await, json!({"items": 7}));
    harness.stop_worker().await;
}

#[tokio::test]
async fn three_failures_serve_cached_record() {
    let mut harness = Harness::new(
        Timing::default(),
        MemoryStore::with_record(json!({"items": 3})),
    );
    harness.start_worker(Script::new([
        Step::Fail(UpstreamError::Status(500)),
        Step::Fail(UpstreamError::Transport("connection reset".to_string())),
        Step::Fail(UpstreamError::Status(502)),
    ]));

    let reply = harness.request().await;

    assert_eq!(reply, cached(json!({"items": 3})));
    assert_eq!(harness.fallbacks(), vec![2]);
    // The worker's fallback reply is still a correlated reply for the router.
    assert_eq!(harness.router_outcomes(), vec![RouterOutcome::Ok]);
    assert_eq!(harness.store.load().await, json!({"items": 3}));
    harness.stop_worker().await;
}

#[tokio::test]
async fn no_reply_and_no_cache_serves_sentinel() {
    let deadline = Duration::from_millis(150);
    let harness = Harness::new(
        Timing {
            deadline,
            ..Timing::default()
        },
        MemoryStore::new(),
    );

    let started = Instant::now();
    let reply = harness.request().await;
    let elapsed = started.elapsed();

    assert_eq!(reply, json!({"error": "timeout", "fromCache": true}));
    assert!(elapsed >= deadline, "answered early: {elapsed:?}");
    assert!(elapsed <= deadline + Duration::from_millis(100), "answered late: {elapsed:?}");
    assert_eq!(harness.router_outcomes(), vec![RouterOutcome::TimeoutFallback]);
    assert_eq!(harness.broker.reply_queue_count(), 0);
}

#[tokio::test]
async fn broker_outage_serves_cached_record() {
    let harness = Harness::new(
        Timing::default(),
        MemoryStore::with_record(json!({"items": 4})),
    );
    harness.broker.set_unavailable(true);

    let reply = harness.request().await;

    assert_eq!(reply, cached(json!({"items": 4})));
    assert_eq!(harness.router_outcomes(), vec![RouterOutcome::ErrorFallback]);
}
