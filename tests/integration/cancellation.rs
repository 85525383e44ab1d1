use super::support::{live, Harness, Step, Timing};
use inventory_rpc_fallback::MemoryStore;
use serde_json::json;
use std::time::Duration;

async fn abandon(harness: &Harness, after: Duration) {
    let outcome = tokio::time::timeout(after, harness.router.handle_request()).await;
    assert!(outcome.is_err(), "request finished before it was abandoned");
}

#[tokio::test]
async fn abandoned_requests_leave_no_reply_queues() {
    let harness = Harness::new(Timing::default(), MemoryStore::new());

    for _ in 0..5 {
        abandon(&harness, Duration::from_millis(40)).await;
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.broker.reply_queue_count(), 0);
    assert!(harness.router_outcomes().is_empty());
}

#[tokio::test]
async fn late_answers_to_abandoned_requests_are_dropped() {
    let mut harness = Harness::new(Timing::default(), MemoryStore::new());

    for _ in 0..3 {
        abandon(&harness, Duration::from_millis(40)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The worker drains the stale queries first, then answers the live caller.
    harness.start_worker_with(|_query| Step::Answer(json!({"items": 7})));
    assert_eq!(harness.request().await, live(json!({"items": 7})));

    let stats = harness.broker.stats();
    assert_eq!(stats.queries_published, 4);
    assert_eq!(stats.replies_dropped, 3);
    assert_eq!(harness.broker.reply_queue_count(), 0);
    assert_eq!(harness.stop_worker().await, 4);
}
