use super::support::{cached, live, Harness, Script, Step, Timing};
use inventory_rpc_fallback::{FallbackStore, MemoryStore};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn fallback_serves_latest_success() {
    let mut harness = Harness::new(
        Timing {
            max_retries: 0,
            ..Timing::default()
        },
        MemoryStore::with_record(json!({"items": 0})),
    );
    let script = Script::new([Step::Answer(json!({"items": 1}))]);
    harness.start_worker(script.clone());

    assert_eq!(harness.request().await, live(json!({"items": 1})));
    script.push(Step::Answer(json!({"items": 2})));
    assert_eq!(harness.request().await, live(json!({"items": 2})));

    // Script exhausted: the upstream fails from here on.
    assert_eq!(harness.request().await, cached(json!({"items": 2})));
    assert_eq!(harness.store.load().await, json!({"items": 2}));
    harness.stop_worker().await;
}

#[tokio::test]
async fn router_timeout_serves_what_the_worker_saved() {
    let mut harness = Harness::new(
        Timing {
            deadline: Duration::from_millis(200),
            ..Timing::default()
        },
        MemoryStore::new(),
    );
    harness.start_worker(Script::new([Step::Answer(json!([1, 2, 3]))]));
    assert_eq!(harness.request().await, json!({"response": [1, 2, 3], "fromCache": false}));
    harness.stop_worker().await;

    // Nobody consumes now; the caller deadline elapses.
    assert_eq!(harness.request().await, json!({"response": [1, 2, 3], "fromCache": true}));
}
