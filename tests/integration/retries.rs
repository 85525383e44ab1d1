use super::support::{live, Harness, Script, Step, Timing};
use inventory_rpc_fallback::MemoryStore;
use inventory_rpc_retry::{AttemptOutcome, UpstreamError};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn live_reply_comes_from_attempt_equal_to_failures() {
    for failures in 0..=2u32 {
        let mut harness = Harness::new(Timing::default(), MemoryStore::new());
        let mut steps: Vec<Step> = (0..failures)
            .map(|_| Step::Fail(UpstreamError::Status(503)))
            .collect();
        steps.push(Step::Answer(json!({"failures": failures})));
        harness.start_worker(Script::new(steps));

        let reply = harness.request().await;
        assert_eq!(reply, live(json!({"failures": failures})));

        let attempts = harness.attempts();
        assert_eq!(attempts.len() as u32, failures + 1);
        for (index, (attempt, outcome)) in attempts.iter().enumerate() {
            assert_eq!(*attempt, index as u32);
            let expected = if *attempt == failures {
                AttemptOutcome::Ok
            } else {
                AttemptOutcome::Error
            };
            assert_eq!(*outcome, expected);
        }
        assert_eq!(harness.broker.stats().retries_published, u64::from(failures));
        harness.stop_worker().await;
    }
}

#[tokio::test]
async fn exhaustion_replies_once_and_stops_recirculating() {
    let mut harness = Harness::new(Timing::default(), MemoryStore::new());
    harness.start_worker(Script::default());

    let reply = harness.request().await;
    assert_eq!(reply, json!({"error": "timeout", "fromCache": true}));

    // Give a stray recirculation time to show up.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let stats = harness.broker.stats();
    assert_eq!(stats.retries_published, 2);
    assert_eq!(stats.dead_lettered, 2);
    assert_eq!(stats.replies_delivered, 1);
    assert_eq!(stats.acks, 3);
    assert_eq!(harness.fallbacks(), vec![2]);
    assert_eq!(
        harness.attempts(),
        vec![
            (0, AttemptOutcome::Error),
            (1, AttemptOutcome::Error),
            (2, AttemptOutcome::Error),
        ]
    );
    assert_eq!(harness.stop_worker().await, 3);
}

#[tokio::test]
async fn zero_retries_falls_back_on_first_failure() {
    let mut harness = Harness::new(
        Timing {
            max_retries: 0,
            ..Timing::default()
        },
        MemoryStore::with_record(json!({"items": 9})),
    );
    harness.start_worker(Script::new([Step::Hang]));

    let reply = harness.request().await;

    assert_eq!(reply, json!({"items": 9, "fromCache": true}));
    assert_eq!(harness.attempts(), vec![(0, AttemptOutcome::UpstreamTimeout)]);
    assert_eq!(harness.broker.stats().retries_published, 0);
    harness.stop_worker().await;
}

#[tokio::test]
async fn late_live_answer_is_dropped_after_caller_gave_up() {
    let mut harness = Harness::new(
        Timing {
            deadline: Duration::from_millis(100),
            ..Timing::default()
        },
        MemoryStore::new(),
    );
    harness.start_worker(Script::new([
        Step::Hang,
        Step::Hang,
        Step::Answer(json!({"items": 7})),
    ]));

    let reply = harness.request().await;
    assert_eq!(reply, json!({"error": "timeout", "fromCache": true}));

    // The worker still finishes the request and refreshes the record.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let stats = harness.broker.stats();
    assert_eq!(stats.replies_dropped, 1);
    assert_eq!(stats.acks, 3);

    harness.stop_worker().await;
    assert_eq!(harness.request().await, json!({"items": 7, "fromCache": true}));
}
