//! Property tests for the retry state machine.
//!
//! Invariants tested:
//! - A request failing `k` times under `max_retries = m` sees `min(k, m) + 1` attempts
//! - Attempt counters increase by one per recirculation, starting at 0
//! - A live reply comes from attempt `k` exactly when `k <= m`
//! - Otherwise exactly one fallback reply is produced and nothing is recirculated after it

use inventory_rpc_core::{CorrelationId, Envelope, EMPTY_QUERY};
use inventory_rpc_fallback::{FallbackStore, MemoryStore};
use inventory_rpc_retry::{
    Disposition, MessageHandler, Query, RetryConfig, RetryExecutor, TerminalState, UpstreamError,
};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tower::service_fn;

struct Run {
    attempts_seen: Vec<u32>,
    states: Vec<TerminalState>,
    final_reply: Value,
}

/// Feeds recirculated copies back to the executor until it replies.
async fn drive(failures: u32, max_retries: u32, cached: Option<Value>) -> Run {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let c = Arc::clone(&calls);
    let s = Arc::clone(&seen);
    let upstream = service_fn(move |query: Query| {
        s.lock().unwrap().push(query.attempt);
        let call = c.fetch_add(1, Ordering::SeqCst);
        async move {
            if call < failures {
                Err(UpstreamError::Status(503))
            } else {
                Ok(json!({ "answered_at": call }))
            }
        }
    });
    let store = Arc::new(match cached {
        Some(record) => MemoryStore::with_record(record),
        None => MemoryStore::new(),
    });
    let config = RetryConfig::builder()
        .max_retries(max_retries)
        .attempt_timeout(Duration::from_secs(1))
        .build();
    let mut executor = RetryExecutor::new(upstream, store, config);

    let mut envelope = Envelope::query(CorrelationId::from("c-prop"), "amq.gen-prop", EMPTY_QUERY);
    let mut states = Vec::new();
    loop {
        let disposition = executor.handle(envelope).await;
        states.push(disposition.state());
        match disposition {
            Disposition::Recirculate { envelope: next, .. } => envelope = next,
            Disposition::Reply { envelope: reply, .. } => {
                let attempts_seen = seen.lock().unwrap().clone();
                return Run {
                    attempts_seen,
                    states,
                    final_reply: serde_json::from_slice(&reply.payload).unwrap(),
                };
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: attempts are 0, 1, 2, ... and stop at the first success or at max_retries
    #[test]
    fn attempts_are_monotonic(failures in 0u32..6, max_retries in 0u32..4) {
        let rt = Runtime::new().unwrap();
        let run = rt.block_on(drive(failures, max_retries, None));

        let expected: Vec<u32> = (0..=failures.min(max_retries)).collect();
        prop_assert_eq!(&run.attempts_seen, &expected);
        prop_assert_eq!(run.states.len(), expected.len());
        prop_assert!(run.states[..run.states.len() - 1]
            .iter()
            .all(|state| *state == TerminalState::Recirculated));
    }

    /// Property: live reply iff the upstream recovers within the retry budget
    #[test]
    fn live_or_single_fallback(failures in 0u32..6, max_retries in 0u32..4) {
        let rt = Runtime::new().unwrap();
        let run = rt.block_on(drive(failures, max_retries, Some(json!({"items": 3}))));
        let last = *run.states.last().unwrap();

        if failures <= max_retries {
            prop_assert_eq!(last, TerminalState::RepliedLive);
            prop_assert_eq!(run.final_reply, json!({"answered_at": failures, "fromCache": false}));
        } else {
            prop_assert_eq!(last, TerminalState::RepliedFallback);
            prop_assert_eq!(run.final_reply, json!({"items": 3, "fromCache": true}));
            let fallbacks = run
                .states
                .iter()
                .filter(|state| **state == TerminalState::RepliedFallback)
                .count();
            prop_assert_eq!(fallbacks, 1);
        }
    }
}

#[tokio::test]
async fn failed_attempts_never_touch_the_record() {
    let store = Arc::new(MemoryStore::with_record(json!({"items": 1})));
    let upstream = service_fn(|_q: Query| async { Err::<Value, _>(UpstreamError::Timeout) });
    let mut executor = RetryExecutor::new(upstream, store.clone(), RetryConfig::builder().build());

    let mut envelope = Envelope::query(CorrelationId::from("c-1"), "amq.gen-1", EMPTY_QUERY);
    for _ in 0..3 {
        let disposition = executor.handle(envelope.clone()).await;
        if let Disposition::Recirculate { envelope: next, .. } = disposition {
            envelope = next;
        }
    }
    assert_eq!(store.load().await, json!({"items": 1}));
}
