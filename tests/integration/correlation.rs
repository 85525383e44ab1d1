use super::support::{Harness, Step, Timing};
use futures::future::join_all;
use inventory_rpc_fallback::MemoryStore;
use serde_json::{json, Value};
use std::collections::HashSet;

#[tokio::test]
async fn concurrent_callers_receive_their_own_replies() {
    let mut harness = Harness::new(Timing::default(), MemoryStore::new());
    harness.start_worker_with(|query| {
        let corr = query
            .correlation_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_default();
        Step::Answer(json!({ "corr": corr }))
    });

    let replies: Vec<Value> = join_all((0..20).map(|_| harness.request())).await;

    let answered: HashSet<String> = replies
        .iter()
        .map(|reply| {
            assert_eq!(reply["fromCache"], false);
            reply["corr"].as_str().unwrap().to_string()
        })
        .collect();
    let issued: HashSet<String> = harness.correlation_ids().into_iter().collect();

    assert_eq!(answered.len(), 20);
    assert_eq!(answered, issued);
    assert_eq!(harness.broker.reply_queue_count(), 0);
    harness.stop_worker().await;
}
