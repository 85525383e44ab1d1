use inventory_rpc_core::{FnListener, MemoryBroker, Reply, Topology};
use inventory_rpc_fallback::MemoryStore;
use inventory_rpc_retry::{
    AttemptOutcome, Query, RetryConfig, RetryExecutor, UpstreamError, Worker,
};
use inventory_rpc_router::{ReplyRouter, ReplyRouterConfig, RouterEvent, RouterOutcome};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::service_fn;

/// One scripted upstream behaviour.
#[derive(Debug, Clone)]
pub enum Step {
    Answer(Value),
    Fail(UpstreamError),
    Hang,
}

/// Upstream answers consumed in order; an exhausted script keeps failing.
#[derive(Clone, Default)]
pub struct Script(Arc<Mutex<VecDeque<Step>>>);

impl Script {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self(Arc::new(Mutex::new(steps.into_iter().collect())))
    }

    pub fn push(&self, step: Step) {
        self.0.lock().unwrap().push_back(step);
    }

    fn next(&self) -> Step {
        self.0
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Fail(UpstreamError::Status(503)))
    }
}

#[derive(Debug, Clone)]
pub struct Timing {
    pub deadline: Duration,
    pub attempt_timeout: Duration,
    pub retry_delay: Duration,
    pub max_retries: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(2),
            attempt_timeout: Duration::from_millis(60),
            retry_delay: Duration::from_millis(20),
            max_retries: 2,
        }
    }
}

/// A router and a worker sharing one in-memory broker and one fallback store.
pub struct Harness {
    pub broker: MemoryBroker,
    pub store: Arc<MemoryStore>,
    pub router: ReplyRouter,
    attempts: Arc<Mutex<Vec<(u32, AttemptOutcome)>>>,
    fallbacks: Arc<Mutex<Vec<u32>>>,
    router_outcomes: Arc<Mutex<Vec<RouterOutcome>>>,
    correlation_ids: Arc<Mutex<Vec<String>>>,
    timing: Timing,
    worker: Option<(oneshot::Sender<()>, JoinHandle<u64>)>,
}

impl Harness {
    pub fn new(timing: Timing, store: MemoryStore) -> Self {
        let broker = MemoryBroker::new(Topology::default().retry_delay(timing.retry_delay));
        let store = Arc::new(store);

        let router_outcomes = Arc::new(Mutex::new(Vec::new()));
        let correlation_ids = Arc::new(Mutex::new(Vec::new()));
        let replied = Arc::clone(&router_outcomes);
        let fell_back = Arc::clone(&router_outcomes);
        let ids = Arc::clone(&correlation_ids);
        let config = ReplyRouterConfig::builder()
            .deadline(timing.deadline)
            .poll_slice(Duration::from_millis(10))
            .name("proxy")
            .on_reply(move |_, _| replied.lock().unwrap().push(RouterOutcome::Ok))
            .on_fallback(move |outcome| fell_back.lock().unwrap().push(outcome))
            .event_listener(Arc::new(FnListener::new(move |event: &RouterEvent| {
                if let RouterEvent::Replied { correlation_id, .. } = event {
                    ids.lock().unwrap().push(correlation_id.clone());
                }
            })))
            .build();
        let router = ReplyRouter::new(Arc::new(broker.clone()), store.clone(), config);

        Self {
            broker,
            store,
            router,
            attempts: Arc::new(Mutex::new(Vec::new())),
            fallbacks: Arc::new(Mutex::new(Vec::new())),
            router_outcomes,
            correlation_ids,
            timing,
            worker: None,
        }
    }

    /// Starts a worker whose upstream follows `script`.
    pub fn start_worker(&mut self, script: Script) {
        self.start_worker_with(move |_query| script.next());
    }

    /// Starts a worker whose upstream behaviour is chosen per query.
    pub fn start_worker_with<F>(&mut self, behaviour: F)
    where
        F: Fn(&Query) -> Step + Send + 'static,
    {
        let upstream = service_fn(move |query: Query| {
            let step = behaviour(&query);
            async move {
                match step {
                    Step::Answer(value) => Ok(value),
                    Step::Fail(err) => Err(err),
                    Step::Hang => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Err(UpstreamError::Timeout)
                    }
                }
            }
        });

        let attempts = Arc::clone(&self.attempts);
        let fallbacks = Arc::clone(&self.fallbacks);
        let config = RetryConfig::builder()
            .max_retries(self.timing.max_retries)
            .attempt_timeout(self.timing.attempt_timeout)
            .name("worker")
            .on_attempt(move |attempt, outcome| attempts.lock().unwrap().push((attempt, outcome)))
            .on_fallback(move |attempt| fallbacks.lock().unwrap().push(attempt))
            .build();
        let executor = RetryExecutor::new(upstream, self.store.clone(), config);

        let mut worker = Worker::new(self.broker.work_channel(), executor);
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            worker
                .run_until(async move {
                    let _ = rx.await;
                })
                .await
                .unwrap()
        });
        self.worker = Some((tx, handle));
    }

    /// Stops the worker between deliveries and returns how many it handled.
    pub async fn stop_worker(&mut self) -> u64 {
        match self.worker.take() {
            Some((tx, handle)) => {
                let _ = tx.send(());
                handle.await.unwrap()
            }
            None => 0,
        }
    }

    pub async fn request(&self) -> Value {
        self.router.handle_request().await.into_value()
    }

    pub fn attempts(&self) -> Vec<(u32, AttemptOutcome)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn fallbacks(&self) -> Vec<u32> {
        self.fallbacks.lock().unwrap().clone()
    }

    pub fn router_outcomes(&self) -> Vec<RouterOutcome> {
        self.router_outcomes.lock().unwrap().clone()
    }

    pub fn correlation_ids(&self) -> Vec<String> {
        self.correlation_ids.lock().unwrap().clone()
    }
}

/// `value` as a live reply.
pub fn live(value: Value) -> Value {
    Reply::live(value).into_value()
}

/// `value` as a cached reply.
pub fn cached(value: Value) -> Value {
    Reply::cached(value).into_value()
}
