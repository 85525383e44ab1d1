//! Worker-side retry executor.
//!
//! Each delivered query goes through one upstream attempt under a
//! per-attempt timeout and ends in exactly one of three states:
//!
//! - **replied live**: the answer is saved as the new fallback record and
//!   replied with `fromCache: false`
//! - **recirculated**: the attempt failed and `attempt < max_retries`, so a
//!   copy with `attempt + 1` is published to the delay queue, which
//!   dead-letters it back to the work queue after its TTL
//! - **replied fallback**: the attempt failed and retries are exhausted, so
//!   the fallback record is replied with `fromCache: true`
//!
//! [`RetryExecutor`] only decides; [`Worker`] owns the broker, publishing the
//! outcome before acknowledging each delivery.
//!
//! ## Example
//!
//! ```rust
//! use inventory_rpc_core::{CorrelationId, Envelope};
//! use inventory_rpc_fallback::MemoryStore;
//! use inventory_rpc_retry::{
//!     Disposition, MessageHandler, Query, RetryConfig, RetryExecutor, UpstreamError,
//! };
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//! use tower::service_fn;
//!
//! # async fn example() {
//! let upstream = service_fn(|_query: Query| async {
//!     Ok::<Value, UpstreamError>(json!({"items": 5}))
//! });
//! let config = RetryConfig::builder()
//!     .max_retries(2)
//!     .on_attempt(|attempt, outcome| println!("attempt {attempt}: {outcome}"))
//!     .build();
//! let mut executor = RetryExecutor::new(upstream, Arc::new(MemoryStore::new()), config);
//!
//! let query = Envelope::query(CorrelationId::generate(), "amq.gen-1", b"{}".to_vec());
//! let disposition = executor.handle(query).await;
//! assert!(matches!(disposition, Disposition::Reply { from_cache: false, .. }));
//! # }
//! ```

use futures::future::BoxFuture;
use inventory_rpc_core::{Envelope, Reply};
use inventory_rpc_fallback::FallbackStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tower::{Service, ServiceExt};

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

pub use config::{RetryConfig, RetryConfigBuilder};
pub use events::{AttemptEvent, AttemptOutcome};
pub use handler::{Disposition, MessageHandler, TerminalState};
pub use upstream::{Query, UpstreamError};
pub use worker::{Worker, WorkerError};

mod config;
mod events;
mod handler;
mod upstream;
mod worker;

/// Decides the fate of each delivered query by calling an upstream service.
pub struct RetryExecutor<S> {
    upstream: S,
    store: Arc<dyn FallbackStore>,
    config: Arc<RetryConfig>,
}

impl<S> RetryExecutor<S> {
    /// Creates an executor calling `upstream` and recording answers in `store`.
    pub fn new(upstream: S, store: Arc<dyn FallbackStore>, config: RetryConfig) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "rpc_executor_attempts_total",
                "Total number of upstream attempts by outcome (ok, upstream_timeout, error)"
            );
            describe_counter!(
                "rpc_executor_outcomes_total",
                "Deliveries by terminal state (replied_live, recirculated, replied_fallback)"
            );
        }

        Self {
            upstream,
            store,
            config: Arc::new(config),
        }
    }

    /// Returns the executor configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn emit(&self, event: AttemptEvent) {
        self.config.event_listeners.emit(&event);
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record(&self, state: TerminalState) {
        #[cfg(feature = "metrics")]
        counter!(
            "rpc_executor_outcomes_total",
            "executor" => self.config.name.clone(),
            "state" => state.as_str()
        )
        .increment(1);
    }
}

impl<S> RetryExecutor<S>
where
    S: Service<crate::Query, Response = Value> + Send,
    S::Future: Send,
    S::Error: Into<UpstreamError>,
{
    async fn attempt(&mut self, envelope: &Envelope) -> Result<Value, UpstreamError> {
        let query = Query::from(envelope);
        let upstream = &mut self.upstream;
        let into_upstream = |err: S::Error| -> UpstreamError { err.into() };
        let call = async move {
            let ready = upstream.ready().await.map_err(into_upstream);
            match ready {
                Ok(service) => service.call(query).await.map_err(into_upstream),
                Err(err) => Err(err),
            }
        };
        match tokio::time::timeout(self.config.attempt_timeout, call).await {
            Ok(result) => result,
            Err(_elapsed) => Err(UpstreamError::Timeout),
        }
    }

    async fn process(&mut self, envelope: Envelope) -> Disposition {
        let attempt = envelope.attempt;
        let correlation_id = envelope.correlation_id.as_ref().map(|id| id.to_string());
        let start = Instant::now();
        let result = self.attempt(&envelope).await;
        let duration = start.elapsed();

        let error = match result {
            Ok(value) => {
                // Persist before replying so the record never lags a reply.
                self.store.save(&value).await;
                let reply = Reply::live(value);

                #[cfg(feature = "metrics")]
                counter!(
                    "rpc_executor_attempts_total",
                    "executor" => self.config.name.clone(),
                    "outcome" => "ok"
                )
                .increment(1);

                #[cfg(feature = "tracing")]
                debug!(
                    executor = %self.config.name,
                    corr_id = correlation_id.as_deref().unwrap_or(""),
                    attempt,
                    duration_ms = duration.as_millis() as u64,
                    "Upstream answered"
                );

                self.emit(AttemptEvent::Attempt {
                    source_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    correlation_id,
                    attempt,
                    outcome: AttemptOutcome::Ok,
                    error: None,
                    duration,
                });
                self.record(TerminalState::RepliedLive);

                return Disposition::Reply {
                    reply_to: envelope.reply_to.clone(),
                    envelope: Envelope::reply(envelope.correlation_id.clone(), reply.to_wire()),
                    from_cache: false,
                };
            }
            Err(error) => error,
        };

        let outcome = if error.is_timeout() {
            AttemptOutcome::UpstreamTimeout
        } else {
            AttemptOutcome::Error
        };

        #[cfg(feature = "metrics")]
        counter!(
            "rpc_executor_attempts_total",
            "executor" => self.config.name.clone(),
            "outcome" => outcome.as_str()
        )
        .increment(1);

        #[cfg(feature = "tracing")]
        warn!(
            executor = %self.config.name,
            corr_id = correlation_id.as_deref().unwrap_or(""),
            attempt,
            outcome = outcome.as_str(),
            error = %error,
            "Upstream attempt failed"
        );

        self.emit(AttemptEvent::Attempt {
            source_name: self.config.name.clone(),
            timestamp: Instant::now(),
            correlation_id: correlation_id.clone(),
            attempt,
            outcome,
            error: Some(error.to_string()),
            duration,
        });

        if attempt < self.config.max_retries {
            let next = envelope.next_attempt();
            self.emit(AttemptEvent::Recirculated {
                source_name: self.config.name.clone(),
                timestamp: Instant::now(),
                correlation_id,
                next_attempt: next.attempt,
                cause: outcome,
            });
            self.record(TerminalState::Recirculated);

            return Disposition::Recirculate {
                routing_key: self.config.retry_routing_key.clone(),
                envelope: next,
            };
        }

        let reply = Reply::cached(self.store.load().await);

        #[cfg(feature = "tracing")]
        warn!(
            executor = %self.config.name,
            corr_id = correlation_id.as_deref().unwrap_or(""),
            attempt,
            "Retries exhausted, replying fallback record"
        );

        self.emit(AttemptEvent::Fallback {
            source_name: self.config.name.clone(),
            timestamp: Instant::now(),
            correlation_id,
            attempt,
        });
        self.record(TerminalState::RepliedFallback);

        Disposition::Reply {
            reply_to: envelope.reply_to.clone(),
            envelope: Envelope::reply(envelope.correlation_id.clone(), reply.to_wire()),
            from_cache: true,
        }
    }
}

impl<S> MessageHandler for RetryExecutor<S>
where
    S: Service<Query, Response = Value> + Send,
    S::Future: Send,
    S::Error: Into<UpstreamError>,
{
    fn handle(&mut self, envelope: Envelope) -> BoxFuture<'_, Disposition> {
        Box::pin(self.process(envelope))
    }
}
