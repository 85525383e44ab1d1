//! Proxy-side reply router.
//!
//! Turns one external request into one correlated query on the broker and
//! waits a bounded time for the matching reply:
//! - a fresh correlation id and a private reply queue per request
//! - polling in fixed slices against a deadline computed once
//! - replies for other correlation ids are discarded
//! - on deadline or broker failure, the last-known-good record is served
//!   tagged `fromCache: true`
//!
//! The router never fails from the caller's point of view, so it is also a
//! `tower::Service<()>` with `Infallible` errors.
//!
//! ## Example
//!
//! ```rust
//! use inventory_rpc_core::{MemoryBroker, Topology};
//! use inventory_rpc_fallback::MemoryStore;
//! use inventory_rpc_router::{ReplyRouter, ReplyRouterConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let broker = MemoryBroker::new(Topology::default());
//! let config = ReplyRouterConfig::builder()
//!     .deadline(Duration::from_millis(100))
//!     .name("proxy")
//!     .on_fallback(|outcome| eprintln!("served fallback: {outcome}"))
//!     .build();
//!
//! let router = ReplyRouter::new(Arc::new(broker), Arc::new(MemoryStore::new()), config);
//!
//! // Nobody consumes the work queue, so the sentinel comes back.
//! let reply = router.handle_request().await;
//! assert!(reply.from_cache());
//! # }
//! ```

use futures::future::BoxFuture;
use inventory_rpc_core::{
    BrokerError, CorrelationId, Envelope, Reply, ReplySession, SessionFactory,
};
use inventory_rpc_fallback::FallbackStore;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

pub use config::{ReplyRouterConfig, ReplyRouterConfigBuilder};
pub use events::{RouterEvent, RouterOutcome};

mod config;
mod events;

/// Why a request could not be answered with a correlated reply.
enum Miss {
    Deadline,
    Failed(String),
}

impl From<BrokerError> for Miss {
    fn from(err: BrokerError) -> Self {
        Miss::Failed(err.to_string())
    }
}

/// Closes a reply session even when the owning request is cancelled.
struct SessionGuard {
    session: Option<Box<dyn ReplySession>>,
}

impl SessionGuard {
    fn new(session: Box<dyn ReplySession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    fn session_mut(&mut self) -> Option<&mut (dyn ReplySession + 'static)> {
        self.session.as_deref_mut()
    }

    async fn close(mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        // Outside a runtime the session is dropped as is.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(session.close());
        }
    }
}

/// Routes requests through the broker and waits for correlated replies.
#[derive(Clone)]
pub struct ReplyRouter {
    sessions: Arc<dyn SessionFactory>,
    store: Arc<dyn FallbackStore>,
    config: Arc<ReplyRouterConfig>,
}

impl ReplyRouter {
    /// Creates a router opening sessions from `sessions` and falling back to `store`.
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        store: Arc<dyn FallbackStore>,
        config: ReplyRouterConfig,
    ) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "rpc_router_requests_total",
                "Total number of routed requests by outcome (ok, timeout_fallback, error_fallback)"
            );
            describe_histogram!(
                "rpc_router_request_duration_seconds",
                "Time from request start to the answer handed to the caller"
            );
        }

        Self {
            sessions,
            store,
            config: Arc::new(config),
        }
    }

    /// Returns the router configuration.
    pub fn config(&self) -> &ReplyRouterConfig {
        &self.config
    }

    /// Serves one external request.
    ///
    /// Always answers: either the correlated reply as produced by the worker,
    /// or the fallback record normalized with `fromCache: true`.
    pub async fn handle_request(&self) -> Reply {
        let start = Instant::now();
        let deadline = start + self.config.deadline;
        let correlation_id = CorrelationId::generate();

        let miss = match self.exchange(&correlation_id, deadline).await {
            Ok(reply) => {
                let duration = start.elapsed();
                self.config.event_listeners.emit(&RouterEvent::Replied {
                    source_name: self.config.name.clone(),
                    timestamp: std::time::Instant::now(),
                    correlation_id: correlation_id.to_string(),
                    from_cache: reply.from_cache(),
                    duration,
                });

                #[cfg(feature = "metrics")]
                {
                    counter!(
                        "rpc_router_requests_total",
                        "router" => self.config.name.clone(),
                        "outcome" => "ok"
                    )
                    .increment(1);
                    histogram!(
                        "rpc_router_request_duration_seconds",
                        "router" => self.config.name.clone()
                    )
                    .record(duration.as_secs_f64());
                }

                #[cfg(feature = "tracing")]
                debug!(
                    router = %self.config.name,
                    corr_id = %correlation_id,
                    duration_ms = duration.as_millis() as u64,
                    from_cache = reply.from_cache(),
                    "Correlated reply received"
                );

                return reply;
            }
            Err(miss) => miss,
        };

        let reply = Reply::cached(self.store.load().await);
        let duration = start.elapsed();
        let (outcome, error) = match miss {
            Miss::Deadline => (RouterOutcome::TimeoutFallback, None),
            Miss::Failed(error) => (RouterOutcome::ErrorFallback, Some(error)),
        };

        #[cfg(feature = "metrics")]
        {
            counter!(
                "rpc_router_requests_total",
                "router" => self.config.name.clone(),
                "outcome" => outcome.as_str()
            )
            .increment(1);
            histogram!(
                "rpc_router_request_duration_seconds",
                "router" => self.config.name.clone()
            )
            .record(duration.as_secs_f64());
        }

        #[cfg(feature = "tracing")]
        warn!(
            router = %self.config.name,
            corr_id = %correlation_id,
            outcome = outcome.as_str(),
            error = error.as_deref().unwrap_or(""),
            duration_ms = duration.as_millis() as u64,
            "Serving fallback record"
        );

        self.config.event_listeners.emit(&RouterEvent::Fallback {
            source_name: self.config.name.clone(),
            timestamp: std::time::Instant::now(),
            correlation_id: correlation_id.to_string(),
            outcome,
            error,
            duration,
        });

        reply
    }

    /// Opens a session, runs the query and closes the session on every path.
    ///
    /// If the caller drops the request future mid-wait, the guard schedules
    /// the close on the runtime instead.
    async fn exchange(
        &self,
        correlation_id: &CorrelationId,
        deadline: Instant,
    ) -> Result<Reply, Miss> {
        let session = match tokio::time::timeout_at(deadline, self.sessions.open()).await {
            Ok(opened) => opened?,
            Err(_elapsed) => return Err(Miss::Deadline),
        };
        let mut guard = SessionGuard::new(session);
        let result = match guard.session_mut() {
            Some(session) => self.query(session, correlation_id, deadline).await,
            None => Err(Miss::Failed("session already closed".to_string())),
        };
        guard.close().await;
        result
    }

    async fn query(
        &self,
        session: &mut dyn ReplySession,
        correlation_id: &CorrelationId,
        deadline: Instant,
    ) -> Result<Reply, Miss> {
        let envelope = Envelope::query(
            correlation_id.clone(),
            session.reply_to().to_string(),
            self.config.payload.clone(),
        );
        match tokio::time::timeout_at(
            deadline,
            session.publish(&self.config.query_routing_key, &envelope),
        )
        .await
        {
            Ok(published) => published?,
            Err(_elapsed) => return Err(Miss::Deadline),
        }

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Miss::Deadline);
            }
            let wait = (deadline - now).min(self.config.poll_slice);
            match session.next_reply(wait).await? {
                Some(reply) if reply.correlates_with(correlation_id) => {
                    return Reply::from_wire(&reply.payload)
                        .map_err(|err| Miss::Failed(format!("reply is not valid JSON: {err}")));
                }
                Some(_stray) => {
                    #[cfg(feature = "tracing")]
                    debug!(
                        router = %self.config.name,
                        corr_id = %correlation_id,
                        stray = ?_stray.correlation_id,
                        "Discarding reply for another request"
                    );
                }
                None => {}
            }
        }
    }
}

impl Service<()> for ReplyRouter {
    type Response = Reply;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Reply, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ()) -> Self::Future {
        let router = self.clone();
        Box::pin(async move { Ok(router.handle_request().await) })
    }
}
