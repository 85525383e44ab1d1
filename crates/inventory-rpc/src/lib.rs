//! Inventory queries with request/reply semantics over an AMQP worker pool.
//!
//! This crate wires the protocol crates into two processes:
//!
//! - `inventory-proxy`: HTTP front door. Each `GET /consulta` becomes one
//!   correlated query routed by [`ReplyRouter`](inventory_rpc_router::ReplyRouter),
//!   answered live or from the last-known-good record.
//! - `inventory-worker`: consumes the work queue with prefetch 1 and runs the
//!   [`RetryExecutor`](inventory_rpc_retry::RetryExecutor) against the
//!   [`HttpUpstream`], recirculating failures through the TTL delay queue.
//!
//! Both read their settings once from flags and the environment
//! ([`settings`]) and log JSON Lines through [`telemetry`].

use std::time::Duration;

pub mod http;
pub mod settings;
pub mod telemetry;
pub mod upstream;

pub use http::app;
pub use settings::{ProxySettings, WorkerSettings};
pub use telemetry::AuditListener;
pub use upstream::HttpUpstream;

/// Returns the worker's total upstream budget when it exceeds the caller deadline.
///
/// A caller may then give up and be served the fallback record while the
/// worker is still retrying, so the live answer arrives to nobody.
pub fn deadline_budget_mismatch(
    rpc_timeout: Duration,
    attempt_timeout: Duration,
    max_retries: u32,
) -> Option<Duration> {
    let budget = attempt_timeout.saturating_mul(max_retries.saturating_add(1));
    (rpc_timeout < budget).then_some(budget)
}

/// Logs the deadline mismatch, if any.
pub fn warn_on_deadline_mismatch(
    rpc_timeout: Duration,
    attempt_timeout: Duration,
    max_retries: u32,
) {
    if let Some(budget) = deadline_budget_mismatch(rpc_timeout, attempt_timeout, max_retries) {
        tracing::warn!(
            rpc_timeout_ms = rpc_timeout.as_millis() as u64,
            upstream_budget_ms = budget.as_millis() as u64,
            max_retries,
            "caller deadline is shorter than the worker's retry budget; \
             late live answers will be dropped"
        );
    }
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
