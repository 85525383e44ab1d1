//! End-to-end tests over the in-memory broker.
//!
//! Test organization:
//! - support.rs: harness wiring a router and a spawned worker to one broker
//! - scenarios.rs: the four reference request flows
//! - retries.rs: attempt counting and retry exhaustion
//! - correlation.rs: concurrent callers only see their own replies
//! - freshness.rs: the fallback record tracks the latest success
//! - cancellation.rs: dropped requests release their reply queues

mod cancellation;
mod correlation;
mod freshness;
mod retries;
mod scenarios;
mod support;
