//! Core protocol types for inventory-rpc.
//!
//! This crate holds everything the proxy-side router and the worker-side
//! retry executor agree on:
//! - [`Envelope`] and [`CorrelationId`]: what travels through the broker
//! - [`Reply`]: the normalized, provenance-tagged answer handed to callers
//! - [`Topology`]: exchange, work queue and dead-lettering delay queue
//! - [`SessionFactory`], [`ReplySession`] and [`WorkChannel`]: transport seams
//! - an event system for observability
//! - [`MemoryBroker`]: an in-process transport with the same semantics

pub mod broker;
pub mod envelope;
pub mod error;
pub mod events;
pub mod memory;
pub mod reply;
pub mod topology;

pub use broker::{Delivery, DeliveryTag, ReplySession, SessionFactory, WorkChannel};
pub use envelope::{CorrelationId, Envelope, HeaderValue, ATTEMPT_HEADER, EMPTY_QUERY};
pub use error::BrokerError;
pub use events::{EventListener, EventListeners, FnListener, RpcEvent};
pub use memory::{MemoryBroker, MemoryStats, MemoryWorkChannel};
pub use reply::{Reply, FROM_CACHE_KEY, RESPONSE_KEY};
pub use topology::{DeadLetterRule, Destination, Topology};
