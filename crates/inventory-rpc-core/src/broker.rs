//! Transport seams used by the router and the worker.
//!
//! The router talks to a [`SessionFactory`]: every external request opens its
//! own [`ReplySession`] with a private reply queue and closes it when done.
//! The worker talks to a [`WorkChannel`]: one channel per process, consumed
//! one delivery at a time.

use crate::envelope::Envelope;
use crate::error::BrokerError;
use crate::topology::Destination;
use futures::future::BoxFuture;
use std::time::Duration;

/// A per-call broker session owning a private, exclusive, auto-deleting reply queue.
pub trait ReplySession: Send {
    /// Address of the private reply queue, used as `replyTo`.
    fn reply_to(&self) -> &str;

    /// Publishes `envelope` persistently to the exchange under `routing_key`.
    fn publish<'a>(
        &'a mut self,
        routing_key: &'a str,
        envelope: &'a Envelope,
    ) -> BoxFuture<'a, Result<(), BrokerError>>;

    /// Waits at most `wait` for the next message on the reply queue.
    ///
    /// Returns `Ok(None)` when nothing arrived within `wait`. Returned
    /// messages are already acknowledged.
    fn next_reply(
        &mut self,
        wait: Duration,
    ) -> BoxFuture<'_, Result<Option<Envelope>, BrokerError>>;

    /// Releases the reply queue and the underlying connection.
    ///
    /// Errors while closing are swallowed; a session is unusable afterwards.
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Opens one [`ReplySession`] per external request.
pub trait SessionFactory: Send + Sync {
    /// Opens a session with a freshly declared reply queue.
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn ReplySession>, BrokerError>>;
}

/// Broker-assigned identity of an unacknowledged delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryTag(pub u64);

/// A message handed to a worker.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Tag to acknowledge once the message is handled.
    pub tag: DeliveryTag,
    /// The decoded envelope.
    pub envelope: Envelope,
}

/// The worker side of the transport.
pub trait WorkChannel: Send {
    /// Waits for the next delivery from the work queue.
    ///
    /// Returns `Ok(None)` once the consumer has been cancelled or the
    /// connection closed cleanly.
    fn next_delivery(&mut self) -> BoxFuture<'_, Result<Option<Delivery>, BrokerError>>;

    /// Publishes `envelope` to `destination`.
    ///
    /// Publishing to a reply queue that no longer exists is not an error.
    fn publish<'a>(
        &'a mut self,
        destination: &'a Destination,
        envelope: &'a Envelope,
    ) -> BoxFuture<'a, Result<(), BrokerError>>;

    /// Acknowledges a delivery, removing it from the topology.
    fn ack(&mut self, tag: DeliveryTag) -> BoxFuture<'_, Result<(), BrokerError>>;
}
