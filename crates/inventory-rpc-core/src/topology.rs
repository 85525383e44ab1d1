//! Broker topology: one direct exchange, a work queue and a delay queue.
//!
//! The retry queue has no consumers. Messages published to it expire after
//! [`Topology::retry_delay`] and are dead-lettered back to the exchange under
//! the query routing key, which gives a fixed-delay retry without a scheduler.

use std::time::Duration;

/// Names and delay of the broker objects shared by proxy and worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Durable direct exchange.
    pub exchange: String,
    /// Durable work queue consumed by workers.
    pub main_queue: String,
    /// Routing key binding the work queue.
    pub query_routing_key: String,
    /// Durable delay queue.
    pub retry_queue: String,
    /// Routing key binding the delay queue.
    pub retry_routing_key: String,
    /// Message TTL on the delay queue.
    pub retry_delay: Duration,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            exchange: "inventory.ex".to_string(),
            main_queue: "inventory.q".to_string(),
            query_routing_key: "inventory.query".to_string(),
            retry_queue: "inventory.retry.2s".to_string(),
            retry_routing_key: "inventory.retry".to_string(),
            retry_delay: Duration::from_millis(2000),
        }
    }
}

impl Topology {
    /// Sets the exchange name.
    pub fn exchange(mut self, name: impl Into<String>) -> Self {
        self.exchange = name.into();
        self
    }

    /// Sets the work queue name.
    pub fn main_queue(mut self, name: impl Into<String>) -> Self {
        self.main_queue = name.into();
        self
    }

    /// Sets the query routing key.
    pub fn query_routing_key(mut self, key: impl Into<String>) -> Self {
        self.query_routing_key = key.into();
        self
    }

    /// Sets the delay queue name.
    pub fn retry_queue(mut self, name: impl Into<String>) -> Self {
        self.retry_queue = name.into();
        self
    }

    /// Sets the retry routing key.
    pub fn retry_routing_key(mut self, key: impl Into<String>) -> Self {
        self.retry_routing_key = key.into();
        self
    }

    /// Sets the delay applied to recirculated messages.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Returns the dead-letter rule declared on the delay queue.
    pub fn dead_letter_rule(&self) -> DeadLetterRule {
        DeadLetterRule {
            message_ttl: self.retry_delay,
            exchange: self.exchange.clone(),
            routing_key: self.query_routing_key.clone(),
        }
    }

    /// Destination of the first publish of a logical request.
    pub fn query_destination(&self) -> Destination {
        Destination::Route(self.query_routing_key.clone())
    }

    /// Destination of a recirculated copy.
    pub fn retry_destination(&self) -> Destination {
        Destination::Route(self.retry_routing_key.clone())
    }
}

/// Expiry and redelivery arguments of the delay queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterRule {
    /// `x-message-ttl`.
    pub message_ttl: Duration,
    /// `x-dead-letter-exchange`.
    pub exchange: String,
    /// `x-dead-letter-routing-key`.
    pub routing_key: String,
}

impl DeadLetterRule {
    /// TTL in whole milliseconds, saturated to the AMQP signed 32-bit range.
    pub fn ttl_millis(&self) -> i32 {
        i32::try_from(self.message_ttl.as_millis()).unwrap_or(i32::MAX)
    }
}

/// Where a worker publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Through the topology exchange with a routing key. Persistent.
    Route(String),
    /// Straight to a reply queue through the default exchange. Transient.
    ReplyTo(String),
}

impl Destination {
    /// Returns true if messages to this destination must survive a broker restart.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Destination::Route(_))
    }
}
