//! Transport error type shared by every broker implementation.

use thiserror::Error;

/// Errors raised by a broker session or worker channel.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached or the connection dropped.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// A publish was rejected or could not be written.
    #[error("publish to {destination} failed: {reason}")]
    Publish {
        /// Routing key or queue the publish targeted.
        destination: String,
        /// Transport-specific reason.
        reason: String,
    },

    /// Consuming from a queue failed.
    #[error("consume failed: {0}")]
    Consume(String),

    /// Acknowledging a delivery failed.
    #[error("ack of delivery {tag} failed: {reason}")]
    Ack {
        /// Delivery tag that could not be acknowledged.
        tag: u64,
        /// Transport-specific reason.
        reason: String,
    },

    /// The topology could not be declared.
    #[error("topology declaration failed: {0}")]
    Topology(String),
}

impl BrokerError {
    /// Returns `true` if the error means the connection itself is gone.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BrokerError::Unavailable(_))
    }
}
