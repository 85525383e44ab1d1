//! Transport errors and their mapping onto [`BrokerError`].

use inventory_rpc_core::BrokerError;
use thiserror::Error;

/// Errors raised by the AMQP transport.
#[derive(Debug, Error)]
pub enum AmqpError {
    /// The TCP/AMQP connection could not be established.
    #[error("failed to connect to broker: {0}")]
    Connect(#[source] lapin::Error),

    /// An exchange, queue or binding could not be declared.
    #[error("failed to declare {object}: {source}")]
    Declare {
        /// What was being declared, e.g. `queue inventory.q`.
        object: String,
        source: lapin::Error,
    },

    /// A channel operation failed.
    #[error("channel operation failed: {0}")]
    Channel(#[from] lapin::Error),

    /// The broker cancelled a consumer or closed the connection.
    #[error("broker closed the {0}")]
    Closed(String),
}

impl AmqpError {
    pub(crate) fn declare(object: impl Into<String>) -> impl FnOnce(lapin::Error) -> Self {
        let object = object.into();
        move |source| AmqpError::Declare { object, source }
    }
}

impl From<AmqpError> for BrokerError {
    fn from(err: AmqpError) -> Self {
        match err {
            AmqpError::Declare { .. } => BrokerError::Topology(err.to_string()),
            AmqpError::Connect(_) | AmqpError::Channel(_) | AmqpError::Closed(_) => {
                BrokerError::Unavailable(err.to_string())
            }
        }
    }
}
