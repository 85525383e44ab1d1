//! The upstream collaborator seen by the executor.

use inventory_rpc_core::{CorrelationId, Envelope};
use thiserror::Error;

/// One call to the upstream service, derived from a delivered envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Correlation id of the logical request, when the producer set one.
    pub correlation_id: Option<CorrelationId>,
    /// Number of earlier failed attempts for this request.
    pub attempt: u32,
    /// Raw query body.
    pub payload: Vec<u8>,
}

impl From<&Envelope> for Query {
    fn from(envelope: &Envelope) -> Self {
        Self {
            correlation_id: envelope.correlation_id.clone(),
            attempt: envelope.attempt,
            payload: envelope.payload.clone(),
        }
    }
}

/// Ways an upstream call can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// No answer within the per-attempt timeout.
    #[error("upstream timed out")]
    Timeout,

    /// The upstream answered with a non-success status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// The request could not be delivered or the connection broke.
    #[error("upstream transport failed: {0}")]
    Transport(String),

    /// The answer was not valid JSON.
    #[error("upstream answer could not be decoded: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Returns `true` for timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, UpstreamError::Timeout)
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        UpstreamError::Decode(err.to_string())
    }
}
