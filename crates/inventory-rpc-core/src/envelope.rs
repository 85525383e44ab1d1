//! Envelopes and correlation identifiers.

use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Header carrying the attempt counter on the wire.
pub const ATTEMPT_HEADER: &str = "x-attempt";

/// Payload published for an inventory query. The query carries no fields.
pub const EMPTY_QUERY: &[u8] = b"{}";

/// Identifier echoed on a reply so concurrent requests can share a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh random (UUID v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl PartialEq<str> for CorrelationId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// A header value carried through recirculation.
///
/// Only scalar values survive the trip through the core; transports drop
/// nested tables and arrays when converting to this type.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl HeaderValue {
    /// Reads the value as a non-negative attempt counter.
    ///
    /// Integers and decimal strings are accepted; anything else is `None`.
    pub fn as_attempt(&self) -> Option<u32> {
        match self {
            HeaderValue::Int(v) => u32::try_from(*v).ok(),
            HeaderValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Wraps a query or a reply in transit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    /// Correlation id generated by the router; required on replies.
    pub correlation_id: Option<CorrelationId>,
    /// Address of the queue that must receive the eventual reply.
    pub reply_to: Option<String>,
    /// Number of processing cycles that already failed for this request.
    pub attempt: u32,
    /// Headers other than the attempt counter, carried through unchanged.
    pub headers: BTreeMap<String, HeaderValue>,
    /// Raw body, opaque to the envelope.
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Builds the first envelope of a logical request.
    pub fn query(
        correlation_id: CorrelationId,
        reply_to: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            reply_to: Some(reply_to.into()),
            attempt: 0,
            headers: BTreeMap::new(),
            payload: payload.into(),
        }
    }

    /// Builds a reply envelope echoing `correlation_id`.
    pub fn reply(correlation_id: Option<CorrelationId>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            correlation_id,
            reply_to: None,
            attempt: 0,
            headers: BTreeMap::new(),
            payload: payload.into(),
        }
    }

    /// Rebuilds an envelope from transport metadata.
    ///
    /// The attempt counter is taken out of `headers`; a missing or unreadable
    /// counter reads as attempt 0.
    pub fn from_parts(
        correlation_id: Option<CorrelationId>,
        reply_to: Option<String>,
        mut headers: BTreeMap<String, HeaderValue>,
        payload: Vec<u8>,
    ) -> Self {
        let attempt = headers
            .remove(ATTEMPT_HEADER)
            .and_then(|v| v.as_attempt())
            .unwrap_or(0);
        Self {
            correlation_id,
            reply_to: reply_to.filter(|r| !r.is_empty()),
            attempt,
            headers,
            payload,
        }
    }

    /// Returns the copy that recirculates through the retry queue.
    ///
    /// Payload, reply address, correlation id and headers are preserved; the
    /// attempt counter grows by exactly one.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    /// Returns the headers as they travel on the wire, attempt counter included.
    pub fn wire_headers(&self) -> BTreeMap<String, HeaderValue> {
        let mut headers = self.headers.clone();
        headers.insert(
            ATTEMPT_HEADER.to_string(),
            HeaderValue::Int(i64::from(self.attempt)),
        );
        headers
    }

    /// Returns true if the correlation id equals `expected`.
    pub fn correlates_with(&self, expected: &CorrelationId) -> bool {
        self.correlation_id.as_ref() == Some(expected)
    }
}
