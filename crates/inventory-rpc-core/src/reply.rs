//! Reply normalization.
//!
//! Every reply handed to a caller is a JSON object with a boolean
//! [`FROM_CACHE_KEY`] field. Objects keep their fields; any other JSON value is
//! wrapped under [`RESPONSE_KEY`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provenance flag present on every reply.
pub const FROM_CACHE_KEY: &str = "fromCache";

/// Key used to wrap non-object results.
pub const RESPONSE_KEY: &str = "response";

/// A normalized reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reply(Map<String, Value>);

impl Reply {
    /// Normalizes `value` and tags it with `from_cache`.
    pub fn normalize(value: Value, from_cache: bool) -> Self {
        let mut fields = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert(RESPONSE_KEY.to_string(), other);
                map
            }
        };
        fields.insert(FROM_CACHE_KEY.to_string(), Value::Bool(from_cache));
        Self(fields)
    }

    /// Normalizes a live upstream answer.
    pub fn live(value: Value) -> Self {
        Self::normalize(value, false)
    }

    /// Normalizes a payload read from the fallback store.
    pub fn cached(value: Value) -> Self {
        Self::normalize(value, true)
    }

    /// Decodes a reply body received from the broker.
    ///
    /// A body that already carries a boolean provenance flag is kept as the
    /// producer tagged it. Anything else is normalized as a live answer.
    pub fn from_wire(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(body)?;
        match value {
            Value::Object(map) if matches!(map.get(FROM_CACHE_KEY), Some(Value::Bool(_))) => {
                Ok(Self(map))
            }
            other => Ok(Self::live(other)),
        }
    }

    /// Encodes the reply for publishing.
    pub fn to_wire(&self) -> Vec<u8> {
        // A map of JSON values always serializes.
        serde_json::to_vec(&self.0).unwrap_or_default()
    }

    /// Returns the provenance flag.
    pub fn from_cache(&self) -> bool {
        matches!(self.0.get(FROM_CACHE_KEY), Some(Value::Bool(true)))
    }

    /// Returns a field of the reply.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the reply fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Converts into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Reply> for Value {
    fn from(reply: Reply) -> Self {
        reply.into_value()
    }
}
