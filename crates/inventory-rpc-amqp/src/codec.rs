//! Conversion between envelopes and AMQP message properties.

use inventory_rpc_core::{CorrelationId, Envelope, HeaderValue};
use lapin::types::{AMQPValue, ByteArray, FieldTable, LongString, ShortString};
use lapin::BasicProperties;
use std::collections::BTreeMap;

pub(crate) const PERSISTENT: u8 = 2;
pub(crate) const TRANSIENT: u8 = 1;

/// Converts a header value for the wire.
pub fn to_amqp(value: &HeaderValue) -> AMQPValue {
    match value {
        HeaderValue::Bool(b) => AMQPValue::Boolean(*b),
        HeaderValue::Int(i) => AMQPValue::LongLongInt(*i),
        HeaderValue::Float(f) => AMQPValue::Double(*f),
        HeaderValue::Text(s) => AMQPValue::LongString(LongString::from(s.as_str())),
        HeaderValue::Bytes(b) => AMQPValue::ByteArray(ByteArray::from(b.clone())),
    }
}

/// Converts a header value from the wire.
///
/// Every integer width maps to [`HeaderValue::Int`]; nested tables, arrays
/// and decimals have no counterpart and yield `None`.
pub fn from_amqp(value: &AMQPValue) -> Option<HeaderValue> {
    let converted = match value {
        AMQPValue::Boolean(b) => HeaderValue::Bool(*b),
        AMQPValue::ShortShortInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::ShortShortUInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::ShortInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::ShortUInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::LongInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::LongUInt(i) => HeaderValue::Int(i64::from(*i)),
        AMQPValue::LongLongInt(i) => HeaderValue::Int(*i),
        AMQPValue::Timestamp(t) => HeaderValue::Int(i64::try_from(*t).ok()?),
        AMQPValue::Float(f) => HeaderValue::Float(f64::from(*f)),
        AMQPValue::Double(f) => HeaderValue::Float(*f),
        AMQPValue::ShortString(s) => HeaderValue::Text(s.as_str().to_string()),
        AMQPValue::LongString(s) => match std::str::from_utf8(s.as_bytes()) {
            Ok(text) => HeaderValue::Text(text.to_string()),
            Err(_) => HeaderValue::Bytes(s.as_bytes().to_vec()),
        },
        AMQPValue::ByteArray(b) => HeaderValue::Bytes(b.as_slice().to_vec()),
        _ => return None,
    };
    Some(converted)
}

/// Builds a header table.
pub fn to_field_table(headers: &BTreeMap<String, HeaderValue>) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in headers {
        table.insert(ShortString::from(key.as_str()), to_amqp(value));
    }
    table
}

/// Reads a header table, dropping values with no scalar counterpart.
pub fn from_field_table(table: &FieldTable) -> BTreeMap<String, HeaderValue> {
    table
        .inner()
        .iter()
        .filter_map(|(key, value)| Some((key.as_str().to_string(), from_amqp(value)?)))
        .collect()
}

/// Properties for publishing `envelope`.
pub(crate) fn properties(envelope: &Envelope, delivery_mode: u8) -> BasicProperties {
    let mut properties = BasicProperties::default()
        .with_content_type(ShortString::from("application/json"))
        .with_delivery_mode(delivery_mode)
        .with_headers(to_field_table(&envelope.wire_headers()));
    if let Some(id) = &envelope.correlation_id {
        properties = properties.with_correlation_id(ShortString::from(id.as_str()));
    }
    if let Some(reply_to) = &envelope.reply_to {
        properties = properties.with_reply_to(ShortString::from(reply_to.as_str()));
    }
    properties
}

/// Rebuilds an envelope from a received message.
pub(crate) fn envelope(properties: &BasicProperties, data: Vec<u8>) -> Envelope {
    let headers = properties
        .headers()
        .as_ref()
        .map(from_field_table)
        .unwrap_or_default();
    Envelope::from_parts(
        properties
            .correlation_id()
            .as_ref()
            .map(|id| CorrelationId::from(id.as_str())),
        properties
            .reply_to()
            .as_ref()
            .map(|reply_to| reply_to.as_str().to_string()),
        headers,
        data,
    )
}
