//! JSON encoding and decoding for the support-chat endpoints.
//!
//! The backend wraps responses inconsistently (bare arrays, `data`
//! envelopes, paginated envelopes). This module is the single place that
//! knows those shapes; everything past it works with [`RawMessage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{RawMessage, SendRequest};

/// Maximum nesting of `data` envelopes that is unwrapped.
const MAX_ENVELOPE_DEPTH: usize = 2;

/// Error type for codec operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The payload is not valid JSON or could not be serialized.
    #[error("json error: {0}")]
    Json(String),
    /// The payload is JSON but not one of the known envelope shapes.
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
    /// The payload held a single record that could not be parsed.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// The `{ "data": ... }` envelope the backend (and the stub server) emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    /// Wrapped payload.
    pub data: T,
}

/// Records decoded from a history response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPage {
    /// Records that parsed successfully, in response order.
    pub records: Vec<RawMessage>,
    /// Number of array items that were not valid records.
    pub skipped: usize,
}

/// Decodes a history response body.
///
/// Accepted shapes: a bare array, `{"data": [...]}`,
/// `{"data": {"data": [...]}}` and `{"messages": [...]}`. Items that are
/// not valid records are skipped and counted, so one bad record never
/// hides the rest of the conversation.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the body is not JSON, or
/// [`CodecError::UnexpectedShape`] if no record array can be found.
pub fn decode_history(bytes: &[u8]) -> Result<HistoryPage, CodecError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| CodecError::Json(e.to_string()))?;
    let shape = shape_name(&value);
    let items =
        history_items(value, 0).ok_or_else(|| CodecError::UnexpectedShape(shape.to_string()))?;

    let mut page = HistoryPage::default();
    for item in items {
        match serde_json::from_value::<RawMessage>(item) {
            Ok(record) => page.records.push(record),
            Err(_) => page.skipped += 1,
        }
    }
    Ok(page)
}

/// Decodes the response of a send call.
///
/// Accepts a bare record, `{"data": record}`, or `{"message": record}`
/// when `message` is itself an object.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the body is not JSON, or
/// [`CodecError::InvalidRecord`] if no record can be extracted.
pub fn decode_sent(bytes: &[u8]) -> Result<RawMessage, CodecError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| CodecError::Json(e.to_string()))?;
    let record = match value {
        Value::Object(mut map) => {
            if matches!(map.get("data"), Some(Value::Object(_))) {
                map.remove("data").unwrap_or_default()
            } else if matches!(map.get("message"), Some(Value::Object(_))) {
                map.remove("message").unwrap_or_default()
            } else {
                Value::Object(map)
            }
        }
        other => other,
    };
    serde_json::from_value(record).map_err(|e| CodecError::InvalidRecord(e.to_string()))
}

/// Encodes the body of a send call.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_send_request(request: &SendRequest) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(request).map_err(|e| CodecError::Json(e.to_string()))
}

/// Decodes the body of a send call.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the body is not a `{ "message": ... }`
/// object.
pub fn decode_send_request(bytes: &[u8]) -> Result<SendRequest, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Json(e.to_string()))
}

fn history_items(value: Value, depth: usize) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) if depth < MAX_ENVELOPE_DEPTH => {
            if let Some(data) = map.remove("data") {
                return history_items(data, depth + 1);
            }
            match map.remove("messages") {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }
        }
        _ => None,
    }
}

const fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
