//! Frame decoding
//!
//! A feed frame is either a single event object or an array of them. Each
//! element is decoded independently so one bad element never costs the rest.

use super::types::{FeedEvent, RawEvent, TickError};
use serde_json::Value;

/// Decode a text frame into its events
///
/// The outer error means the whole frame was unusable; inner errors belong to
/// individual elements.
pub fn decode_frame(text: &str) -> Result<Vec<Result<FeedEvent, TickError>>, TickError> {
    let value: Value = serde_json::from_str(text)?;

    let elements = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => {
            return Err(TickError::Json(serde::de::Error::custom(
                "frame is neither an object nor an array",
            )))
        }
    };

    Ok(elements.into_iter().map(decode_event).collect())
}

fn decode_event(value: Value) -> Result<FeedEvent, TickError> {
    let raw: RawEvent = serde_json::from_value(value)?;
    FeedEvent::from_raw(raw)
}
