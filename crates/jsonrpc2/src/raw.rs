//! Helpers for opaque `RawValue` payload slots.
//!
//! Payload members (`params`, `result`, error `data`) are carried as
//! `Option<Box<RawValue>>` so that a member holding the JSON value `null`
//! stays distinguishable from a member that is absent.

use serde::{Deserialize, Deserializer};
use serde_json::value::RawValue;

/// Deserializes a payload member as present even when its value is `null`.
///
/// The stock `Option` impl maps JSON `null` to `None`; this keeps the raw
/// bytes instead, so absence is signaled only by the key being missing
/// (combined with `#[serde(default)]`).
pub(crate) fn present<'de, D>(deserializer: D) -> Result<Option<Box<RawValue>>, D::Error>
where
    D: Deserializer<'de>,
{
    Box::<RawValue>::deserialize(deserializer).map(Some)
}

/// The raw JSON `null` value.
pub(crate) fn null() -> serde_json::Result<Box<RawValue>> {
    RawValue::from_string("null".to_owned())
}

/// Compares two optional raw payloads by their serialized text.
pub(crate) fn eq(a: Option<&RawValue>, b: Option<&RawValue>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.get() == b.get(),
        (None, None) => true,
        _ => false,
    }
}
