use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::id::Id;
use crate::JSONRPC_VERSION;

/// A non-standard top-level member of a request object.
///
/// Some deployments carry extra keys (a `sessionId`, say) next to the four
/// standard ones; they are decoded in document order and re-emitted after
/// the standard keys on encode.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtraField {
    /// Top-level key.
    pub name: String,
    /// Decoded value.
    pub value: Value,
}

/// A JSON-RPC 2.0 request or notification.
///
/// A notification is a request without an `id` member on the wire; the
/// `notif` flag is authoritative for that, so an id of `0` or `""` on a
/// non-notification is emitted as usual. `params` is preserved verbatim,
/// with `Some(null)` distinct from `None`.
#[derive(Clone, Debug, Default)]
pub struct Request {
    /// Name of the method to invoke.
    pub method: String,
    /// Parameter payload, verbatim.
    pub params: Option<Box<RawValue>>,
    /// Request id; meaningless when `notif` is set.
    pub id: Id,
    /// True when this request is a notification.
    pub notif: bool,
    /// Top-level members other than `jsonrpc`, `id`, `method`, `params`.
    pub extra_fields: Vec<ExtraField>,
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
            && crate::raw::eq(self.params.as_deref(), other.params.as_deref())
            && self.id == other.id
            && self.notif == other.notif
            && self.extra_fields == other.extra_fields
    }
}

impl Serialize for Request {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("method", &self.method)?;
        if let Some(params) = &self.params {
            map.serialize_entry("params", params)?;
        }
        if !self.notif {
            map.serialize_entry("id", &self.id)?;
        }
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        for field in &self.extra_fields {
            map.serialize_entry(&field.name, &field.value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Request {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RequestVisitor;

        impl<'de> Visitor<'de> for RequestVisitor {
            type Value = Request;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON-RPC 2.0 request object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Request, A::Error> {
                let mut req = Request::default();
                // A typed id cannot record "the key was absent", so the
                // notification flag is derived from key presence here.
                let mut has_id = false;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "jsonrpc" => {
                            map.next_value::<de::IgnoredAny>()?;
                        }
                        "method" => req.method = map.next_value()?,
                        "params" => req.params = Some(map.next_value()?),
                        "id" => {
                            has_id = true;
                            req.id = map.next_value()?;
                        }
                        _ => req.extra_fields.push(ExtraField {
                            name: key,
                            value: map.next_value()?,
                        }),
                    }
                }
                req.notif = !has_id;
                Ok(req)
            }
        }

        deserializer.deserialize_map(RequestVisitor)
    }
}
