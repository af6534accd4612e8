use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::{self, SerializeMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::Error;
use crate::id::Id;
use crate::JSONRPC_VERSION;

/// A JSON-RPC 2.0 response, correlated to a request by id.
///
/// Exactly one of `result` and `error` must be set; serializing a response
/// that violates this fails, and a wire object carrying neither does not
/// decode. A `result` of `Some(null)` is a successful null result, distinct
/// from `None`.
#[derive(Clone, Debug, Default)]
pub struct Response {
    /// Id of the request this responds to.
    pub id: Id,
    /// Result payload, verbatim.
    pub result: Option<Box<RawValue>>,
    /// Error object.
    pub error: Option<Error>,
}

impl PartialEq for Response {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && crate::raw::eq(self.result.as_deref(), other.result.as_deref())
            && self.error == other.error
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.result.is_some() && self.error.is_some() {
            return Err(ser::Error::custom(
                "response must not have both result and error set",
            ));
        }
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        match (&self.result, &self.error) {
            (Some(result), None) => map.serialize_entry("result", result)?,
            (None, Some(error)) => map.serialize_entry("error", error)?,
            _ => {
                return Err(ser::Error::custom(
                    "response must have either result or error set",
                ))
            }
        }
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResponseVisitor;

        impl<'de> Visitor<'de> for ResponseVisitor {
            type Value = Response;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON-RPC 2.0 response object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Response, A::Error> {
                // A missing id decodes as the number zero, which lets a peer
                // report errors for requests it could not parse an id from.
                let mut resp = Response::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "id" => resp.id = map.next_value()?,
                        "result" => resp.result = Some(map.next_value()?),
                        "error" => resp.error = Some(map.next_value()?),
                        _ => {
                            map.next_value::<de::IgnoredAny>()?;
                        }
                    }
                }
                if resp.result.is_none() && resp.error.is_none() {
                    return Err(de::Error::custom(
                        "response must have either result or error set",
                    ));
                }
                Ok(resp)
            }
        }

        deserializer.deserialize_map(ResponseVisitor)
    }
}
