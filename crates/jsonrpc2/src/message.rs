use serde::de;
use serde_json::{Map, Value};

use crate::request::Request;
use crate::response::Response;

/// One inbound JSON object, classified as a request or a response.
///
/// Classification is by key presence alone: a `method` key marks a request,
/// a `result` or `error` key marks a response. An object matching both or
/// neither is rejected before any typed decoding happens.
#[derive(Debug)]
pub(crate) enum AnyMessage {
    Request(Request),
    Response(Response),
}

impl AnyMessage {
    pub(crate) fn from_slice(data: &[u8]) -> serde_json::Result<Self> {
        let probe: Map<String, Value> = serde_json::from_slice(data)?;
        let is_request = probe.contains_key("method");
        let is_response = probe.contains_key("result") || probe.contains_key("error");
        match (is_request, is_response) {
            (true, false) => serde_json::from_slice(data).map(AnyMessage::Request),
            (false, true) => serde_json::from_slice(data).map(AnyMessage::Response),
            _ => Err(de::Error::custom("invalid message")),
        }
    }
}
