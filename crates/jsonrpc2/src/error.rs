use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::{to_raw_value, RawValue};

use crate::id::Id;

/// Standard JSON-RPC 2.0 error codes.
pub mod codes {
    /// Invalid JSON was received by the peer.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// A JSON-RPC 2.0 error object, carried in the `error` member of a response.
///
/// The `data` slot distinguishes "absent" from "present and `null`": use
/// [`Error::set_data`] to attach any serializable value, including `null`,
/// `0`, `""`, and `false`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Error {
    /// Error code.
    pub code: i32,
    /// Short description of the error.
    pub message: String,
    /// Additional data, preserved verbatim.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::raw::present"
    )]
    pub data: Option<Box<RawValue>>,
}

impl Error {
    /// Creates an error with the given code and message and no data.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Serializes `v` into the `data` slot.
    ///
    /// Any JSON-serializable value is accepted; the slot is considered
    /// present afterwards even when `v` serializes to `null`.
    pub fn set_data<T: Serialize + ?Sized>(&mut self, v: &T) -> serde_json::Result<()> {
        self.data = Some(to_raw_value(v)?);
        Ok(())
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.message == other.message
            && crate::raw::eq(self.data.as_deref(), other.data.as_deref())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "jsonrpc2: code {}: {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

/// Errors surfaced by a [`Conn`](crate::Conn) and its call handles.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// The connection is closed. Stable sentinel: every pending and future
    /// operation on a closed connection fails with this variant.
    #[error("jsonrpc2: connection is closed")]
    Closed,

    /// The remote peer answered the call with a JSON-RPC error object.
    #[error(transparent)]
    Rpc(#[from] Error),

    /// Serializing an outbound message or decoding a result failed.
    #[error("jsonrpc2: {0}")]
    Json(#[from] serde_json::Error),

    /// The underlying object stream failed.
    #[error("jsonrpc2: {0}")]
    Io(#[from] std::io::Error),

    /// A caller-chosen id collided with a call already in flight.
    #[error("jsonrpc2: call id {0} is already in flight")]
    DuplicateId(Id),
}

/// Result alias for connection operations.
pub type ConnResult<T> = Result<T, ConnError>;
