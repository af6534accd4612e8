//! # Bidirectional JSON-RPC 2.0
//!
//! A single connection type that acts as JSON-RPC 2.0 client and server at
//! the same time, over one full-duplex object stream.
//!
//! ## Features
//! - **Symmetric peers**: each side may call, notify, reply, and receive any
//!   of the above over the same connection
//! - **Faithful message model**: notifications vs. zero-id requests,
//!   `null` vs. absent payloads, and unknown top-level members all survive a
//!   decode/encode round trip
//! - **Pluggable framing**: varint length prefixes, LSP-style
//!   `Content-Length` headers, plain newline-separated objects, or a
//!   WebSocket (via the `jsonrpc2-websocket` crate)
//! - **Ordered dispatch**: inbound requests reach the handler one at a time
//!   in arrival order, with an async wrapper when parallelism matters more
//! - **Local cancellation**: dropping a call future frees its pending slot;
//!   no cancellation message is sent
//!
//! ## Example
//!
//! ```rust,no_run
//! use jsonrpc2::{Conn, HandlerWithError};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let socket = tokio::net::TcpStream::connect("127.0.0.1:4000").await?;
//! let stream = jsonrpc2::BufferedStream::plain(socket);
//! let conn = Conn::new(
//!     stream,
//!     HandlerWithError::new(|_conn, req| {
//!         Box::pin(async move { Ok(json!(format!("you called {}", req.method))) })
//!     }),
//! );
//!
//! let greeting: String = conn.call("sayHello", None::<&()>).await?;
//! println!("{greeting}");
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
mod conn;
mod error;
mod handler;
mod id;
mod message;
mod opts;
mod raw;
mod request;
mod response;
mod stream;

pub use conn::{Conn, ConnBuilder, PendingCall};
pub use error::{codes, ConnError, ConnResult, Error};
pub use handler::{
    AsyncHandler, Chain, Handler, HandlerFn, HandlerWithError, Middleware, NoopHandler,
};
pub use id::Id;
pub use opts::{CallOptions, Logger, MessageHook, TracingLogger};
pub use request::{ExtraField, Request};
pub use response::Response;
pub use stream::{BufferedStream, ObjectStream};

/// JSON-RPC protocol version, written into every message.
pub const JSONRPC_VERSION: &str = "2.0";
