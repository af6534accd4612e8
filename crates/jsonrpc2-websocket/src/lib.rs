//! WebSocket object stream for the `jsonrpc2` crate.
//!
//! Wraps a `tokio-tungstenite` WebSocket so that each JSON-RPC object
//! travels as one message: binary frames on send, binary or text accepted
//! on receive. Control frames are handled transparently.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Sink, Stream};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// An object stream over an established WebSocket.
///
/// Works with any message-level WebSocket, typically a
/// `tokio_tungstenite::WebSocketStream` from either side of the handshake.
#[derive(Debug)]
pub struct WebSocketObjectStream<S> {
    inner: S,
}

impl<S> WebSocketObjectStream<S>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Returns the wrapped WebSocket.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Maps a WebSocket error onto the io error surface of the object-stream
/// contract.
///
/// A peer that drops the TCP connection without a closing handshake is
/// reported by tungstenite as a protocol error; that case is normalized to
/// a plain unexpected-EOF so it reads as a disconnect rather than a noisy
/// protocol failure.
fn ws_err_to_io(err: WsError) -> io::Error {
    match err {
        WsError::Io(err) => err,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected EOF")
        }
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            io::Error::new(io::ErrorKind::NotConnected, err.to_string())
        }
        other => io::Error::other(other),
    }
}

impl<S> Stream for WebSocketObjectStream<S>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    type Item = io::Result<BytesMut>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            return match futures::ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(Message::Binary(data))) => {
                    Poll::Ready(Some(Ok(BytesMut::from(&data[..]))))
                }
                Some(Ok(Message::Text(text))) => {
                    Poll::Ready(Some(Ok(BytesMut::from(text.as_bytes()))))
                }
                // Control frames are not objects; keep reading.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => Poll::Ready(None),
                Some(Err(WsError::ConnectionClosed)) => Poll::Ready(None),
                Some(Err(err)) => Poll::Ready(Some(Err(ws_err_to_io(err)))),
            };
        }
    }
}

impl<S> Sink<Bytes> for WebSocketObjectStream<S>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    type Error = io::Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_ready(cx).map_err(ws_err_to_io)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> io::Result<()> {
        Pin::new(&mut self.inner)
            .start_send(Message::Binary(item.to_vec()))
            .map_err(ws_err_to_io)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx).map_err(ws_err_to_io)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match futures::ready!(Pin::new(&mut self.inner).poll_close(cx)) {
            // Closing an already-closed socket stays idempotent.
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                Poll::Ready(Ok(()))
            }
            Err(err) => Poll::Ready(Err(ws_err_to_io(err))),
        }
    }
}
