//! The object-stream seam between the connection engine and a transport.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::codec::PlainCodec;

/// Moves one JSON object at a time over a byte channel.
///
/// Each stream item and each sink element is the serialized bytes of exactly
/// one object; a framing implementation guarantees send-one/receive-one
/// atomicity. The stream ends cleanly on EOF, closing the sink is
/// idempotent, and any read error is fatal to the connection built on top.
pub trait ObjectStream:
    Stream<Item = io::Result<BytesMut>> + Sink<Bytes, Error = io::Error> + Send + Unpin
{
}

impl<T> ObjectStream for T where
    T: Stream<Item = io::Result<BytesMut>> + Sink<Bytes, Error = io::Error> + Send + Unpin
{
}

/// An [`ObjectStream`] over any byte transport, framed by one of the
/// [`codec`](crate::codec) types.
#[derive(Debug)]
pub struct BufferedStream<T, C> {
    inner: Framed<T, C>,
}

impl<T, C> BufferedStream<T, C>
where
    T: AsyncRead + AsyncWrite + Unpin,
    C: Decoder<Item = BytesMut, Error = io::Error> + Encoder<Bytes, Error = io::Error>,
{
    /// Wraps `io` with the given framing codec.
    pub fn new(io: T, codec: C) -> Self {
        Self {
            inner: Framed::new(io, codec),
        }
    }
}

impl<T> BufferedStream<T, PlainCodec>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps `io` with plain newline-separated framing.
    pub fn plain(io: T) -> Self {
        Self::new(io, PlainCodec)
    }
}

impl<T, C> Stream for BufferedStream<T, C>
where
    T: AsyncRead + AsyncWrite + Unpin,
    C: Decoder<Item = BytesMut, Error = io::Error> + Unpin,
{
    type Item = io::Result<BytesMut>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<T, C> Sink<Bytes> for BufferedStream<T, C>
where
    T: AsyncRead + AsyncWrite + Unpin,
    C: Decoder<Item = BytesMut, Error = io::Error> + Encoder<Bytes, Error = io::Error> + Unpin,
{
    type Error = io::Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_ready(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> io::Result<()> {
        Pin::new(&mut self.inner).start_send(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{HeaderCodec, VarintCodec};
    use futures::{SinkExt, StreamExt};

    async fn send_and_receive<C>(codec_a: C, codec_b: C)
    where
        C: Decoder<Item = BytesMut, Error = io::Error>
            + Encoder<Bytes, Error = io::Error>
            + Unpin,
    {
        let (a, b) = tokio::io::duplex(256);
        let mut writer = BufferedStream::new(a, codec_a);
        let mut reader = BufferedStream::new(b, codec_b);

        writer.send(Bytes::from_static(br#"{"foo":"bar"}"#)).await.unwrap();
        let frame = reader.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], br#"{"foo":"bar"}"#);
    }

    #[tokio::test]
    async fn test_send_one_receive_one() {
        send_and_receive(VarintCodec, VarintCodec).await;
        send_and_receive(HeaderCodec::new(), HeaderCodec::new()).await;
        send_and_receive(PlainCodec, PlainCodec).await;
    }

    #[tokio::test]
    async fn test_read_after_peer_close_is_eof() {
        let (a, b) = tokio::io::duplex(256);
        let writer = BufferedStream::new(a, VarintCodec);
        let mut reader = BufferedStream::new(b, VarintCodec);
        drop(writer);
        assert!(reader.next().await.is_none());
    }
}
