//! Framing codecs that carve a byte stream into JSON objects.
//!
//! Each codec implements the `tokio-util` [`Encoder`]/[`Decoder`] pair over
//! the serialized bytes of one object per frame. Framing errors are
//! unrecoverable: once a frame boundary is lost the stream cannot be
//! re-synchronized, so the connection tears down.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::IgnoredAny;
use tokio_util::codec::{Decoder, Encoder};

fn invalid_data<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Frames each object with its byte length as an unsigned LEB128 varint.
#[derive(Clone, Copy, Debug, Default)]
pub struct VarintCodec;

impl Encoder<Bytes> for VarintCodec {
    type Error = io::Error;

    fn encode(&mut self, obj: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        let mut len = obj.len() as u64;
        loop {
            let mut byte = (len & 0x7f) as u8;
            len >>= 7;
            if len != 0 {
                byte |= 0x80;
            }
            dst.put_u8(byte);
            if len == 0 {
                break;
            }
        }
        dst.extend_from_slice(&obj);
        Ok(())
    }
}

impl Decoder for VarintCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        let mut len: u64 = 0;
        let mut shift = 0u32;
        for (i, &byte) in src.iter().enumerate() {
            if shift >= 64 {
                return Err(invalid_data("length varint too long"));
            }
            len |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                let header = i + 1;
                let len = len as usize;
                if src.len() - header < len {
                    src.reserve(header + len - src.len());
                    return Ok(None);
                }
                src.advance(header);
                return Ok(Some(src.split_to(len)));
            }
            shift += 7;
        }
        Ok(None)
    }
}

#[derive(Clone, Copy, Debug)]
enum HeaderState {
    Head,
    Body(usize),
}

/// Frames each object with an HTTP-style header block, as used by the
/// Language Server Protocol and VS Code.
///
/// The writer emits `Content-Length` and `Content-Type` headers. The reader
/// requires a `Content-Length` header and CRLF line endings, and ignores any
/// other header.
#[derive(Clone, Debug)]
pub struct HeaderCodec {
    state: HeaderState,
}

impl HeaderCodec {
    pub fn new() -> Self {
        Self {
            state: HeaderState::Head,
        }
    }

    /// Scans for the end of the header block, validating line endings as
    /// they arrive. Returns the byte length of the block including the
    /// terminating blank line, or `None` when more input is needed.
    fn find_head_end(src: &[u8]) -> io::Result<Option<usize>> {
        for i in 0..src.len() {
            if src[i] != b'\n' {
                continue;
            }
            if i == 0 || src[i - 1] != b'\r' {
                return Err(invalid_data(r"line endings must be \r\n"));
            }
            // A blank line ends the block.
            if i == 1 || (src[i - 2] == b'\n' && src[i - 3] == b'\r') {
                return Ok(Some(i + 1));
            }
        }
        Ok(None)
    }

    fn parse_content_length(head: &[u8]) -> io::Result<usize> {
        let text = std::str::from_utf8(head).map_err(invalid_data)?;
        let mut content_length = None;
        for line in text.split("\r\n") {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.eq_ignore_ascii_case("content-length") {
                content_length = Some(value.trim().parse::<usize>().map_err(invalid_data)?);
            }
        }
        match content_length {
            None | Some(0) => Err(invalid_data("missing or zero Content-Length header")),
            Some(n) => Ok(n),
        }
    }
}

impl Default for HeaderCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<Bytes> for HeaderCodec {
    type Error = io::Error;

    fn encode(&mut self, obj: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        dst.extend_from_slice(format!("Content-Length: {}\r\n", obj.len()).as_bytes());
        dst.extend_from_slice(b"Content-Type: application/vscode-jsonrpc; charset=utf8\r\n\r\n");
        dst.extend_from_slice(&obj);
        Ok(())
    }
}

impl Decoder for HeaderCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        loop {
            match self.state {
                HeaderState::Head => {
                    let Some(end) = Self::find_head_end(src)? else {
                        return Ok(None);
                    };
                    let head = src.split_to(end);
                    self.state = HeaderState::Body(Self::parse_content_length(&head)?);
                }
                HeaderState::Body(len) => {
                    if src.len() < len {
                        src.reserve(len - src.len());
                        return Ok(None);
                    }
                    self.state = HeaderState::Head;
                    return Ok(Some(src.split_to(len)));
                }
            }
        }
    }
}

/// Plain framing: objects separated by nothing but JSON's own syntax.
///
/// The reader recovers one object at a time with a streaming parse, so any
/// whitespace between objects is tolerated. The writer emits each object
/// followed by a newline, which keeps the stream readable and lets a plain
/// reader on the other side resynchronize per object.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainCodec;

impl Encoder<Bytes> for PlainCodec {
    type Error = io::Error;

    fn encode(&mut self, obj: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        dst.extend_from_slice(&obj);
        dst.put_u8(b'\n');
        Ok(())
    }
}

impl Decoder for PlainCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        let end = {
            let mut objects = serde_json::Deserializer::from_slice(src).into_iter::<IgnoredAny>();
            match objects.next() {
                None => return Ok(None),
                Some(Ok(IgnoredAny)) => objects.byte_offset(),
                Some(Err(err)) if err.is_eof() => return Ok(None),
                Some(Err(err)) => return Err(invalid_data(err)),
            }
        };
        Ok(Some(src.split_to(end)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        // Trailing whitespace (our own writer leaves a newline) is not a
        // truncated object.
        if src.iter().all(u8::is_ascii_whitespace) {
            src.clear();
            return Ok(None);
        }
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream ended mid-object",
        ))
    }
}
