//! Frame codec: 4-byte little-endian length header + JSON body.
//!
//! Two entry points share the same rules: the async [`encode`]/[`decode`]
//! pair for direct stream access, and [`FrameCodec`] implementing the
//! `tokio_util::codec` traits for use with `FramedRead`, which keeps
//! partial frames buffered across cancelled polls.

use crate::error::{ConnectionError, FrameError, ProtocolError};
use crate::message::Envelope;
use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// Maximum body size in bytes. Larger frames are a protocol violation.
pub const MAX_FRAME_BYTES: usize = 65536;

/// Length header size in bytes.
pub const LEN_HEADER_BYTES: usize = 4;

/// Serialize an envelope into one complete frame.
///
/// Fails with [`ProtocolError::FrameTooLarge`] before emitting anything if
/// the body would exceed [`MAX_FRAME_BYTES`]; a partial frame is never
/// produced.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(envelope)?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            len: body.len(),
            max: MAX_FRAME_BYTES,
        });
    }

    let mut frame = Vec::with_capacity(LEN_HEADER_BYTES + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Read one envelope from the stream.
///
/// Reads exactly 4 header bytes, then exactly the declared body length
/// (`read_exact` retries short reads). An oversized declared length fails
/// with [`ProtocolError::FrameTooLarge`] without reading the body; the
/// peer closing mid-frame fails with [`ConnectionError::PeerClosed`].
pub async fn decode<R>(stream: &mut R) -> Result<Envelope, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LEN_HEADER_BYTES];
    read_exact_or_closed(stream, &mut header).await?;

    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_BYTES,
        }
        .into());
    }

    let mut body = vec![0u8; len];
    read_exact_or_closed(stream, &mut body).await?;

    parse_body(&body)
}

/// Encode and write one envelope, flushing the stream.
pub async fn write_frame<W>(stream: &mut W, envelope: &Envelope) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(envelope).map_err(FrameError::Protocol)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_exact_or_closed<R>(stream: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    stream.read_exact(buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::Connection(ConnectionError::PeerClosed)
        } else {
            FrameError::Connection(ConnectionError::Io(e))
        }
    })?;
    Ok(())
}

fn parse_body(body: &[u8]) -> Result<Envelope, FrameError> {
    let envelope = serde_json::from_slice(body).map_err(ProtocolError::Json)?;
    Ok(envelope)
}

/// `tokio_util` codec over the same frame rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Envelope;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>, FrameError> {
        if src.len() < LEN_HEADER_BYTES {
            return Ok(None);
        }

        let mut header = [0u8; LEN_HEADER_BYTES];
        header.copy_from_slice(&src[..LEN_HEADER_BYTES]);
        let len = u32::from_le_bytes(header) as usize;

        if len > MAX_FRAME_BYTES {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: MAX_FRAME_BYTES,
            }
            .into());
        }

        if src.len() < LEN_HEADER_BYTES + len {
            src.reserve(LEN_HEADER_BYTES + len - src.len());
            return Ok(None);
        }

        src.advance(LEN_HEADER_BYTES);
        let body = src.split_to(len);
        parse_body(&body).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            // Bytes left over at EOF: the peer died mid-frame.
            None => Err(ConnectionError::PeerClosed.into()),
        }
    }
}

impl Encoder<Envelope> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), FrameError> {
        let frame = crate::codec::encode(&item).map_err(FrameError::Protocol)?;
        dst.reserve(frame.len());
        dst.put_slice(&frame);
        Ok(())
    }
}
