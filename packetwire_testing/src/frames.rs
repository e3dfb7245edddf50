//! Helpers for exercising the frame codec outside a socket.

use bytes::{Bytes, BytesMut};
use packetwire::codec::{CodecError, VarIntFrameCodec};
use tokio_util::codec::{Decoder, Encoder};

/// Encode `payloads` back to back into one buffer.
///
/// # Errors
///
/// Returns any [`CodecError`] raised by the encoder.
pub fn encode_frames<I>(payloads: I) -> Result<BytesMut, CodecError>
where
    I: IntoIterator<Item = Bytes>,
{
    let mut codec = VarIntFrameCodec::default();
    let mut buf = BytesMut::new();
    for payload in payloads {
        codec.encode(payload, &mut buf)?;
    }
    Ok(buf)
}

/// Feed `wire` to a fresh decoder `chunk` bytes at a time, as a socket with
/// an unlucky read pattern would, and collect every frame produced.
///
/// The stream is finished with `decode_eof`, so a truncated tail surfaces as
/// [`CodecError::Eof`].
///
/// # Errors
///
/// Returns the first [`CodecError`] the decoder raises.
///
/// # Examples
///
/// ```rust
/// use bytes::Bytes;
/// use packetwire_testing::{decode_in_chunks, encode_frames};
///
/// let wire = encode_frames([Bytes::from_static(b"abc"), Bytes::from_static(b"de")])
///     .expect("encode");
/// let frames = decode_in_chunks(&wire, 1).expect("decode");
/// assert_eq!(frames, [Bytes::from_static(b"abc"), Bytes::from_static(b"de")]);
/// ```
pub fn decode_in_chunks(wire: &[u8], chunk: usize) -> Result<Vec<Bytes>, CodecError> {
    let mut codec = VarIntFrameCodec::default();
    let mut buf = BytesMut::new();
    let mut frames = Vec::new();
    for piece in wire.chunks(chunk.max(1)) {
        buf.extend_from_slice(piece);
        while let Some(frame) = codec.decode(&mut buf)? {
            frames.push(frame);
        }
    }
    while let Some(frame) = codec.decode_eof(&mut buf)? {
        frames.push(frame);
    }
    Ok(frames)
}
