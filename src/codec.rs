//! Length-prefixed framing for the packet stream.
//!
//! Every frame on the wire is `varint(length)` followed by `length` payload
//! bytes. [`VarIntFrameCodec`] splits an inbound byte stream into payloads
//! and prefixes outbound payloads with their length.
//!
//! Inbound length headers are limited to three bytes, which caps payloads at
//! [`MAX_FRAME_LENGTH`]. Wider headers are treated as a corrupted stream.
//!
//! # Error Handling
//!
//! Failures are reported as [`CodecError`], each carrying a default
//! [`RecoveryPolicy`]:
//!
//! - [`RecoveryPolicy::Drop`]: discard the frame and continue.
//! - [`RecoveryPolicy::Disconnect`]: terminate the connection.

use std::sync::Once;

use bytes::{Buf, Bytes, BytesMut};
use log::warn;
use tokio_util::codec::{Decoder, Encoder};

use crate::varint::{put_varint, varint_size};

pub mod error;
pub mod recovery;

pub use error::{CodecError, EofError, FramingError, ProtocolViolation};
pub use recovery::RecoveryPolicy;

/// Widest length header accepted on decode.
pub const MAX_HEADER_LENGTH: usize = 3;

/// Largest payload whose length fits a [`MAX_HEADER_LENGTH`] header.
pub const MAX_FRAME_LENGTH: usize = (1 << (7 * MAX_HEADER_LENGTH)) - 1;

static COPY_FALLBACK_WARNING: Once = Once::new();
static OVERSIZED_ENCODE_WARNING: Once = Once::new();

/// Frame codec using a varint length prefix.
///
/// Decoding is resumable: partial headers and payloads are left in the
/// buffer until enough bytes arrive.
///
/// # Examples
///
/// ```
/// use bytes::{Bytes, BytesMut};
/// use packetwire::codec::VarIntFrameCodec;
/// use tokio_util::codec::{Decoder, Encoder};
///
/// let mut codec = VarIntFrameCodec::default();
/// let mut buf = BytesMut::new();
/// codec
///     .encode(Bytes::from_static(b"hello"), &mut buf)
///     .expect("encode frame");
/// assert_eq!(&buf[..], b"\x05hello");
///
/// let frame = codec.decode(&mut buf).expect("decode frame");
/// assert_eq!(frame.as_deref(), Some(&b"hello"[..]));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct VarIntFrameCodec {
    zero_copy: bool,
}

impl Default for VarIntFrameCodec {
    fn default() -> Self { Self { zero_copy: true } }
}

impl VarIntFrameCodec {
    /// Create a codec, choosing whether decoded frames share the read buffer.
    ///
    /// With `zero_copy` disabled each frame is copied into its own
    /// allocation, releasing the read buffer sooner at the cost of a copy.
    #[must_use]
    pub const fn new(zero_copy: bool) -> Self { Self { zero_copy } }

    /// Whether decoded frames are views into the read buffer.
    #[must_use]
    pub const fn zero_copy(&self) -> bool { self.zero_copy }

    fn extract(&self, src: &mut BytesMut, len: usize) -> Bytes {
        if self.zero_copy {
            return src.split_to(len).freeze();
        }
        COPY_FALLBACK_WARNING.call_once(|| {
            warn!("zero-copy frames disabled; copying each inbound frame");
        });
        let frame = Bytes::copy_from_slice(&src[..len]);
        src.advance(len);
        frame
    }
}

/// Locate the length header at the start of `src`.
///
/// Returns `Ok(None)` when more bytes are needed; nothing is consumed.
fn peek_header(src: &[u8]) -> Result<Option<(usize, usize)>, FramingError> {
    let mut length = 0usize;
    for (i, byte) in src.iter().take(MAX_HEADER_LENGTH).enumerate() {
        length |= usize::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((i + 1, length)));
        }
    }
    if src.len() >= MAX_HEADER_LENGTH {
        return Err(FramingError::CorruptedFrame {
            header_len: MAX_HEADER_LENGTH,
        });
    }
    Ok(None)
}

impl Decoder for VarIntFrameCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((header_len, length)) = peek_header(src)? else {
            return Ok(None);
        };
        let total = header_len + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(header_len);
        Ok(Some(self.extract(src, length)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => Err(build_eof_error(src).into()),
        }
    }
}

/// Describe where in a frame the stream ended.
fn build_eof_error(src: &BytesMut) -> EofError {
    match peek_header(src) {
        Ok(Some((header_len, expected))) => EofError::MidFrame {
            bytes_received: src.len() - header_len,
            expected,
        },
        _ => EofError::MidHeader {
            bytes_received: src.len(),
        },
    }
}

impl Encoder<Bytes> for VarIntFrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = u32::try_from(item.len()).map_err(|_| FramingError::OversizedFrame {
            size: item.len(),
            max: u32::MAX as usize,
        })?;
        if item.len() > MAX_FRAME_LENGTH {
            OVERSIZED_ENCODE_WARNING.call_once(|| {
                warn!(
                    "encoding frame wider than peers accept: len={len}, max={MAX_FRAME_LENGTH}"
                );
            });
        }
        dst.reserve(varint_size(len) + item.len());
        put_varint(dst, len);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
