//! Variable-length integer encoding.
//!
//! Values are written seven bits per byte, least-significant group first,
//! with the high bit of each byte flagging that another byte follows. The
//! full `u32` range fits in at most [`MAX_VARINT_LEN`] bytes.

use bytes::{Buf, BufMut};
use thiserror::Error;

/// Maximum number of bytes a `u32` varint may occupy.
pub const MAX_VARINT_LEN: usize = 5;

const CONTINUATION: u8 = 0x80;
const SEGMENT: u8 = 0x7f;

/// Errors raised while decoding a varint.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum VarIntError {
    /// More than [`MAX_VARINT_LEN`] bytes were read without a terminating byte.
    #[error("varint exceeds {MAX_VARINT_LEN} bytes")]
    Malformed,
    /// The buffer ended before the terminating byte.
    #[error("varint truncated after {read} bytes")]
    Truncated {
        /// Bytes consumed before the buffer ran out.
        read: usize,
    },
}

/// Return the number of bytes `value` occupies once encoded.
///
/// # Examples
///
/// ```
/// use packetwire::varint::varint_size;
///
/// assert_eq!(varint_size(0), 1);
/// assert_eq!(varint_size(127), 1);
/// assert_eq!(varint_size(128), 2);
/// assert_eq!(varint_size(u32::MAX), 5);
/// ```
#[must_use]
pub const fn varint_size(value: u32) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0x0fff_ffff => 4,
        _ => 5,
    }
}

/// Append the varint encoding of `value` to `dst`.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use packetwire::varint::put_varint;
///
/// let mut buf = BytesMut::new();
/// put_varint(&mut buf, 300);
/// assert_eq!(&buf[..], &[0xac, 0x02]);
/// ```
pub fn put_varint(dst: &mut impl BufMut, mut value: u32) {
    loop {
        #[expect(clippy::cast_possible_truncation, reason = "masked to seven bits")]
        let segment = (value & u32::from(SEGMENT)) as u8;
        value >>= 7;
        if value == 0 {
            dst.put_u8(segment);
            return;
        }
        dst.put_u8(segment | CONTINUATION);
    }
}

/// Read a varint from `src`, advancing past the consumed bytes.
///
/// # Errors
///
/// Returns [`VarIntError::Malformed`] when no terminating byte appears within
/// [`MAX_VARINT_LEN`] bytes and [`VarIntError::Truncated`] when `src` runs out
/// first.
///
/// # Examples
///
/// ```
/// use packetwire::varint::{VarIntError, read_varint};
///
/// let mut src: &[u8] = &[0xac, 0x02, 0xff];
/// assert_eq!(read_varint(&mut src), Ok(300));
/// assert_eq!(src, &[0xff]);
///
/// let mut corrupt: &[u8] = &[0xff; 6];
/// assert_eq!(read_varint(&mut corrupt), Err(VarIntError::Malformed));
/// ```
pub fn read_varint(src: &mut impl Buf) -> Result<u32, VarIntError> {
    let mut value = 0u32;
    for read in 0..MAX_VARINT_LEN {
        if !src.has_remaining() {
            return Err(VarIntError::Truncated { read });
        }
        let byte = src.get_u8();
        value |= u32::from(byte & SEGMENT) << (7 * read);
        if byte & CONTINUATION == 0 {
            return Ok(value);
        }
    }
    Err(VarIntError::Malformed)
}

/// Inspect the start of `src` for a varint without consuming anything.
///
/// Returns `Ok(None)` if `src` ends before the terminating byte, otherwise
/// the decoded value and the number of bytes it occupies.
///
/// # Errors
///
/// Returns [`VarIntError::Malformed`] when the first [`MAX_VARINT_LEN`] bytes
/// all carry the continuation flag.
///
/// # Examples
///
/// ```
/// use packetwire::varint::peek_varint;
///
/// assert_eq!(peek_varint(&[0xac, 0x02, 0x00]), Ok(Some((300, 2))));
/// assert_eq!(peek_varint(&[0xac]), Ok(None));
/// ```
pub fn peek_varint(src: &[u8]) -> Result<Option<(u32, usize)>, VarIntError> {
    let mut cursor = src;
    match read_varint(&mut cursor) {
        Ok(value) => Ok(Some((value, src.len() - cursor.len()))),
        Err(VarIntError::Truncated { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::zero(0, &[0x00])]
    #[case::one_byte_max(127, &[0x7f])]
    #[case::two_bytes(128, &[0x80, 0x01])]
    #[case::three_hundred(300, &[0xac, 0x02])]
    #[case::frame_ceiling(2_097_151, &[0xff, 0xff, 0x7f])]
    #[case::i32_max(2_147_483_647, &[0xff, 0xff, 0xff, 0xff, 0x07])]
    #[case::u32_max(u32::MAX, &[0xff, 0xff, 0xff, 0xff, 0x0f])]
    fn encodes_known_values(#[case] value: u32, #[case] expected: &[u8]) {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, value);
        assert_eq!(&buf[..], expected);
        assert_eq!(varint_size(value), expected.len());
    }

    #[test]
    fn rejects_six_continuation_bytes() {
        let mut src: &[u8] = &[0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert_eq!(read_varint(&mut src), Err(VarIntError::Malformed));
        assert_eq!(src.len(), 1, "decoder must stop after five bytes");
    }

    #[test]
    fn truncated_input_reports_bytes_read() {
        let mut src: &[u8] = &[0x80, 0x80];
        assert_eq!(read_varint(&mut src), Err(VarIntError::Truncated { read: 2 }));
    }

    #[test]
    fn peek_does_not_consume() {
        let src = [0x80, 0x01, 0x42];
        assert_eq!(peek_varint(&src), Ok(Some((128, 2))));
        assert_eq!(peek_varint(&src[..1]), Ok(None));
        assert_eq!(peek_varint(&[0xff; 5]), Err(VarIntError::Malformed));
    }

    proptest! {
        #[test]
        fn round_trips_non_negative_i32(value in 0u32..=0x7fff_ffff) {
            let mut buf = BytesMut::new();
            put_varint(&mut buf, value);
            prop_assert_eq!(buf.len(), varint_size(value));
            let mut src = buf.freeze();
            prop_assert_eq!(read_varint(&mut src), Ok(value));
            prop_assert!(src.is_empty());
        }
    }
}
