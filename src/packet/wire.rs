//! Field readers and writers for packet bodies.
//!
//! Readers check the remaining length before touching the buffer, so a
//! truncated body surfaces as [`PacketError::Truncated`] instead of a panic.
//! Multi-byte integers use network byte order.

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::PacketError;
use crate::varint;

/// Default limit for [`read_string`] when a field has no tighter bound.
pub const DEFAULT_STRING_LIMIT: usize = i16::MAX as usize;

fn ensure(src: &Bytes, needed: usize) -> Result<(), PacketError> {
    if src.remaining() < needed {
        return Err(PacketError::Truncated {
            needed,
            remaining: src.remaining(),
        });
    }
    Ok(())
}

fn write_len(dst: &mut BytesMut, len: usize) -> Result<(), PacketError> {
    let len = u32::try_from(len).map_err(|_| PacketError::TooManyElements {
        len,
        max: u32::MAX as usize,
    })?;
    varint::put_varint(dst, len);
    Ok(())
}

/// Read a varint field.
///
/// # Errors
///
/// Returns [`PacketError::VarInt`] if the field is malformed or truncated.
pub fn read_varint(src: &mut Bytes) -> Result<u32, PacketError> {
    Ok(varint::read_varint(src)?)
}

/// Write a varint field.
pub fn write_varint(dst: &mut BytesMut, value: u32) { varint::put_varint(dst, value); }

macro_rules! fixed_width {
    ($(#[$doc:meta] $read:ident, $write:ident, $ty:ty, $get:ident, $put:ident;)*) => {
        $(
            #[$doc]
            ///
            /// # Errors
            ///
            /// Returns [`PacketError::Truncated`] if the body is too short.
            pub fn $read(src: &mut Bytes) -> Result<$ty, PacketError> {
                ensure(src, size_of::<$ty>())?;
                Ok(src.$get())
            }

            #[$doc]
            pub fn $write(dst: &mut BytesMut, value: $ty) { dst.$put(value); }
        )*
    };
}

fixed_width! {
    /// Unsigned byte.
    read_u8, write_u8, u8, get_u8, put_u8;
    /// Big-endian `u16`.
    read_u16, write_u16, u16, get_u16, put_u16;
    /// Big-endian `i32`.
    read_i32, write_i32, i32, get_i32, put_i32;
    /// Big-endian `u32`.
    read_u32, write_u32, u32, get_u32, put_u32;
    /// Big-endian `i64`.
    read_i64, write_i64, i64, get_i64, put_i64;
    /// Big-endian `u64`.
    read_u64, write_u64, u64, get_u64, put_u64;
    /// Big-endian IEEE 754 `f64`.
    read_f64, write_f64, f64, get_f64, put_f64;
}

/// Read a boolean encoded as one byte; any non-zero value is `true`.
///
/// # Errors
///
/// Returns [`PacketError::Truncated`] if the body is empty.
pub fn read_bool(src: &mut Bytes) -> Result<bool, PacketError> { Ok(read_u8(src)? != 0) }

/// Write a boolean as one byte.
pub fn write_bool(dst: &mut BytesMut, value: bool) { dst.put_u8(u8::from(value)); }

/// Read a varint-prefixed byte string without copying.
///
/// # Errors
///
/// Returns [`PacketError`] if the prefix is malformed or the body is short.
pub fn read_bytes(src: &mut Bytes) -> Result<Bytes, PacketError> {
    let len = read_varint(src)? as usize;
    ensure(src, len)?;
    Ok(src.split_to(len))
}

/// Write a varint-prefixed byte string.
///
/// # Errors
///
/// Returns [`PacketError::TooManyElements`] if `bytes` is longer than a
/// `u32` can describe.
pub fn write_bytes(dst: &mut BytesMut, bytes: &[u8]) -> Result<(), PacketError> {
    write_len(dst, bytes.len())?;
    dst.put_slice(bytes);
    Ok(())
}

/// Read a varint-prefixed UTF-8 string of at most `max` bytes.
///
/// # Errors
///
/// Returns [`PacketError::StringTooLong`] when the declared length exceeds
/// `max`, and [`PacketError::InvalidUtf8`] for malformed text.
///
/// # Examples
///
/// ```
/// use bytes::{Bytes, BytesMut};
/// use packetwire::packet::wire;
///
/// let mut buf = BytesMut::new();
/// wire::write_string(&mut buf, "hi");
/// let mut src = buf.freeze();
/// assert_eq!(wire::read_string(&mut src, 16).expect("string"), "hi");
/// ```
pub fn read_string(src: &mut Bytes, max: usize) -> Result<String, PacketError> {
    let len = read_varint(src)? as usize;
    if len > max {
        return Err(PacketError::StringTooLong { len, max });
    }
    ensure(src, len)?;
    let raw = src.split_to(len);
    Ok(std::str::from_utf8(&raw)?.to_owned())
}

/// Write a varint-prefixed UTF-8 string.
pub fn write_string(dst: &mut BytesMut, value: &str) {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "Rust strings never exceed isize::MAX and peers cap them far lower"
    )]
    varint::put_varint(dst, value.len() as u32);
    dst.put_slice(value.as_bytes());
}

/// Read a varint-counted collection, decoding each element with `read`.
///
/// # Errors
///
/// Propagates the first element error.
pub fn read_collection<T, C, F>(src: &mut Bytes, mut read: F) -> Result<C, PacketError>
where
    C: FromIterator<T>,
    F: FnMut(&mut Bytes) -> Result<T, PacketError>,
{
    let count = read_varint(src)?;
    (0..count).map(|_| read(src)).collect()
}

/// Write a varint-counted collection, encoding each element with `write`.
///
/// # Errors
///
/// Propagates the first element error.
pub fn write_collection<'a, T, I, F>(
    dst: &mut BytesMut,
    items: I,
    mut write: F,
) -> Result<(), PacketError>
where
    T: 'a,
    I: IntoIterator<Item = &'a T>,
    I::IntoIter: ExactSizeIterator,
    F: FnMut(&mut BytesMut, &T) -> Result<(), PacketError>,
{
    let items = items.into_iter();
    write_len(dst, items.len())?;
    for item in items {
        write(dst, item)?;
    }
    Ok(())
}

/// Read an `i32` array prefixed with a one-byte count.
///
/// # Errors
///
/// Returns [`PacketError::Truncated`] if the body is too short.
pub fn read_int_array(src: &mut Bytes) -> Result<Vec<i32>, PacketError> {
    let count = usize::from(read_u8(src)?);
    ensure(src, count * size_of::<i32>())?;
    Ok((0..count).map(|_| src.get_i32()).collect())
}

/// Write an `i32` array prefixed with a one-byte count.
///
/// # Errors
///
/// Returns [`PacketError::TooManyElements`] for more than 255 values.
pub fn write_int_array(dst: &mut BytesMut, values: &[i32]) -> Result<(), PacketError> {
    let count = u8::try_from(values.len()).map_err(|_| PacketError::TooManyElements {
        len: values.len(),
        max: u8::MAX.into(),
    })?;
    dst.put_u8(count);
    for value in values {
        dst.put_i32(*value);
    }
    Ok(())
}

/// Read an IPv4 address as four raw bytes.
///
/// # Errors
///
/// Returns [`PacketError::Truncated`] if fewer than four bytes remain.
pub fn read_ipv4(src: &mut Bytes) -> Result<Ipv4Addr, PacketError> {
    ensure(src, 4)?;
    let mut octets = [0u8; 4];
    src.copy_to_slice(&mut octets);
    Ok(Ipv4Addr::from(octets))
}

/// Write an IPv4 address as four raw bytes.
pub fn write_ipv4(dst: &mut BytesMut, addr: Ipv4Addr) { dst.put_slice(&addr.octets()); }

/// Enums carried on the wire as a one-byte ordinal.
pub trait WireEnum: Sized {
    /// Ordinal written for `self`.
    fn ordinal(&self) -> u8;

    /// Variant for `ordinal`, if any.
    fn from_ordinal(ordinal: u8) -> Option<Self>;
}

/// Read an enum encoded as its ordinal byte.
///
/// # Errors
///
/// Returns [`PacketError::InvalidOrdinal`] for ordinals with no variant.
pub fn read_enum<E: WireEnum>(src: &mut Bytes) -> Result<E, PacketError> {
    let ordinal = read_u8(src)?;
    E::from_ordinal(ordinal).ok_or(PacketError::InvalidOrdinal {
        ordinal,
        type_name: std::any::type_name::<E>(),
    })
}

/// Write an enum as its ordinal byte.
pub fn write_enum<E: WireEnum>(dst: &mut BytesMut, value: &E) { dst.put_u8(value.ordinal()); }

/// Read a varint-prefixed `bincode` value.
///
/// # Errors
///
/// Returns [`PacketError::Decode`] if the payload does not decode.
pub fn read_bincode<T: bincode::Decode<()>>(src: &mut Bytes) -> Result<T, PacketError> {
    let raw = read_bytes(src)?;
    let (value, _) = bincode::decode_from_slice(&raw, bincode::config::standard())?;
    Ok(value)
}

/// Write a varint-prefixed `bincode` value.
///
/// # Errors
///
/// Returns [`PacketError::Encode`] if the value cannot be encoded.
pub fn write_bincode<T: bincode::Encode>(dst: &mut BytesMut, value: &T) -> Result<(), PacketError> {
    let raw = bincode::encode_to_vec(value, bincode::config::standard())?;
    write_bytes(dst, &raw)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Mode {
        Survival,
        Creative,
    }

    impl WireEnum for Mode {
        fn ordinal(&self) -> u8 {
            match self {
                Self::Survival => 0,
                Self::Creative => 1,
            }
        }

        fn from_ordinal(ordinal: u8) -> Option<Self> {
            match ordinal {
                0 => Some(Self::Survival),
                1 => Some(Self::Creative),
                _ => None,
            }
        }
    }

    #[derive(Debug, PartialEq, bincode::Encode, bincode::Decode)]
    struct Profile {
        name: String,
        level: u16,
    }

    #[test]
    fn fixed_width_fields_are_big_endian() {
        let mut dst = BytesMut::new();
        write_i32(&mut dst, 0x0102_0304);
        assert_eq!(&dst[..], &[1, 2, 3, 4]);
        let mut src = dst.freeze();
        assert_eq!(read_i32(&mut src).expect("i32"), 0x0102_0304);
    }

    #[test]
    fn truncated_fixed_width_is_an_error() {
        let mut src = Bytes::from_static(&[0, 1]);
        let err = read_u32(&mut src).expect_err("two bytes are not a u32");
        assert!(matches!(err, PacketError::Truncated { needed: 4, remaining: 2 }));
    }

    #[rstest]
    #[case::within_limit("player", 16, true)]
    #[case::at_limit("abcd", 4, true)]
    #[case::over_limit("abcde", 4, false)]
    fn string_limit_is_enforced(#[case] value: &str, #[case] max: usize, #[case] ok: bool) {
        let mut dst = BytesMut::new();
        write_string(&mut dst, value);
        let mut src = dst.freeze();
        match read_string(&mut src, max) {
            Ok(read) => {
                assert!(ok);
                assert_eq!(read, value);
            }
            Err(err) => {
                assert!(!ok);
                assert!(matches!(err, PacketError::StringTooLong { .. }));
            }
        }
    }

    #[test]
    fn string_length_beyond_body_is_truncated() {
        let mut src = Bytes::from_static(&[0x05, b'a']);
        assert!(matches!(
            read_string(&mut src, 16),
            Err(PacketError::Truncated { needed: 5, remaining: 1 })
        ));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut src = Bytes::from_static(&[0x02, 0xc3, 0x28]);
        assert!(matches!(read_string(&mut src, 16), Err(PacketError::InvalidUtf8(_))));
    }

    #[test]
    fn collections_carry_varint_count() {
        let names = vec!["a".to_owned(), "bc".to_owned()];
        let mut dst = BytesMut::new();
        write_collection(&mut dst, &names, |dst, name| {
            write_string(dst, name);
            Ok(())
        })
        .expect("write names");
        assert_eq!(dst[0], 2);
        let mut src = dst.freeze();
        let read: Vec<String> =
            read_collection(&mut src, |src| read_string(src, 8)).expect("read names");
        assert_eq!(read, names);
    }

    #[test]
    fn int_array_uses_byte_count() {
        let mut dst = BytesMut::new();
        write_int_array(&mut dst, &[-1, 7]).expect("write array");
        assert_eq!(dst.len(), 1 + 8);
        let mut src = dst.freeze();
        assert_eq!(read_int_array(&mut src).expect("array"), vec![-1, 7]);

        let too_many = vec![0; 256];
        assert!(write_int_array(&mut BytesMut::new(), &too_many).is_err());
    }

    #[test]
    fn enums_use_ordinal_byte() {
        let mut dst = BytesMut::new();
        write_enum(&mut dst, &Mode::Creative);
        assert_eq!(&dst[..], &[1]);
        let mut src = dst.freeze();
        assert_eq!(read_enum::<Mode>(&mut src).expect("mode"), Mode::Creative);

        let mut bad = Bytes::from_static(&[9]);
        assert!(matches!(
            read_enum::<Mode>(&mut bad),
            Err(PacketError::InvalidOrdinal { ordinal: 9, .. })
        ));
    }

    #[test]
    fn ipv4_is_four_raw_bytes() {
        let mut dst = BytesMut::new();
        write_ipv4(&mut dst, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(&dst[..], &[10, 0, 0, 1]);
        let mut src = dst.freeze();
        assert_eq!(read_ipv4(&mut src).expect("addr"), Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn bincode_values_are_length_prefixed() {
        let profile = Profile {
            name: "steve".into(),
            level: 12,
        };
        let mut dst = BytesMut::new();
        write_bincode(&mut dst, &profile).expect("encode profile");
        write_bool(&mut dst, true);
        let mut src = dst.freeze();
        assert_eq!(read_bincode::<Profile>(&mut src).expect("profile"), profile);
        assert!(read_bool(&mut src).expect("trailing bool"));
    }
}
