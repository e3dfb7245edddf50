//! Errors raised while reading or writing packet bodies.

use thiserror::Error;

use crate::varint::VarIntError;

/// Failure inside a packet's own read or write routine.
#[derive(Debug, Error)]
pub enum PacketError {
    /// The body ended before a field was complete.
    #[error("packet body truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the field required.
        needed: usize,
        /// Bytes left in the body.
        remaining: usize,
    },

    /// A varint field was malformed or truncated.
    #[error(transparent)]
    VarInt(#[from] VarIntError),

    /// A length-prefixed string exceeded its limit.
    #[error("string of {len} bytes exceeds limit of {max}")]
    StringTooLong {
        /// Declared string length.
        len: usize,
        /// Largest length accepted.
        max: usize,
    },

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// An enum ordinal had no matching variant.
    #[error("ordinal {ordinal} is not a valid {type_name}")]
    InvalidOrdinal {
        /// Ordinal read from the wire.
        ordinal: u8,
        /// Enum being decoded.
        type_name: &'static str,
    },

    /// A collection had more elements than its count field can describe.
    #[error("collection of {len} elements exceeds limit of {max}")]
    TooManyElements {
        /// Number of elements supplied.
        len: usize,
        /// Largest count the encoding supports.
        max: usize,
    },

    /// A `bincode` payload could not be decoded.
    #[error("bincode decode failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// A `bincode` payload could not be encoded.
    #[error("bincode encode failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Field-level validation failed.
    #[error("invalid packet: {0}")]
    Invalid(String),
}
