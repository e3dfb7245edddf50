//! Error types for the codec layer.
//!
//! The taxonomy separates wire-level framing problems, protocol violations
//! found inside an otherwise well-formed frame, transport I/O failures, and
//! end-of-stream conditions.
//!
//! # Error Categories
//!
//! - [`FramingError`]: the byte stream can no longer be split into frames.
//! - [`ProtocolViolation`]: a complete frame did not decode into a packet.
//! - [`EofError`]: the peer closed the stream part way through a frame.
//! - [`CodecError`]: top-level enum wrapping all categories plus I/O errors.

use std::io;

use thiserror::Error;

use super::recovery::RecoveryPolicy;
use crate::{
    packet::PacketError,
    protocol::{Direction, ProtocolState},
    varint::VarIntError,
};

/// Framing-level errors occurring during frame boundary detection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The length header did not terminate within three bytes.
    #[error("corrupted frame: length header wider than 3 bytes (saw {header_len})")]
    CorruptedFrame {
        /// Header bytes inspected before giving up.
        header_len: usize,
    },

    /// A varint inside the frame ran past five bytes without terminating.
    #[error("malformed varint: more than 5 continuation bytes")]
    MalformedVarInt,

    /// Outbound payload cannot be described by a `u32` length.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Payload size requested.
        size: usize,
        /// Largest size the encoder can describe.
        max: usize,
    },
}

/// Decode failures scoped to a single frame.
#[derive(Debug, Error)]
pub enum ProtocolViolation {
    /// The frame ended before its opcode.
    #[error("frame carries no opcode")]
    MissingOpcode,

    /// No packet is registered under the opcode for the current state.
    #[error("unknown opcode {opcode:#04x} in {state}/{direction}")]
    UnknownOpcode {
        /// Opcode read from the frame.
        opcode: u32,
        /// Protocol state active when the frame was decoded.
        state: ProtocolState,
        /// Registry direction consulted.
        direction: Direction,
    },

    /// Bytes left after the packet body that cannot be a correlation id.
    #[error("{remaining} trailing bytes after packet {opcode:#04x}; expected 0 or 4")]
    TrailingBytes {
        /// Opcode of the packet that was decoded.
        opcode: u32,
        /// Number of unread bytes.
        remaining: usize,
    },

    /// The packet's own read routine failed.
    #[error("failed to read packet {opcode:#04x}: {source}")]
    Payload {
        /// Opcode of the packet being read.
        opcode: u32,
        /// Underlying read failure.
        #[source]
        source: PacketError,
    },
}

/// Premature end of stream.
///
/// A close at a frame boundary is not an error; the connection reports it
/// as [`CloseReason::Peer`](crate::connection::CloseReason::Peer).
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The peer closed the connection while a frame payload was being read.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte frame received")]
    MidFrame {
        /// Payload bytes received before EOF.
        bytes_received: usize,
        /// Length announced by the frame header.
        expected: usize,
    },

    /// The peer closed the connection inside the length header.
    #[error("premature EOF during header: {bytes_received} header bytes received")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
    },
}

/// Top-level codec error taxonomy.
///
/// # Examples
///
/// ```
/// use packetwire::codec::{CodecError, FramingError, RecoveryPolicy};
///
/// let err = CodecError::Framing(FramingError::CorruptedFrame { header_len: 3 });
/// assert_eq!(err.default_recovery_policy(), RecoveryPolicy::Disconnect);
/// assert_eq!(err.error_type(), "framing");
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// Framing layer error.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Packet decode error inside a complete frame.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// Transport layer I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// End-of-stream handling.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),
}

impl From<VarIntError> for CodecError {
    fn from(_: VarIntError) -> Self { Self::Framing(FramingError::MalformedVarInt) }
}

impl CodecError {
    /// Returns the recommended recovery policy for this error.
    ///
    /// Only errors that leave the stream aligned on the next frame boundary
    /// may be dropped.
    ///
    /// | Error | Policy |
    /// |-------|--------|
    /// | `Framing::MalformedVarInt` | `Drop` |
    /// | Other `Framing` errors | `Disconnect` |
    /// | All `Protocol` errors | `Drop` |
    /// | All `Io` and `Eof` errors | `Disconnect` |
    #[must_use]
    pub fn default_recovery_policy(&self) -> RecoveryPolicy {
        match self {
            Self::Protocol(_) | Self::Framing(FramingError::MalformedVarInt) => RecoveryPolicy::Drop,
            Self::Framing(_) | Self::Io(_) | Self::Eof(_) => RecoveryPolicy::Disconnect,
        }
    }

    /// Returns the error category as a string for logging and metrics.
    ///
    /// One of: `"framing"`, `"protocol"`, `"io"`, or `"eof"`.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Protocol(_) => "protocol",
            Self::Io(_) => "io",
            Self::Eof(_) => "eof",
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
