//! Packets and the codec that maps them onto frames.
//!
//! A [`Packet`] knows how to read and write its own body. The
//! [`PacketCodec`] adds the opcode prefix and optional correlation trailer,
//! resolving types through the connection's current protocol state.

use std::{any::Any, fmt};

use bytes::{Bytes, BytesMut};

mod codec;
mod error;
pub mod wire;

pub use codec::PacketCodec;
pub use error::PacketError;

use crate::correlation::RequestId;

/// A typed protocol message.
///
/// Implementations read from and write to the packet body only; opcodes and
/// correlation ids are handled by [`PacketCodec`].
///
/// # Examples
///
/// ```
/// use bytes::{Bytes, BytesMut};
/// use packetwire::packet::{Packet, PacketError, wire};
///
/// #[derive(Debug, Default)]
/// struct Chat {
///     text: String,
/// }
///
/// impl Packet for Chat {
///     fn read(&mut self, src: &mut Bytes) -> Result<(), PacketError> {
///         self.text = wire::read_string(src, 256)?;
///         Ok(())
///     }
///
///     fn write(&self, dst: &mut BytesMut) -> Result<(), PacketError> {
///         wire::write_string(dst, &self.text);
///         Ok(())
///     }
/// }
/// ```
pub trait Packet: Any + Send + fmt::Debug {
    /// Populate `self` from the packet body.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] if the body is truncated or invalid.
    fn read(&mut self, src: &mut Bytes) -> Result<(), PacketError>;

    /// Append the packet body to `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] if a field cannot be encoded.
    fn write(&self, dst: &mut BytesMut) -> Result<(), PacketError>;

    /// Name of the concrete packet type, for logs.
    fn name(&self) -> &'static str { std::any::type_name::<Self>() }
}

impl dyn Packet {
    /// Whether the concrete packet type is `T`.
    #[must_use]
    pub fn is<T: Packet>(&self) -> bool { (self as &dyn Any).is::<T>() }

    /// Borrow the packet as `T` if that is its concrete type.
    #[must_use]
    pub fn downcast_ref<T: Packet>(&self) -> Option<&T> { (self as &dyn Any).downcast_ref() }
}

/// A packet together with its optional correlation id.
pub struct Envelope {
    packet: Box<dyn Packet>,
    request_id: Option<RequestId>,
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("packet", &self.packet)
            .field("request_id", &self.request_id)
            .finish()
    }
}

impl Envelope {
    /// Wrap `packet` without a correlation id.
    pub fn new(packet: impl Packet) -> Self { Self::from_boxed(Box::new(packet)) }

    /// Wrap an already boxed packet without a correlation id.
    #[must_use]
    pub fn from_boxed(packet: Box<dyn Packet>) -> Self {
        Self {
            packet,
            request_id: None,
        }
    }

    /// Attach `id` to the envelope.
    #[must_use]
    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Correlation id carried by the packet, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> { self.request_id }

    /// Replace the correlation id.
    pub fn set_request_id(&mut self, id: Option<RequestId>) { self.request_id = id; }

    /// Borrow the packet.
    #[must_use]
    pub fn packet(&self) -> &dyn Packet { self.packet.as_ref() }

    /// Whether the packet is a `T`.
    #[must_use]
    pub fn is<T: Packet>(&self) -> bool { self.packet.is::<T>() }

    /// Borrow the packet as `T`.
    #[must_use]
    pub fn downcast_ref<T: Packet>(&self) -> Option<&T> { self.packet.downcast_ref() }

    /// Take the packet out as `T`.
    ///
    /// Returns `None` if the packet is some other type; check with
    /// [`is`](Self::is) first to keep the envelope in that case.
    #[must_use]
    pub fn downcast<T: Packet>(self) -> Option<T> {
        let any: Box<dyn Any> = self.packet;
        any.downcast::<T>().ok().map(|packet| *packet)
    }

    /// Discard the envelope and keep the packet.
    #[must_use]
    pub fn into_packet(self) -> Box<dyn Packet> { self.packet }
}

#[cfg(test)]
pub(crate) mod tests;
