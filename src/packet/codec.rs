//! Opcode and correlation-id layer between frames and packets.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Envelope, PacketError};
use crate::{
    codec::{CodecError, FramingError, ProtocolViolation},
    connection::UpgradeError,
    correlation::RequestId,
    protocol::{Direction, Protocol, ProtocolState},
    varint::{self, VarIntError},
};

/// Size of the optional correlation trailer.
const REQUEST_ID_LEN: usize = 4;

/// Encodes and decodes packets for one connection.
///
/// The codec holds the connection's single [`ProtocolState`]; the encoder
/// and decoder both read it, so they can never disagree about the active
/// registries.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use bytes::{Bytes, BytesMut};
/// use packetwire::{
///     packet::{Envelope, Packet, PacketCodec, PacketError},
///     protocol::{Direction, Protocol, ProtocolState},
/// };
///
/// #[derive(Debug, Default)]
/// struct Ping;
///
/// impl Packet for Ping {
///     fn read(&mut self, _src: &mut Bytes) -> Result<(), PacketError> { Ok(()) }
///     fn write(&self, _dst: &mut BytesMut) -> Result<(), PacketError> { Ok(()) }
/// }
///
/// let protocol = Arc::new(
///     Protocol::builder()
///         .register_default::<Ping>(ProtocolState::Handshake, Direction::ServerBound, 0x03)
///         .expect("register ping")
///         .build(),
/// );
/// let client = PacketCodec::new(Arc::clone(&protocol), Direction::ClientBound);
/// let server = PacketCodec::new(protocol, Direction::ServerBound);
///
/// let mut frame = BytesMut::new();
/// client.encode(&Envelope::new(Ping), &mut frame).expect("encode ping");
/// assert_eq!(&frame[..], &[0x03]);
///
/// let envelope = server.decode(frame.freeze()).expect("decode ping");
/// assert!(envelope.is::<Ping>());
/// ```
#[derive(Debug, Clone)]
pub struct PacketCodec {
    protocol: Arc<Protocol>,
    inbound: Direction,
    state: ProtocolState,
}

impl PacketCodec {
    /// Create a codec in [`ProtocolState::Handshake`].
    ///
    /// `inbound` is the direction of packets this endpoint receives; outbound
    /// packets use the opposite direction.
    #[must_use]
    pub fn new(protocol: Arc<Protocol>, inbound: Direction) -> Self {
        Self {
            protocol,
            inbound,
            state: ProtocolState::default(),
        }
    }

    /// Protocol state used for both directions.
    #[must_use]
    pub fn state(&self) -> ProtocolState { self.state }

    /// Direction of decoded packets.
    #[must_use]
    pub fn inbound(&self) -> Direction { self.inbound }

    /// Direction of encoded packets.
    #[must_use]
    pub fn outbound(&self) -> Direction { self.inbound.opposite() }

    /// Shared protocol definition.
    #[must_use]
    pub fn protocol(&self) -> &Arc<Protocol> { &self.protocol }

    /// Move to `next`, returning the previous state.
    ///
    /// Upgrading to the current state is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError::Downgrade`] if `next` precedes the current
    /// state.
    pub fn upgrade(&mut self, next: ProtocolState) -> Result<ProtocolState, UpgradeError> {
        if next < self.state {
            return Err(UpgradeError::Downgrade {
                from: self.state,
                to: next,
            });
        }
        Ok(std::mem::replace(&mut self.state, next))
    }

    /// Whether `packet` can be encoded in the current state.
    #[must_use]
    pub fn can_encode(&self, envelope: &Envelope) -> bool {
        self.protocol
            .registry(self.state, self.outbound())
            .opcode_for(envelope.packet())
            .is_some()
    }

    /// Decode one complete frame.
    ///
    /// The frame is consumed whatever the outcome; on error the remaining
    /// bytes are discarded with it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Protocol`] for empty frames, unknown opcodes,
    /// body read failures, and trailers that are not exactly four bytes.
    /// A corrupt opcode yields [`FramingError::MalformedVarInt`].
    pub fn decode(&self, mut frame: Bytes) -> Result<Envelope, CodecError> {
        let opcode = match varint::read_varint(&mut frame) {
            Ok(opcode) => opcode,
            Err(VarIntError::Malformed) => return Err(FramingError::MalformedVarInt.into()),
            Err(VarIntError::Truncated { .. }) => return Err(ProtocolViolation::MissingOpcode.into()),
        };
        let registry = self.protocol.registry(self.state, self.inbound);
        let mut packet = registry
            .new_packet(opcode)
            .ok_or(ProtocolViolation::UnknownOpcode {
                opcode,
                state: self.state,
                direction: self.inbound,
            })?;
        packet
            .read(&mut frame)
            .map_err(|source| ProtocolViolation::Payload { opcode, source })?;

        let mut envelope = Envelope::from_boxed(packet);
        match frame.remaining() {
            0 => {}
            REQUEST_ID_LEN => envelope.set_request_id(Some(RequestId::from(frame.get_u32()))),
            remaining => {
                return Err(ProtocolViolation::TrailingBytes { opcode, remaining }.into());
            }
        }
        Ok(envelope)
    }

    /// Encode `envelope` into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] if the packet's write routine fails; `dst` may
    /// then hold a partial frame and should be discarded.
    ///
    /// # Panics
    ///
    /// Panics if the packet type has no opcode in the current state. Sending
    /// an unregistered type is a programming error.
    pub fn encode(&self, envelope: &Envelope, dst: &mut BytesMut) -> Result<(), PacketError> {
        let direction = self.outbound();
        let packet = envelope.packet();
        let Some(opcode) = self.protocol.registry(self.state, direction).opcode_for(packet) else {
            panic!(
                "packet {} is not registered for {}/{direction}",
                packet.name(),
                self.state
            );
        };
        varint::put_varint(dst, opcode);
        packet.write(dst)?;
        if let Some(id) = envelope.request_id() {
            dst.put_u32(id.get());
        }
        Ok(())
    }
}
