//! Packet codec tests and packet types shared by unit tests.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use rstest::{fixture, rstest};

use super::*;
use crate::{
    codec::{CodecError, FramingError, ProtocolViolation},
    connection::UpgradeError,
    protocol::{Direction, Protocol, ProtocolState},
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Hello {
    pub name: String,
}

impl Packet for Hello {
    fn read(&mut self, src: &mut Bytes) -> Result<(), PacketError> {
        self.name = wire::read_string(src, 16)?;
        Ok(())
    }

    fn write(&self, dst: &mut BytesMut) -> Result<(), PacketError> {
        wire::write_string(dst, &self.name);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Ping {
    pub value: i32,
}

impl Packet for Ping {
    fn read(&mut self, src: &mut Bytes) -> Result<(), PacketError> {
        self.value = wire::read_i32(src)?;
        Ok(())
    }

    fn write(&self, dst: &mut BytesMut) -> Result<(), PacketError> {
        wire::write_i32(dst, self.value);
        Ok(())
    }
}

#[fixture]
fn protocol() -> Arc<Protocol> {
    let protocol = Protocol::builder()
        .register_default::<Hello>(ProtocolState::Handshake, Direction::ServerBound, 0x00)
        .and_then(|b| b.register_default::<Ping>(ProtocolState::Play, Direction::ServerBound, 0x00))
        .and_then(|b| b.register_default::<Ping>(ProtocolState::Play, Direction::ClientBound, 0x01))
        .expect("valid protocol")
        .build();
    Arc::new(protocol)
}

fn frame(bytes: &[u8]) -> Bytes { Bytes::copy_from_slice(bytes) }

#[rstest]
fn decodes_packet_without_trailer(protocol: Arc<Protocol>) {
    let codec = PacketCodec::new(protocol, Direction::ServerBound);
    let envelope = codec
        .decode(frame(&[0x00, 0x02, b'h', b'i']))
        .expect("decode hello");
    assert_eq!(envelope.request_id(), None);
    assert_eq!(
        envelope.downcast::<Hello>(),
        Some(Hello { name: "hi".into() })
    );
}

#[rstest]
fn decodes_four_byte_trailer_as_request_id(protocol: Arc<Protocol>) {
    let codec = PacketCodec::new(protocol, Direction::ServerBound);
    let envelope = codec
        .decode(frame(&[0x00, 0x01, b'x', 0x00, 0x00, 0x01, 0x02]))
        .expect("decode hello");
    assert_eq!(envelope.request_id(), Some(RequestId::from(0x0102)));
}

#[rstest]
#[case::one(&[0x00, 0x00, 0xaa])]
#[case::three(&[0x00, 0x00, 0xaa, 0xbb, 0xcc])]
#[case::five(&[0x00, 0x00, 1, 2, 3, 4, 5])]
fn rejects_other_trailer_lengths(protocol: Arc<Protocol>, #[case] bytes: &[u8]) {
    let codec = PacketCodec::new(protocol, Direction::ServerBound);
    let err = codec.decode(frame(bytes)).expect_err("bad trailer");
    let expected = bytes.len() - 2;
    assert!(matches!(
        err,
        CodecError::Protocol(ProtocolViolation::TrailingBytes { remaining, .. }) if remaining == expected
    ));
}

#[rstest]
fn unknown_opcode_is_a_violation(protocol: Arc<Protocol>) {
    let codec = PacketCodec::new(protocol, Direction::ServerBound);
    let err = codec.decode(frame(&[0x09])).expect_err("unknown opcode");
    assert!(matches!(
        err,
        CodecError::Protocol(ProtocolViolation::UnknownOpcode {
            opcode: 0x09,
            state: ProtocolState::Handshake,
            direction: Direction::ServerBound,
        })
    ));
}

#[rstest]
fn malformed_opcode_is_reported(protocol: Arc<Protocol>) {
    let codec = PacketCodec::new(protocol, Direction::ServerBound);
    let err = codec.decode(frame(&[0xff; 6])).expect_err("malformed");
    assert!(matches!(err, CodecError::Framing(FramingError::MalformedVarInt)));

    let err = codec.decode(Bytes::new()).expect_err("empty frame");
    assert!(matches!(err, CodecError::Protocol(ProtocolViolation::MissingOpcode)));
}

#[rstest]
fn body_errors_carry_opcode(protocol: Arc<Protocol>) {
    let codec = PacketCodec::new(protocol, Direction::ServerBound);
    let err = codec.decode(frame(&[0x00, 0x05, b'a'])).expect_err("short body");
    assert!(matches!(
        err,
        CodecError::Protocol(ProtocolViolation::Payload {
            opcode: 0,
            source: PacketError::Truncated { .. }
        })
    ));
}

#[rstest]
fn encode_appends_request_id(protocol: Arc<Protocol>) {
    let mut codec = PacketCodec::new(protocol, Direction::ClientBound);
    codec.upgrade(ProtocolState::Play).expect("upgrade");
    let mut dst = BytesMut::new();
    codec
        .encode(
            &Envelope::new(Ping { value: 7 }).with_request_id(RequestId::from(3)),
            &mut dst,
        )
        .expect("encode ping");
    assert_eq!(&dst[..], &[0x00, 0, 0, 0, 7, 0, 0, 0, 3]);
}

#[rstest]
fn upgrade_switches_registries(protocol: Arc<Protocol>) {
    let mut codec = PacketCodec::new(protocol, Direction::ServerBound);
    let mut body = BytesMut::new();
    body.put_u8(0x00);
    body.put_i32(42);
    let body = body.freeze();

    assert!(codec.decode(body.clone()).is_err(), "handshake reads a string");
    assert_eq!(codec.upgrade(ProtocolState::Play), Ok(ProtocolState::Handshake));
    let envelope = codec.decode(body).expect("play decode");
    assert_eq!(envelope.downcast_ref::<Ping>(), Some(&Ping { value: 42 }));
}

#[rstest]
fn upgrade_never_reverts(protocol: Arc<Protocol>) {
    let mut codec = PacketCodec::new(protocol, Direction::ServerBound);
    codec.upgrade(ProtocolState::Play).expect("upgrade");
    assert_eq!(
        codec.upgrade(ProtocolState::Handshake),
        Err(UpgradeError::Downgrade {
            from: ProtocolState::Play,
            to: ProtocolState::Handshake,
        })
    );
    assert_eq!(codec.state(), ProtocolState::Play);
    assert_eq!(codec.upgrade(ProtocolState::Play), Ok(ProtocolState::Play));
}

#[rstest]
#[should_panic(expected = "is not registered for handshake/client-bound")]
fn encoding_unregistered_packet_panics(protocol: Arc<Protocol>) {
    let codec = PacketCodec::new(protocol, Direction::ServerBound);
    let _ = codec.encode(&Envelope::new(Ping { value: 1 }), &mut BytesMut::new());
}

#[test]
fn envelope_downcast_checks_type() {
    let envelope = Envelope::new(Hello { name: "a".into() });
    assert!(envelope.is::<Hello>());
    assert!(envelope.downcast_ref::<Ping>().is_none());
    assert!(envelope.downcast::<Ping>().is_none());
}
