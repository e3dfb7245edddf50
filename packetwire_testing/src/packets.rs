//! A small demo protocol shared by integration tests.
//!
//! | State     | Direction    | Opcode | Packet      |
//! |-----------|--------------|--------|-------------|
//! | handshake | server-bound | `0x00` | [`Hello`]   |
//! | handshake | client-bound | `0x00` | [`Welcome`] |
//! | play      | server-bound | `0x01` | [`Ping`]    |
//! | play      | client-bound | `0x01` | [`Pong`]    |
//! | play      | both         | `0x02` | [`Chat`]    |
//! | play      | both         | `0x03` | [`Profile`] |

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use packetwire::{
    packet::{Packet, PacketError, wire},
    protocol::{Direction, Protocol, ProtocolState},
};

/// Longest string the demo packets accept.
const MAX_TEXT: usize = 256;

/// First packet a client sends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Hello {
    /// Client name.
    pub name: String,
}

impl Packet for Hello {
    fn read(&mut self, src: &mut Bytes) -> Result<(), PacketError> {
        self.name = wire::read_string(src, MAX_TEXT)?;
        Ok(())
    }

    fn write(&self, dst: &mut BytesMut) -> Result<(), PacketError> {
        wire::write_string(dst, &self.name);
        Ok(())
    }
}

/// Server reply accepting a [`Hello`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Welcome {
    /// Server-assigned session number.
    pub session: i32,
}

impl Packet for Welcome {
    fn read(&mut self, src: &mut Bytes) -> Result<(), PacketError> {
        self.session = wire::read_i32(src)?;
        Ok(())
    }

    fn write(&self, dst: &mut BytesMut) -> Result<(), PacketError> {
        wire::write_i32(dst, self.session);
        Ok(())
    }
}

/// Liveness probe sent by clients.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ping {
    /// Value echoed back in the [`Pong`].
    pub nonce: i64,
}

impl Packet for Ping {
    fn read(&mut self, src: &mut Bytes) -> Result<(), PacketError> {
        self.nonce = wire::read_i64(src)?;
        Ok(())
    }

    fn write(&self, dst: &mut BytesMut) -> Result<(), PacketError> {
        wire::write_i64(dst, self.nonce);
        Ok(())
    }
}

/// Server answer to a [`Ping`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pong {
    /// Nonce copied from the ping.
    pub nonce: i64,
}

impl Packet for Pong {
    fn read(&mut self, src: &mut Bytes) -> Result<(), PacketError> {
        self.nonce = wire::read_i64(src)?;
        Ok(())
    }

    fn write(&self, dst: &mut BytesMut) -> Result<(), PacketError> {
        wire::write_i64(dst, self.nonce);
        Ok(())
    }
}

/// Free-form text, valid in both directions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Chat {
    /// Message body.
    pub text: String,
}

impl Packet for Chat {
    fn read(&mut self, src: &mut Bytes) -> Result<(), PacketError> {
        self.text = wire::read_string(src, MAX_TEXT)?;
        Ok(())
    }

    fn write(&self, dst: &mut BytesMut) -> Result<(), PacketError> {
        wire::write_string(dst, &self.text);
        Ok(())
    }
}

/// Structured payload carried as a `bincode` blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct Profile {
    /// Display name.
    pub name: String,
    /// Experience level.
    pub level: u16,
    /// Unlocked achievements.
    pub badges: Vec<String>,
}

impl Packet for Profile {
    fn read(&mut self, src: &mut Bytes) -> Result<(), PacketError> {
        *self = wire::read_bincode(src)?;
        Ok(())
    }

    fn write(&self, dst: &mut BytesMut) -> Result<(), PacketError> {
        wire::write_bincode(dst, self)
    }
}

/// Build the demo protocol described in the module docs.
///
/// # Panics
///
/// Panics if the registrations conflict, which would be a bug in this
/// function.
#[must_use]
pub fn demo_protocol() -> Arc<Protocol> {
    use Direction::{ClientBound, ServerBound};
    use ProtocolState::{Handshake, Play};

    let protocol = Protocol::builder()
        .register_default::<Hello>(Handshake, ServerBound, 0x00)
        .and_then(|b| b.register_default::<Welcome>(Handshake, ClientBound, 0x00))
        .and_then(|b| b.register_default::<Ping>(Play, ServerBound, 0x01))
        .and_then(|b| b.register_default::<Pong>(Play, ClientBound, 0x01))
        .and_then(|b| b.register_default::<Chat>(Play, ServerBound, 0x02))
        .and_then(|b| b.register_default::<Chat>(Play, ClientBound, 0x02))
        .and_then(|b| b.register_default::<Profile>(Play, ServerBound, 0x03))
        .and_then(|b| b.register_default::<Profile>(Play, ClientBound, 0x03))
        .expect("demo protocol registrations are unique")
        .build();
    Arc::new(protocol)
}
