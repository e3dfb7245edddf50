//! Protocol states and their opcode registries.
//!
//! A [`Protocol`] maps every ([`ProtocolState`], [`Direction`]) pair to a
//! [`Registry`] of packet types. It is assembled once with
//! [`ProtocolBuilder`] and shared read-only by every connection afterwards.

use std::{collections::HashMap, fmt};

mod registry;

pub use registry::{PacketFactory, Registry, RegistryError};

use crate::packet::Packet;

/// Named phase of a connection.
///
/// States are ordered; a connection may only move forward through them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolState {
    /// Initial state of every new connection.
    #[default]
    Handshake,
    /// Application traffic after the handshake completes.
    Play,
}

impl ProtocolState {
    /// All states in upgrade order.
    pub const ALL: [Self; 2] = [Self::Handshake, Self::Play];

    /// Returns the state name for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::Play => "play",
        }
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Which peer a packet travels towards.
///
/// A server decodes [`Direction::ServerBound`] packets and encodes
/// [`Direction::ClientBound`] ones; a client does the reverse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    /// Sent by clients, read by servers.
    ServerBound,
    /// Sent by servers, read by clients.
    ClientBound,
}

impl Direction {
    /// The direction packets travel in the other way.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::ServerBound => Self::ClientBound,
            Self::ClientBound => Self::ServerBound,
        }
    }

    /// Returns the direction name for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServerBound => "server-bound",
            Self::ClientBound => "client-bound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Immutable table of registries for every state and direction.
///
/// # Examples
///
/// ```
/// use bytes::{Bytes, BytesMut};
/// use packetwire::{
///     packet::{Packet, PacketError},
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
/// let protocol = Protocol::builder()
///     .register_default::<Ping>(ProtocolState::Play, Direction::ServerBound, 0x01)
///     .expect("register ping")
///     .build();
/// let registry = protocol.registry(ProtocolState::Play, Direction::ServerBound);
/// assert_eq!(registry.opcode_of::<Ping>(), Some(0x01));
/// ```
#[derive(Debug)]
pub struct Protocol {
    registries: HashMap<(ProtocolState, Direction), Registry>,
    empty: Registry,
}

impl Protocol {
    /// Start assembling a protocol.
    #[must_use]
    pub fn builder() -> ProtocolBuilder { ProtocolBuilder::default() }

    /// Registry consulted for `state` and `direction`.
    ///
    /// Pairs with no registrations yield an empty registry.
    #[must_use]
    pub fn registry(&self, state: ProtocolState, direction: Direction) -> &Registry {
        self.registries
            .get(&(state, direction))
            .unwrap_or(&self.empty)
    }
}

/// Builder for [`Protocol`].
///
/// Registration errors surface immediately so a misconfigured protocol never
/// reaches a live connection.
#[derive(Debug, Default)]
pub struct ProtocolBuilder {
    registries: HashMap<(ProtocolState, Direction), Registry>,
}

impl ProtocolBuilder {
    /// Bind `opcode` to `T` for one state and direction.
    ///
    /// `factory` produces a blank instance for the decoder to fill in.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the opcode or the type is already bound
    /// in that registry.
    pub fn register<T, F>(
        mut self,
        state: ProtocolState,
        direction: Direction,
        opcode: u32,
        factory: F,
    ) -> Result<Self, RegistryError>
    where
        T: Packet,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.registries
            .entry((state, direction))
            .or_default()
            .register(opcode, factory)?;
        Ok(self)
    }

    /// Bind `opcode` to `T`, building instances with [`Default`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the opcode or the type is already bound
    /// in that registry.
    pub fn register_default<T>(
        self,
        state: ProtocolState,
        direction: Direction,
        opcode: u32,
    ) -> Result<Self, RegistryError>
    where
        T: Packet + Default,
    {
        self.register(state, direction, opcode, T::default)
    }

    /// Freeze the registrations.
    #[must_use]
    pub fn build(self) -> Protocol {
        Protocol {
            registries: self.registries,
            empty: Registry::default(),
        }
    }
}
