#![doc(html_root_url = "https://docs.rs/packetwire/latest")]
//! Public API for the `packetwire` library.
//!
//! This crate provides paired client and server endpoints for
//! length-framed binary packet protocols. Each connection tracks its own
//! protocol state, whose opcode registries decide how packets are encoded
//! and decoded, and correlates numbered requests with their responses.

pub mod client;
pub mod codec;
pub mod connection;
pub mod correlation;
pub mod event_loop;
pub mod hooks;
pub mod metrics;
pub mod packet;
pub mod panic;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod session;
pub mod varint;

pub use client::{ClientChannel, ClientConfig, ClientError};
pub use codec::{CodecError, RecoveryPolicy, VarIntFrameCodec};
pub use connection::{CloseReason, ConnectionActor, ConnectionContext, ConnectionHandle};
pub use correlation::{CorrelationError, RequestId};
pub use hooks::{Outcome, PacketProcessor, ProcessorFactory};
pub use packet::{Envelope, Packet, PacketCodec, PacketError};
pub use protocol::{Direction, Protocol, ProtocolState};
pub use server::{ServerChannel, ServerConfig, ServerError};
pub use session::{ConnectionId, SessionRegistry};
