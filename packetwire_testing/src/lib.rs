//! Shared fixtures for `packetwire` integration tests.
//!
//! The crate provides a small demo protocol with a handshake and a play
//! state, helpers for feeding bytes to the frame codec in awkward chunk
//! sizes, loopback listener helpers, and serialised log and metrics capture.
//!
//! ```rust
//! use packetwire::protocol::{Direction, ProtocolState};
//! use packetwire_testing::{Hello, demo_protocol};
//!
//! let protocol = demo_protocol();
//! let registry = protocol.registry(ProtocolState::Handshake, Direction::ServerBound);
//! assert_eq!(registry.opcode_of::<Hello>(), Some(0x00));
//! ```

pub mod frames;
pub mod logging;
pub mod metrics;
pub mod packets;
pub mod transport;

pub use frames::{decode_in_chunks, encode_frames};
pub use logging::{LoggerHandle, logger};
pub use metrics::{MetricsCapture, counter_value};
pub use packets::{Chat, Hello, Ping, Pong, Profile, Welcome, demo_protocol};
pub use transport::{TestResult, unused_addr, unused_listener, wait_until};
