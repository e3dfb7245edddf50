//! Per-connection task and the handles used to drive it.
//!
//! A [`ConnectionActor`] owns one transport, the [`PacketCodec`] holding the
//! connection's single protocol state, its correlation table, timers and the
//! application's [`PacketProcessor`]. Decoding, encoding, dispatch, response
//! handlers and timers all run on that one task, one event at a time, so the
//! encoder and decoder can never observe different states and the
//! correlation table needs no locking.
//!
//! [`ConnectionHandle`]s forward work to the task through an unbounded
//! command queue; [`ConnectionContext`] gives callbacks already running on
//! the task direct access.
//!
//! [`PacketCodec`]: crate::packet::PacketCodec
//! [`PacketProcessor`]: crate::hooks::PacketProcessor

mod actor;
mod config;
mod context;
mod error;
pub(crate) mod handle;
mod scheduler;
mod state;

use std::sync::Arc;

pub use actor::{CloseReason, ConnectionActor};
pub use config::ConnectionConfig;
pub use context::ConnectionContext;
pub use error::{ConnectionError, UpgradeError};
pub use handle::ConnectionHandle;
pub use scheduler::{ScheduledTask, TimerId};

use crate::{
    pipeline::PipelineBuilder,
    protocol::{Direction, Protocol},
};

/// Settings shared by every connection an endpoint creates.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use packetwire::{
///     connection::Endpoint,
///     protocol::{Direction, Protocol},
/// };
///
/// let endpoint = Endpoint::new(Arc::new(Protocol::builder().build()), Direction::ServerBound);
/// assert_eq!(endpoint.inbound(), Direction::ServerBound);
/// ```
#[derive(Clone, Debug)]
pub struct Endpoint {
    protocol: Arc<Protocol>,
    inbound: Direction,
    stages: PipelineBuilder,
    config: ConnectionConfig,
}

impl Endpoint {
    /// Endpoint decoding `inbound` packets with default settings and no
    /// extension stages.
    #[must_use]
    pub fn new(protocol: Arc<Protocol>, inbound: Direction) -> Self {
        Self {
            protocol,
            inbound,
            stages: PipelineBuilder::default(),
            config: ConnectionConfig::default(),
        }
    }

    /// Replace the extension stages applied to connections created from now
    /// on.
    #[must_use]
    pub fn with_stages(mut self, stages: PipelineBuilder) -> Self {
        self.stages = stages;
        self
    }

    /// Replace the connection settings.
    #[must_use]
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared protocol definition.
    #[must_use]
    pub fn protocol(&self) -> &Arc<Protocol> { &self.protocol }

    /// Direction of packets this endpoint decodes.
    #[must_use]
    pub fn inbound(&self) -> Direction { self.inbound }

    /// Extension stages.
    #[must_use]
    pub fn stages(&self) -> &PipelineBuilder { &self.stages }

    /// Connection settings.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig { &self.config }
}
