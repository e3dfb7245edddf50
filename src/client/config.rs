//! Configuration for [`ClientChannel`](super::ClientChannel).

use std::{net::SocketAddr, time::Duration};

use crate::{connection::ConnectionConfig, pipeline::PipelineBuilder};

/// Default pause between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Settings for a client endpoint.
///
/// # Examples
///
/// ```
/// use std::{net::SocketAddr, time::Duration};
///
/// use packetwire::client::ClientConfig;
///
/// let addr: SocketAddr = "127.0.0.1:25565".parse().expect("valid address");
/// let config = ClientConfig::new(addr)
///     .reconnect_delay(Duration::from_millis(500))
///     .auto_reconnect(false);
/// assert_eq!(config.addr(), addr);
/// assert_eq!(config.get_reconnect_delay(), Duration::from_millis(500));
/// ```
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub(super) addr: SocketAddr,
    pub(super) workers: usize,
    pub(super) reconnect_delay: Duration,
    pub(super) auto_reconnect: bool,
    pub(super) nodelay: bool,
    pub(super) connection: ConnectionConfig,
    pub(super) stages: PipelineBuilder,
}

impl ClientConfig {
    /// Connect to `addr` with one worker per available core, reconnecting
    /// every five seconds after an unexpected disconnect.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            addr,
            workers,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            auto_reconnect: true,
            nodelay: true,
            connection: ConnectionConfig::default(),
            stages: PipelineBuilder::default(),
        }
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    /// Pause before each reconnect attempt.
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Reconnect automatically when a connection is lost without
    /// [`close`](super::ClientChannel::close) being called.
    #[must_use]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set `TCP_NODELAY` on the socket.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Settings for the connection.
    #[must_use]
    pub fn connection(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }

    /// Extension stages added to every connection made after the channel is
    /// created.
    #[must_use]
    pub fn stages(mut self, stages: PipelineBuilder) -> Self {
        self.stages = stages;
        self
    }

    /// Address to connect to.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Configured worker count.
    #[must_use]
    pub fn get_workers(&self) -> usize { self.workers }

    /// Configured reconnect delay.
    #[must_use]
    pub fn get_reconnect_delay(&self) -> Duration { self.reconnect_delay }
}
