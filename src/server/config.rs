//! Configuration for [`ServerChannel`](super::ServerChannel).

use std::net::SocketAddr;

use super::BackoffConfig;
use crate::{connection::ConnectionConfig, pipeline::PipelineBuilder};

/// Settings for a listening endpoint.
///
/// # Examples
///
/// ```
/// use std::net::SocketAddr;
///
/// use packetwire::server::ServerConfig;
///
/// let addr: SocketAddr = "127.0.0.1:0".parse().expect("valid address");
/// let config = ServerConfig::new(addr).workers(2).nodelay(false);
/// assert_eq!(config.addr(), addr);
/// assert_eq!(config.get_workers(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub(super) addr: SocketAddr,
    pub(super) workers: usize,
    pub(super) accept_backoff: BackoffConfig,
    pub(super) nodelay: bool,
    pub(super) connection: ConnectionConfig,
    pub(super) stages: PipelineBuilder,
}

impl ServerConfig {
    /// Listen on `addr` with one worker per available core.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            addr,
            workers,
            accept_backoff: BackoffConfig::default(),
            nodelay: true,
            connection: ConnectionConfig::default(),
            stages: PipelineBuilder::default(),
        }
    }

    /// Number of worker threads driving connections.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count.max(1);
        self
    }

    /// Back-off applied when accepting fails.
    #[must_use]
    pub fn accept_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.accept_backoff = backoff;
        self
    }

    /// Set `TCP_NODELAY` on accepted sockets.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Settings for each accepted connection.
    #[must_use]
    pub fn connection(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }

    /// Extension stages added to every connection accepted after binding.
    #[must_use]
    pub fn stages(mut self, stages: PipelineBuilder) -> Self {
        self.stages = stages;
        self
    }

    /// Address to listen on.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Configured worker count.
    #[must_use]
    pub fn get_workers(&self) -> usize { self.workers }
}
