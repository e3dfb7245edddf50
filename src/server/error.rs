//! Errors raised by [`ServerChannel`](super::ServerChannel) operations.

use std::{io, net::SocketAddr};

use thiserror::Error;

/// Errors that may occur while binding or running a server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound or configured.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying transport error.
        #[source]
        source: io::Error,
    },

    /// The channel is already listening.
    #[error("server is already bound to {addr}")]
    AlreadyBound {
        /// Address the channel is listening on.
        addr: SocketAddr,
    },

    /// The worker pool could not be started.
    #[error("failed to start server workers: {0}")]
    EventLoop(#[source] io::Error),
}
