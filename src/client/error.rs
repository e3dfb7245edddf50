//! Error types for client channel operations.

use std::{io, net::SocketAddr};

use thiserror::Error;

use crate::correlation::CorrelationError;

/// Errors emitted by [`ClientChannel`](super::ClientChannel).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport connect failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialled.
        addr: SocketAddr,
        /// Underlying transport error.
        #[source]
        source: io::Error,
    },

    /// The channel already has a live connection.
    #[error("already connected to {addr}")]
    AlreadyConnected {
        /// Address of the live connection.
        addr: SocketAddr,
    },

    /// A connect or reconnect attempt is already running.
    #[error("connection to {addr} is already in progress")]
    ConnectInProgress {
        /// Address being dialled.
        addr: SocketAddr,
    },

    /// [`close`](super::ClientChannel::close) interrupted the attempt.
    #[error("connect attempt was cancelled")]
    Cancelled,

    /// The channel has no live connection.
    #[error("client is not connected")]
    NotConnected,

    /// A blocking call was made from a thread driving an async runtime.
    #[error("blocking call issued from within an async runtime")]
    Blocking,

    /// An awaited request failed.
    #[error(transparent)]
    Request(#[from] CorrelationError),

    /// The worker pool could not be started.
    #[error("failed to start client workers: {0}")]
    EventLoop(#[source] io::Error),
}
