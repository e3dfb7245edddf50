//! Errors raised by connection handles.

use thiserror::Error;

use crate::protocol::ProtocolState;

/// Failure to move a connection to another protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UpgradeError {
    /// The connection is closed or closing.
    #[error("cannot upgrade a connection that is not active")]
    NotConnected,

    /// The requested state precedes the current one.
    #[error("cannot downgrade connection from {from} to {to}")]
    Downgrade {
        /// State the connection is in.
        from: ProtocolState,
        /// Earlier state that was requested.
        to: ProtocolState,
    },
}

/// Failure to hand a command to a connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The connection task has finished.
    #[error("connection is closed")]
    Closed,
}
