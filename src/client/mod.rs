//! Client role: an endpoint owning at most one outbound connection.
//!
//! [`ClientChannel`] dials a server on its own worker pool and keeps the
//! resulting [`ConnectionHandle`]. When the connection drops for any reason
//! other than [`ClientChannel::close`], the channel reconnects after the
//! configured delay until an attempt succeeds or the channel is closed.

use std::{
    fmt,
    net::SocketAddr,
    sync::{Arc, Mutex, atomic::AtomicU64},
    time::Duration,
};

mod config;
pub mod error;
mod runtime;

pub use config::{ClientConfig, DEFAULT_RECONNECT_DELAY};
pub use error::ClientError;
pub use runtime::LifecycleState;
use runtime::{ClientInner, Lifecycle, Phase};

use crate::{
    connection::{ConnectionHandle, Endpoint},
    event_loop::{EventLoop, in_runtime},
    hooks::ProcessorFactory,
    packet::{Envelope, Packet},
    protocol::{Direction, Protocol},
};

/// Outbound endpoint.
///
/// Cloning the channel yields another handle to the same connection.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use packetwire::{
///     client::{ClientChannel, ClientConfig, LifecycleState},
///     hooks::{Outcome, processor_fn},
///     protocol::Protocol,
/// };
///
/// let config = ClientConfig::new("127.0.0.1:25565".parse().expect("valid address"));
/// let client = ClientChannel::new(config, Arc::new(Protocol::builder().build()), || {
///     processor_fn(|_ctx, _packet| Outcome::Handled)
/// })
/// .expect("start workers");
///
/// assert_eq!(client.lifecycle_state(), LifecycleState::Disconnected);
/// assert!(client.connection().is_none());
/// ```
pub struct ClientChannel<F> {
    inner: Arc<ClientInner<F>>,
}

impl<F> Clone for ClientChannel<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F> fmt::Debug for ClientChannel<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientChannel")
            .field("config", &self.inner.config)
            .field("state", &self.lifecycle_state())
            .finish_non_exhaustive()
    }
}

impl<F> ClientChannel<F> {
    /// Address the channel connects to.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.inner.config.addr }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle_state(&self) -> LifecycleState { self.inner.state() }

    /// Whether a connection is live.
    #[must_use]
    pub fn is_connected(&self) -> bool { self.lifecycle_state() == LifecycleState::Connected }

    /// Whether a connect attempt is in flight.
    #[must_use]
    pub fn is_connecting(&self) -> bool { self.lifecycle_state() == LifecycleState::Connecting }

    /// Whether a reconnect cycle is waiting for its next attempt.
    #[must_use]
    pub fn is_reconnecting(&self) -> bool { self.lifecycle_state() == LifecycleState::Reconnecting }

    /// Number of reconnect attempts made since the channel was created.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u64 { self.inner.attempts() }

    /// Handle to the live connection, if any.
    #[must_use]
    pub fn connection(&self) -> Option<ConnectionHandle> { self.inner.handle() }

    /// Close the connection and stop any connect or reconnect attempt.
    ///
    /// No automatic reconnect follows. Idempotent.
    pub fn close(&self) { self.inner.close(); }

    /// Send `packet` on the live connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] if there is no live connection.
    ///
    /// # Panics
    ///
    /// Panics if the packet type cannot be sent in the connection's current
    /// or any later state.
    pub fn send(&self, packet: impl Packet) -> Result<(), ClientError> {
        let handle = self.connection().ok_or(ClientError::NotConnected)?;
        handle.send(packet).map_err(|_| ClientError::NotConnected)
    }

    /// Send `packet` as a request on the live connection and wait for the
    /// response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] without a live connection and
    /// [`ClientError::Request`] if the request times out or the connection
    /// closes first.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Self::send`].
    pub async fn request(
        &self,
        packet: impl Packet,
        timeout: Option<Duration>,
    ) -> Result<Envelope, ClientError> {
        let handle = self.connection().ok_or(ClientError::NotConnected)?;
        Ok(handle.request(packet, timeout).await?)
    }

    /// Blocking form of [`Self::request`] for threads outside the runtime.
    ///
    /// # Errors
    ///
    /// As for [`Self::request`], plus [`ClientError::Request`] wrapping
    /// [`CorrelationError::Blocking`](crate::correlation::CorrelationError::Blocking)
    /// when called from a runtime thread.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Self::send`].
    pub fn request_blocking(
        &self,
        packet: impl Packet,
        timeout: Option<Duration>,
    ) -> Result<Envelope, ClientError> {
        let handle = self.connection().ok_or(ClientError::NotConnected)?;
        Ok(handle.request_blocking(packet, timeout)?)
    }
}

impl<F: ProcessorFactory> ClientChannel<F> {
    /// Create a disconnected client whose connections use processors built
    /// by `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EventLoop`] if the worker pool cannot start.
    pub fn new(config: ClientConfig, protocol: Arc<Protocol>, factory: F) -> Result<Self, ClientError> {
        let event_loop = EventLoop::new("client", config.workers).map_err(ClientError::EventLoop)?;
        let endpoint = Endpoint::new(protocol, Direction::ClientBound)
            .with_stages(config.stages.clone())
            .with_config(config.connection);
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                endpoint,
                factory,
                lifecycle: Mutex::new(Lifecycle {
                    phase: Phase::Disconnected,
                    reconnect: None,
                }),
                attempts: AtomicU64::new(0),
                event_loop,
            }),
        })
    }

    /// Connect to the configured address.
    ///
    /// The attempt runs on the channel's workers, so it completes even if
    /// this future is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyConnected`] or
    /// [`ClientError::ConnectInProgress`] if the channel is busy,
    /// [`ClientError::Connect`] if the transport connect fails, and
    /// [`ClientError::Cancelled`] if [`Self::close`] interrupts the attempt.
    pub async fn connect(&self) -> Result<ConnectionHandle, ClientError> {
        let token = self.inner.begin_connect()?;
        let attempt = Arc::clone(&self.inner).establish(token);
        self.inner
            .event_loop
            .spawn(attempt)
            .await
            .unwrap_or(Err(ClientError::Cancelled))
    }

    /// Blocking form of [`Self::connect`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Blocking`] when called from a thread driving a
    /// tokio runtime. Other errors are as for [`Self::connect`].
    pub fn connect_blocking(&self) -> Result<ConnectionHandle, ClientError> {
        if in_runtime() {
            return Err(ClientError::Blocking);
        }
        self.inner.event_loop.block_on(self.connect())
    }

    /// Connect in the background and report the outcome through a callback.
    ///
    /// Returns immediately. Exactly one of `on_success` or `on_error` runs;
    /// a busy channel reports through `on_error` on the caller's thread.
    pub fn connect_async<S, E>(&self, on_success: S, on_error: E)
    where
        S: FnOnce(ConnectionHandle) + Send + 'static,
        E: FnOnce(ClientError) + Send + 'static,
    {
        let token = match self.inner.begin_connect() {
            Ok(token) => token,
            Err(e) => return on_error(e),
        };
        let attempt = Arc::clone(&self.inner).establish(token);
        self.inner.event_loop.spawn(async move {
            match attempt.await {
                Ok(handle) => on_success(handle),
                Err(e) => on_error(e),
            }
        });
    }

    /// Start a reconnect cycle now.
    ///
    /// Returns `false` without effect if the channel is connected,
    /// connecting, or already reconnecting.
    pub fn reconnect(&self) -> bool { self.inner.reconnect() }
}

#[cfg(test)]
mod tests;
