//! Server role: a listening endpoint producing many connections.
//!
//! [`ServerChannel`] binds a TCP listener on its own worker pool and starts
//! a connection task for every accepted socket. Each connection has its own
//! protocol state and correlation table. The channel tracks live
//! connections through a [`SessionRegistry`] without owning their lifetime:
//! closing the channel stops the listener and leaves accepted connections
//! running until they close or [`ServerChannel::close_all_connections`] is
//! called.

use std::{
    fmt,
    mem,
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::info;
use tokio::net::TcpListener;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

mod config;
pub mod error;
mod runtime;

pub use config::ServerConfig;
pub use error::ServerError;
pub use runtime::BackoffConfig;
use runtime::{AcceptOptions, accept_loop};

use crate::{
    connection::{ConnectionHandle, Endpoint},
    event_loop::EventLoop,
    hooks::ProcessorFactory,
    protocol::{Direction, Protocol},
    session::{ConnectionId, SessionRegistry},
};

enum BindState {
    Unbound,
    Bound {
        local_addr: SocketAddr,
        shutdown: CancellationToken,
        accept: TaskTracker,
    },
}

struct ServerInner<F> {
    config: ServerConfig,
    endpoint: Endpoint,
    factory: Arc<F>,
    sessions: Arc<SessionRegistry>,
    state: Mutex<BindState>,
    event_loop: EventLoop,
}

impl<F> Drop for ServerInner<F> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let BindState::Bound { shutdown, .. } = state {
            shutdown.cancel();
        }
    }
}

/// Listening endpoint.
///
/// Cloning the channel yields another handle to the same listener.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use packetwire::{
///     hooks::{Outcome, processor_fn},
///     protocol::Protocol,
///     server::{ServerChannel, ServerConfig},
/// };
///
/// let config = ServerConfig::new("127.0.0.1:0".parse().expect("valid address")).workers(1);
/// let server = ServerChannel::new(config, Arc::new(Protocol::builder().build()), || {
///     processor_fn(|_ctx, _packet| Outcome::Handled)
/// })
/// .expect("start workers");
///
/// let addr = server.bind().expect("bind listener");
/// assert_eq!(server.local_addr(), Some(addr));
/// assert!(server.bind().is_err(), "double bind is rejected");
/// server.close();
/// assert!(!server.is_bound());
/// ```
pub struct ServerChannel<F> {
    inner: Arc<ServerInner<F>>,
}

impl<F> Clone for ServerChannel<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F> fmt::Debug for ServerChannel<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerChannel")
            .field("config", &self.inner.config)
            .field("bound", &self.local_addr())
            .finish_non_exhaustive()
    }
}

impl<F> ServerChannel<F> {
    fn lock(&self) -> MutexGuard<'_, BindState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address the listener is bound to, if bound.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.lock() {
            BindState::Bound { local_addr, .. } => Some(*local_addr),
            BindState::Unbound => None,
        }
    }

    /// Whether the channel is listening.
    #[must_use]
    pub fn is_bound(&self) -> bool { self.local_addr().is_some() }

    /// Handles to all live connections.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionHandle> { self.inner.sessions.active_handles() }

    /// Handle to the connection with `id`, if it is still live.
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.inner.sessions.get(&id)
    }

    /// Stop accepting. Idempotent.
    ///
    /// Connections already accepted stay open; see
    /// [`Self::close_all_connections`].
    pub fn close(&self) { let _ = self.stop_accepting(); }

    /// Stop accepting and wait until the listening socket is released, so
    /// the address can be bound again.
    pub async fn close_and_wait(&self) {
        if let Some(accept) = self.stop_accepting() {
            accept.wait().await;
        }
    }

    /// Close every live connection without touching the listener.
    ///
    /// Returns the number of connections asked to close.
    pub fn close_all_connections(&self) -> usize {
        let handles = self.inner.sessions.active_handles();
        for handle in &handles {
            handle.close();
        }
        if !handles.is_empty() {
            info!("closing server connections: count={}", handles.len());
        }
        handles.len()
    }

    fn stop_accepting(&self) -> Option<TaskTracker> {
        let previous = mem::replace(&mut *self.lock(), BindState::Unbound);
        let BindState::Bound {
            local_addr,
            shutdown,
            accept,
        } = previous
        else {
            return None;
        };
        shutdown.cancel();
        info!("server closed: addr={local_addr}");
        Some(accept)
    }
}

impl<F: ProcessorFactory> ServerChannel<F> {
    /// Create an unbound server whose connections use processors built by
    /// `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::EventLoop`] if the worker pool cannot start.
    pub fn new(config: ServerConfig, protocol: Arc<Protocol>, factory: F) -> Result<Self, ServerError> {
        let event_loop = EventLoop::new("server", config.workers).map_err(ServerError::EventLoop)?;
        let endpoint = Endpoint::new(protocol, Direction::ServerBound)
            .with_stages(config.stages.clone())
            .with_config(config.connection);
        Ok(Self {
            inner: Arc::new(ServerInner {
                config,
                endpoint,
                factory: Arc::new(factory),
                sessions: Arc::new(SessionRegistry::default()),
                state: Mutex::new(BindState::Unbound),
                event_loop,
            }),
        })
    }

    /// Bind the configured address and start accepting.
    ///
    /// Binding does not wait on the network, so this is safe to call from
    /// any thread. Returns the bound address, which differs from the
    /// configured one when port 0 was requested.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::AlreadyBound`] if the channel is listening and
    /// [`ServerError::Bind`] if the socket cannot be bound.
    pub fn bind(&self) -> Result<SocketAddr, ServerError> {
        let mut state = self.lock();
        if let BindState::Bound { local_addr, .. } = &*state {
            return Err(ServerError::AlreadyBound { addr: *local_addr });
        }
        let addr = self.inner.config.addr;
        let listener = self.listen(addr)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let shutdown = CancellationToken::new();
        let options = AcceptOptions {
            endpoint: self.inner.endpoint.clone(),
            factory: Arc::clone(&self.inner.factory),
            sessions: Arc::clone(&self.inner.sessions),
            shutdown: shutdown.clone(),
            backoff: self.inner.config.accept_backoff,
            nodelay: self.inner.config.nodelay,
        };
        let accept = TaskTracker::new();
        accept.spawn_on(
            accept_loop(Arc::new(listener), options),
            self.inner.event_loop.handle(),
        );
        accept.close();
        *state = BindState::Bound {
            local_addr,
            shutdown,
            accept,
        };
        info!("server listening: addr={local_addr}");
        Ok(local_addr)
    }

    /// Bind on a worker thread and report the outcome through a callback.
    ///
    /// Returns immediately. Exactly one of `on_success` or `on_error` runs.
    pub fn bind_async<S, E>(&self, on_success: S, on_error: E)
    where
        S: FnOnce(SocketAddr) + Send + 'static,
        E: FnOnce(ServerError) + Send + 'static,
    {
        let this = self.clone();
        self.inner.event_loop.spawn(async move {
            match this.bind() {
                Ok(addr) => on_success(addr),
                Err(e) => on_error(e),
            }
        });
    }

    fn listen(&self, addr: SocketAddr) -> Result<TcpListener, ServerError> {
        let bind_err = |source| ServerError::Bind { addr, source };
        let std_listener = StdTcpListener::bind(addr).map_err(bind_err)?;
        std_listener.set_nonblocking(true).map_err(bind_err)?;
        let _guard = self.inner.event_loop.handle().enter();
        TcpListener::from_std(std_listener).map_err(bind_err)
    }
}
