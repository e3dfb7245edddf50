//! Connection lifecycle for the client channel.
//!
//! All lifecycle transitions happen under one mutex so that a reconnect
//! trigger can never be lost between a connection being established and the
//! same connection dropping.

use std::{
    mem,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::FutureExt;
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::{ClientConfig, ClientError};
use crate::{
    connection::{CloseReason, ConnectionActor, ConnectionHandle, Endpoint},
    event_loop::EventLoop,
    hooks::ProcessorFactory,
    panic::report_panic,
    session::ConnectionId,
};

/// Observable lifecycle of a [`ClientChannel`](super::ClientChannel).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// No connection and no attempt running.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// A connection is live.
    Connected,
    /// Waiting for the next reconnect attempt.
    Reconnecting,
}

pub(super) enum Phase {
    Disconnected,
    Connecting(CancellationToken),
    Connected(ConnectionHandle),
}

pub(super) struct Lifecycle {
    pub(super) phase: Phase,
    /// Present while a reconnect cycle is running. Cleared in the same
    /// critical section that publishes the reconnected handle.
    pub(super) reconnect: Option<CancellationToken>,
}

impl Lifecycle {
    fn observe(&self) -> LifecycleState {
        match (&self.phase, &self.reconnect) {
            (Phase::Connected(_), _) => LifecycleState::Connected,
            (Phase::Connecting(_), _) => LifecycleState::Connecting,
            (Phase::Disconnected, Some(_)) => LifecycleState::Reconnecting,
            (Phase::Disconnected, None) => LifecycleState::Disconnected,
        }
    }

    /// Move to `Disconnected`, cancelling whatever was in progress.
    ///
    /// Returns `false` if there was nothing to close.
    fn shut_down(&mut self) -> bool {
        let reconnect = self.reconnect.take();
        let phase = mem::replace(&mut self.phase, Phase::Disconnected);
        let had_reconnect = reconnect.is_some();
        if let Some(token) = reconnect {
            token.cancel();
        }
        match phase {
            Phase::Connected(handle) => {
                handle.close();
                true
            }
            Phase::Connecting(token) => {
                token.cancel();
                true
            }
            Phase::Disconnected => had_reconnect,
        }
    }
}

pub(super) struct ClientInner<F> {
    pub(super) config: ClientConfig,
    pub(super) endpoint: Endpoint,
    pub(super) factory: F,
    pub(super) lifecycle: Mutex<Lifecycle>,
    pub(super) attempts: AtomicU64,
    pub(super) event_loop: EventLoop,
}

impl<F> Drop for ClientInner<F> {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(PoisonError::into_inner);
        lifecycle.shut_down();
    }
}

impl<F> ClientInner<F> {
    pub(super) fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn state(&self) -> LifecycleState { self.lock().observe() }

    pub(super) fn handle(&self) -> Option<ConnectionHandle> {
        match &self.lock().phase {
            Phase::Connected(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    pub(super) fn attempts(&self) -> u64 { self.attempts.load(Ordering::Acquire) }

    pub(super) fn close(&self) {
        if self.lock().shut_down() {
            info!("client closed: addr={}", self.config.addr);
        }
    }

    /// Claim the lifecycle for a fresh connect attempt.
    pub(super) fn begin_connect(&self) -> Result<CancellationToken, ClientError> {
        let addr = self.config.addr;
        let mut lifecycle = self.lock();
        match (&lifecycle.phase, &lifecycle.reconnect) {
            (Phase::Connected(_), _) => Err(ClientError::AlreadyConnected { addr }),
            (Phase::Connecting(_), _) | (Phase::Disconnected, Some(_)) => {
                Err(ClientError::ConnectInProgress { addr })
            }
            (Phase::Disconnected, None) => {
                let token = CancellationToken::new();
                lifecycle.phase = Phase::Connecting(token.clone());
                Ok(token)
            }
        }
    }
}

impl<F: ProcessorFactory> ClientInner<F> {
    /// Dial the configured address and start a connection task.
    ///
    /// The caller must already have moved the lifecycle to `Connecting`
    /// with `token`.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub(super) async fn establish(
        self: Arc<Self>,
        token: CancellationToken,
    ) -> Result<ConnectionHandle, ClientError> {
        let addr = self.config.addr;
        let connected = tokio::select! {
            biased;
            () = token.cancelled() => return Err(ClientError::Cancelled),
            result = TcpStream::connect(addr) => result,
        };
        let stream = match connected {
            Ok(stream) => stream,
            Err(source) => {
                let mut lifecycle = self.lock();
                if !token.is_cancelled() {
                    lifecycle.phase = Phase::Disconnected;
                }
                return Err(ClientError::Connect { addr, source });
            }
        };
        if self.config.nodelay
            && let Err(e) = stream.set_nodelay(true)
        {
            warn!("failed to set TCP_NODELAY: addr={addr}, error={e}");
        }
        let peer_addr = stream.peer_addr().ok();
        let (actor, handle) =
            ConnectionActor::new(stream, peer_addr, &self.endpoint, self.factory.create());
        {
            let mut lifecycle = self.lock();
            if token.is_cancelled() {
                // Dropping the unstarted actor closes the socket.
                return Err(ClientError::Cancelled);
            }
            lifecycle.phase = Phase::Connected(handle.clone());
            lifecycle.reconnect = None;
        }
        let id = handle.id();
        info!("client connected: addr={addr}, id={id}");

        let inner = Arc::downgrade(&self);
        tokio::spawn(async move {
            let reason = match AssertUnwindSafe(actor.run()).catch_unwind().await {
                Ok(reason) => reason,
                Err(panic) => CloseReason::Panicked {
                    message: report_panic("connection task", id, peer_addr, panic),
                },
            };
            if let Some(inner) = inner.upgrade() {
                inner.connection_closed(id, &reason);
            }
        });
        Ok(handle)
    }

    fn connection_closed(self: &Arc<Self>, id: ConnectionId, reason: &CloseReason) {
        let current = {
            let mut lifecycle = self.lock();
            let current = matches!(&lifecycle.phase, Phase::Connected(handle) if handle.id() == id);
            if current {
                lifecycle.phase = Phase::Disconnected;
            }
            current
        };
        info!(
            "client disconnected: addr={}, id={id}, reason={reason:?}",
            self.config.addr
        );
        if current && !reason.is_local() && self.config.auto_reconnect {
            self.reconnect();
        }
    }

    /// Start a reconnect cycle unless one is already running or the client
    /// is connected or connecting.
    pub(super) fn reconnect(self: &Arc<Self>) -> bool {
        let token = {
            let mut lifecycle = self.lock();
            if lifecycle.reconnect.is_some() || !matches!(lifecycle.phase, Phase::Disconnected) {
                debug!(
                    "reconnect ignored: addr={}, state={:?}",
                    self.config.addr,
                    lifecycle.observe()
                );
                return false;
            }
            let token = CancellationToken::new();
            lifecycle.reconnect = Some(token.clone());
            token
        };
        self.event_loop.spawn(reconnect_loop(
            Arc::downgrade(self),
            token,
            self.config.reconnect_delay,
        ));
        true
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn reconnect_loop<F: ProcessorFactory>(
    inner: Weak<ClientInner<F>>,
    token: CancellationToken,
    delay: Duration,
) {
    loop {
        info!("reconnecting in {delay:?}");
        tokio::select! {
            biased;
            () = token.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
        let Some(client) = inner.upgrade() else {
            return;
        };
        {
            let mut lifecycle = client.lock();
            if token.is_cancelled() {
                return;
            }
            lifecycle.phase = Phase::Connecting(token.clone());
        }
        let attempt = client.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        let addr = client.config.addr;
        debug!("reconnect attempt: addr={addr}, attempt={attempt}");
        match Arc::clone(&client).establish(token.clone()).await {
            Ok(handle) => {
                info!("reconnected: addr={addr}, attempt={attempt}, id={}", handle.id());
                return;
            }
            Err(ClientError::Cancelled) => return,
            Err(e) => warn!("unable to reconnect: addr={addr}, attempt={attempt}, error={e}"),
        }
    }
}
