//! Cloneable handle for driving a connection from outside its task.

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        Weak,
        atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::{ConnectionContext, ConnectionError, ScheduledTask, TimerId, UpgradeError};
use crate::{
    correlation::{CorrelationError, RequestId, ResponseHandler},
    packet::{Envelope, Packet},
    protocol::{Direction, Protocol, ProtocolState},
    session::ConnectionId,
};

/// Instructions queued for the connection task.
pub(crate) enum Command {
    Send(Envelope),
    Request {
        envelope: Envelope,
        timeout: Duration,
        handler: ResponseHandler,
    },
    Upgrade(ProtocolState),
    Schedule {
        id: TimerId,
        delay: Duration,
        period: Option<Duration>,
        task: ScheduledTask,
    },
    CancelTimer(TimerId),
}

/// State shared between a connection task and its handles.
pub(crate) struct Shared {
    pub(crate) id: ConnectionId,
    pub(crate) peer_addr: Option<SocketAddr>,
    pub(crate) protocol: Arc<Protocol>,
    pub(crate) outbound: Direction,
    pub(crate) request_timeout: Duration,
    state: AtomicU8,
    active: AtomicBool,
    next_timer: AtomicU64,
    commands: mpsc::UnboundedSender<Command>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) finished: CancellationToken,
}

impl Shared {
    pub(crate) fn new(
        id: ConnectionId,
        peer_addr: Option<SocketAddr>,
        protocol: Arc<Protocol>,
        outbound: Direction,
        request_timeout: Duration,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            protocol,
            outbound,
            request_timeout,
            state: AtomicU8::new(ProtocolState::default() as u8),
            active: AtomicBool::new(true),
            next_timer: AtomicU64::new(0),
            commands,
            shutdown: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> ProtocolState {
        let raw = usize::from(self.state.load(Ordering::Acquire));
        ProtocolState::ALL.get(raw).copied().unwrap_or_default()
    }

    pub(crate) fn set_state(&self, state: ProtocolState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn is_active(&self) -> bool { self.active.load(Ordering::Acquire) }

    pub(crate) fn deactivate(&self) { self.active.store(false, Ordering::Release); }

    pub(crate) fn next_timer(&self) -> TimerId {
        TimerId::new(self.next_timer.fetch_add(1, Ordering::Relaxed))
    }

    /// Panic unless `packet` can be encoded now or after a later upgrade.
    pub(crate) fn assert_sendable(&self, packet: &dyn Packet) {
        let current = self.state();
        let registered = ProtocolState::ALL
            .iter()
            .filter(|state| **state >= current)
            .any(|state| {
                self.protocol
                    .registry(*state, self.outbound)
                    .opcode_for(packet)
                    .is_some()
            });
        assert!(
            registered,
            "packet {} is not registered for {} in {current} or any later state",
            packet.name(),
            self.outbound
        );
    }

    fn command(&self, command: Command) -> Result<(), Command> {
        if !self.is_active() {
            return Err(command);
        }
        self.commands.send(command).map_err(|e| e.0)
    }
}

/// Cloneable handle to a live connection.
///
/// Every operation is forwarded to the connection task, which performs it in
/// order with inbound packet handling. Handles stay valid after the
/// connection closes; operations then fail with [`ConnectionError::Closed`]
/// or resolve with [`CorrelationError::NotConnected`].
#[derive(Clone)]
pub struct ConnectionHandle(Arc<Shared>);

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.0.id)
            .field("peer_addr", &self.0.peer_addr)
            .field("state", &self.0.state())
            .field("active", &self.0.is_active())
            .finish()
    }
}

impl ConnectionHandle {
    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self { Self(shared) }

    pub(crate) fn downgrade(&self) -> Weak<Shared> { Arc::downgrade(&self.0) }

    /// Identifier of the connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.0.id }

    /// Address of the remote peer, if known.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.0.peer_addr }

    /// Protocol state the connection is in.
    ///
    /// Reflects upgrades applied by the connection task; an upgrade queued
    /// through [`Self::upgrade`] may not be visible yet.
    #[must_use]
    pub fn state(&self) -> ProtocolState { self.0.state() }

    /// Whether the connection is still open.
    #[must_use]
    pub fn is_active(&self) -> bool { self.0.is_active() }

    /// Send `packet` without awaiting a response.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the connection has closed.
    ///
    /// # Panics
    ///
    /// Panics if the packet type is not registered for the outbound
    /// direction in the current or any later protocol state.
    pub fn send(&self, packet: impl Packet) -> Result<(), ConnectionError> {
        self.send_envelope(Envelope::new(packet))
    }

    /// Send a packet that answers request `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the connection has closed.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Self::send`].
    pub fn send_response(&self, id: RequestId, packet: impl Packet) -> Result<(), ConnectionError> {
        self.send_envelope(Envelope::new(packet).with_request_id(id))
    }

    /// Send a prepared envelope, keeping any request id it carries.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the connection has closed.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Self::send`].
    pub fn send_envelope(&self, envelope: Envelope) -> Result<(), ConnectionError> {
        self.0.assert_sendable(envelope.packet());
        self.0
            .command(Command::Send(envelope))
            .map_err(|_| ConnectionError::Closed)
    }

    /// Send `packet` as a request and resolve `handler` exactly once.
    ///
    /// The handler runs on the connection task with the response, a
    /// [`CorrelationError::Timeout`] after `timeout`, or
    /// [`CorrelationError::ConnectionClosed`]. If the connection is already
    /// closed it runs immediately on the caller's thread with
    /// [`CorrelationError::NotConnected`].
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Self::send`].
    pub fn send_and_await<F>(&self, packet: impl Packet, timeout: Duration, handler: F)
    where
        F: FnOnce(Result<Envelope, CorrelationError>) + Send + 'static,
    {
        let envelope = Envelope::new(packet);
        self.0.assert_sendable(envelope.packet());
        let command = Command::Request {
            envelope,
            timeout,
            handler: Box::new(handler),
        };
        if let Err(Command::Request { handler, .. }) = self.0.command(command) {
            handler(Err(CorrelationError::NotConnected));
        }
    }

    /// Send `packet` as a request and wait for the response.
    ///
    /// `timeout` defaults to the connection's configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Timeout`] if no response arrives in time
    /// and [`CorrelationError::ConnectionClosed`] or
    /// [`CorrelationError::NotConnected`] if the connection goes away.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Self::send`].
    pub async fn request(
        &self,
        packet: impl Packet,
        timeout: Option<Duration>,
    ) -> Result<Envelope, CorrelationError> {
        let (tx, rx) = oneshot::channel();
        let timeout = timeout.unwrap_or(self.0.request_timeout);
        self.send_and_await(packet, timeout, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(CorrelationError::NotConnected))
    }

    /// Blocking form of [`Self::request`] for threads outside the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Blocking`] when called from a thread
    /// driving a tokio runtime, which could otherwise deadlock. Other errors
    /// are as for [`Self::request`].
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Self::send`].
    pub fn request_blocking(
        &self,
        packet: impl Packet,
        timeout: Option<Duration>,
    ) -> Result<Envelope, CorrelationError> {
        if crate::event_loop::in_runtime() {
            return Err(CorrelationError::Blocking);
        }
        let (tx, rx) = oneshot::channel();
        let timeout = timeout.unwrap_or(self.0.request_timeout);
        self.send_and_await(packet, timeout, move |result| {
            let _ = tx.send(result);
        });
        rx.blocking_recv().unwrap_or(Err(CorrelationError::NotConnected))
    }

    /// Move the connection to `next`.
    ///
    /// The upgrade is applied on the connection task after any packets
    /// already queued through this handle, and before any queued later. Code
    /// running on the connection task should prefer
    /// [`ConnectionContext::upgrade`], which takes effect immediately.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError::NotConnected`] if the connection has closed
    /// and [`UpgradeError::Downgrade`] if `next` precedes the current state.
    pub fn upgrade(&self, next: ProtocolState) -> Result<(), UpgradeError> {
        let current = self.0.state();
        if next < current {
            return Err(UpgradeError::Downgrade {
                from: current,
                to: next,
            });
        }
        self.0
            .command(Command::Upgrade(next))
            .map_err(|_| UpgradeError::NotConnected)
    }

    /// Run `task` on the connection task once `delay` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the connection has closed.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> Result<TimerId, ConnectionError>
    where
        F: FnOnce(&mut ConnectionContext<'_>) + Send + 'static,
    {
        let mut task = Some(task);
        self.schedule_timer(delay, None, Box::new(move |ctx| {
            if let Some(task) = task.take() {
                task(ctx);
            }
        }))
    }

    /// Run `task` after `delay` and then every `period` until cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] if the connection has closed.
    pub fn schedule_repeating<F>(
        &self,
        delay: Duration,
        period: Duration,
        task: F,
    ) -> Result<TimerId, ConnectionError>
    where
        F: FnMut(&mut ConnectionContext<'_>) + Send + 'static,
    {
        self.schedule_timer(delay, Some(period), Box::new(task))
    }

    fn schedule_timer(
        &self,
        delay: Duration,
        period: Option<Duration>,
        task: ScheduledTask,
    ) -> Result<TimerId, ConnectionError> {
        let id = self.0.next_timer();
        self.0
            .command(Command::Schedule {
                id,
                delay,
                period,
                task,
            })
            .map_err(|_| ConnectionError::Closed)?;
        Ok(id)
    }

    /// Cancel a timer created by [`Self::schedule`] or
    /// [`Self::schedule_repeating`]. Cancelling a fired or unknown timer is
    /// a no-op.
    pub fn cancel_timer(&self, id: TimerId) { let _ = self.0.command(Command::CancelTimer(id)); }

    /// Ask the connection to close. Idempotent.
    ///
    /// Packets already handed to the connection are flushed first.
    pub fn close(&self) { self.0.shutdown.cancel(); }

    /// Wait until the connection task has finished tearing down.
    pub async fn closed(&self) { self.0.finished.cancelled().await; }

    /// Close the connection and wait for teardown to complete.
    pub async fn close_and_wait(&self) {
        self.close();
        self.closed().await;
    }
}
