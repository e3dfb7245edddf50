//! Access to a connection from code running on its own task.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use super::{ConnectionHandle, TimerId, UpgradeError, state::ConnectionState};
use crate::{
    correlation::{CorrelationError, RequestId},
    packet::{Envelope, Packet},
    protocol::ProtocolState,
    session::ConnectionId,
};

/// Per-connection context passed to processors, response handlers and
/// timers.
///
/// Operations take effect immediately and in call order: a packet sent after
/// [`ConnectionContext::upgrade`] is encoded with the new state's registry.
pub struct ConnectionContext<'a> {
    state: &'a mut ConnectionState,
}

impl<'a> ConnectionContext<'a> {
    pub(crate) fn new(state: &'a mut ConnectionState) -> Self { Self { state } }

    /// Identifier of the connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.state.shared.id }

    /// Address of the remote peer, if known.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.state.shared.peer_addr }

    /// Current protocol state.
    #[must_use]
    pub fn state(&self) -> ProtocolState { self.state.codec.state() }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize { self.state.correlation.len() }

    /// A handle that outlives this callback.
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle { ConnectionHandle::from_shared(Arc::clone(&self.state.shared)) }

    /// Queue `packet` for sending.
    ///
    /// # Panics
    ///
    /// Panics if the packet type is not registered for the outbound
    /// direction in the current protocol state.
    pub fn send(&mut self, packet: impl Packet) { self.state.send(Envelope::new(packet)); }

    /// Queue a packet answering request `id`.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Self::send`].
    pub fn send_response(&mut self, id: RequestId, packet: impl Packet) {
        self.state.send(Envelope::new(packet).with_request_id(id));
    }

    /// Queue a prepared envelope, keeping any request id it carries.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Self::send`].
    pub fn send_envelope(&mut self, envelope: Envelope) { self.state.send(envelope); }

    /// Send `packet` as a request and resolve `handler` exactly once.
    ///
    /// See [`ConnectionHandle::send_and_await`] for the resolution rules.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Self::send`].
    pub fn send_and_await<F>(&mut self, packet: impl Packet, timeout: Duration, handler: F)
    where
        F: FnOnce(Result<Envelope, CorrelationError>) + Send + 'static,
    {
        self.state
            .request(Envelope::new(packet), timeout, Box::new(handler));
    }

    /// Switch both directions to `next`, returning the previous state.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError::NotConnected`] once the connection is closing
    /// and [`UpgradeError::Downgrade`] if `next` precedes the current state.
    pub fn upgrade(&mut self, next: ProtocolState) -> Result<ProtocolState, UpgradeError> {
        self.state.upgrade(next)
    }

    /// Run `task` on this connection once `delay` has elapsed.
    pub fn schedule<F>(&mut self, delay: Duration, task: F) -> TimerId
    where
        F: FnOnce(&mut ConnectionContext<'_>) + Send + 'static,
    {
        let mut task = Some(task);
        self.state.schedule(
            delay,
            None,
            Box::new(move |ctx| {
                if let Some(task) = task.take() {
                    task(ctx);
                }
            }),
        )
    }

    /// Run `task` after `delay` and then every `period` until cancelled.
    pub fn schedule_repeating<F>(&mut self, delay: Duration, period: Duration, task: F) -> TimerId
    where
        F: FnMut(&mut ConnectionContext<'_>) + Send + 'static,
    {
        self.state.schedule(delay, Some(period), Box::new(task))
    }

    /// Cancel a timer, returning whether it was still armed.
    pub fn cancel_timer(&mut self, id: TimerId) -> bool { self.state.scheduler.cancel(id) }

    /// Close the connection once the current callback returns.
    ///
    /// Packets queued before the close are still written.
    pub fn close(&mut self) {
        self.state.closing = true;
        self.state.shared.shutdown.cancel();
    }
}
