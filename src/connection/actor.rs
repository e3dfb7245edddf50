//! The connection task.

use std::{
    any::Any,
    collections::VecDeque,
    net::SocketAddr,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::codec::Framed;

use super::{
    ConnectionContext,
    ConnectionHandle,
    Endpoint,
    handle::{Command, Shared},
    scheduler::{Due, Scheduler},
    state::ConnectionState,
};
use crate::{
    codec::{CodecError, RecoveryPolicy, VarIntFrameCodec},
    correlation::{CorrelationError, CorrelationTable, Expired},
    hooks::{Outcome, PacketProcessor},
    metrics,
    packet::{Envelope, PacketCodec},
    panic::report_panic,
    session::ConnectionId,
};

/// Why a connection task finished.
#[derive(Debug)]
pub enum CloseReason {
    /// Closed through [`ConnectionHandle::close`] or
    /// [`ConnectionContext::close`].
    Local,
    /// The peer closed the stream cleanly.
    Peer,
    /// A transport or codec error ended the connection.
    Error(CodecError),
    /// Application code panicked on the connection task.
    Panicked {
        /// Formatted panic payload.
        message: String,
    },
}

impl CloseReason {
    /// Whether the close was requested locally.
    #[must_use]
    pub fn is_local(&self) -> bool { matches!(self, Self::Local) }
}

enum Event {
    Shutdown,
    Frame(Option<Result<Bytes, CodecError>>),
    Command(Command),
    Timeout(Expired),
    Timer(Due),
}

/// Drives one connection until it closes.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use packetwire::{
///     connection::{ConnectionActor, Endpoint},
///     hooks::{Outcome, processor_fn},
///     protocol::{Direction, Protocol},
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (stream, _peer) = tokio::io::duplex(64);
/// let endpoint = Endpoint::new(Arc::new(Protocol::builder().build()), Direction::ServerBound);
/// let (actor, handle) = ConnectionActor::new(
///     stream,
///     None,
///     &endpoint,
///     processor_fn(|_ctx, _packet| Outcome::Handled),
/// );
/// let task = tokio::spawn(actor.run());
/// handle.close();
/// assert!(task.await.expect("join connection task").is_local());
/// # }
/// ```
pub struct ConnectionActor<S, P> {
    framed: Framed<S, VarIntFrameCodec>,
    state: ConnectionState,
    processor: P,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl<S, P> ConnectionActor<S, P>
where
    S: AsyncRead + AsyncWrite + Unpin,
    P: PacketProcessor,
{
    /// Prepare a connection over `stream` and return a handle to it.
    ///
    /// Nothing is read or written until [`Self::run`] is polled.
    pub fn new(
        stream: S,
        peer_addr: Option<SocketAddr>,
        endpoint: &Endpoint,
        processor: P,
    ) -> (Self, ConnectionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = *endpoint.config();
        let protocol = Arc::clone(endpoint.protocol());
        let shared = Arc::new(Shared::new(
            ConnectionId::next(),
            peer_addr,
            Arc::clone(&protocol),
            endpoint.inbound().opposite(),
            config.get_request_timeout(),
            tx,
        ));
        let state = ConnectionState {
            shared: Arc::clone(&shared),
            codec: PacketCodec::new(protocol, endpoint.inbound()),
            pipeline: endpoint.stages().build(),
            correlation: CorrelationTable::default(),
            scheduler: Scheduler::default(),
            outbox: VecDeque::new(),
            config,
            closing: false,
        };
        let actor = Self {
            framed: Framed::new(stream, VarIntFrameCodec::new(config.get_zero_copy())),
            state,
            processor,
            commands: rx,
        };
        (actor, ConnectionHandle::from_shared(shared))
    }

    /// Identifier of the connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.state.shared.id }

    /// Run the connection to completion.
    ///
    /// On return every pending request has been resolved, the processor's
    /// `on_inactive` hook has run, and [`ConnectionHandle::closed`] is
    /// released.
    pub async fn run(mut self) -> CloseReason {
        metrics::inc_connections();
        debug!(
            "connection active: id={}, peer_addr={:?}",
            self.state.shared.id, self.state.shared.peer_addr
        );
        let reason = match self.start() {
            Ok(()) => self.drive().await,
            Err(reason) => reason,
        };
        self.teardown(&reason).await;
        reason
    }

    fn start(&mut self) -> Result<(), CloseReason> {
        self.guarded(|processor, state| {
            let ctx = state.stage_context();
            state.pipeline.on_active(&ctx);
            processor.on_active(&mut ConnectionContext::new(state));
        })
    }

    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    async fn drive(&mut self) -> CloseReason {
        loop {
            if let Err(e) = self.flush().await {
                return CloseReason::Error(e);
            }
            let event = tokio::select! {
                biased;

                () = self.state.shared.shutdown.cancelled() => Event::Shutdown,
                Some(command) = self.commands.recv() => Event::Command(command),
                frame = self.framed.next() => Event::Frame(frame),
                Some(expired) = self.state.correlation.expired() => Event::Timeout(expired),
                Some(due) = self.state.scheduler.expired() => Event::Timer(due),
            };
            if let Some(reason) = self.handle_event(event) {
                if reason.is_local()
                    && let Err(e) = self.flush().await
                {
                    return CloseReason::Error(e);
                }
                return reason;
            }
        }
    }

    fn handle_event(&mut self, event: Event) -> Option<CloseReason> {
        let outcome = match event {
            Event::Shutdown => {
                let mut queued = Vec::new();
                while let Ok(command) = self.commands.try_recv() {
                    queued.push(command);
                }
                self.guarded(|_, state| {
                    for command in queued {
                        apply_command(state, command);
                    }
                    state.closing = true;
                    Some(CloseReason::Local)
                })
            }
            Event::Command(command) => self.guarded(|_, state| {
                apply_command(state, command);
                None
            }),
            Event::Frame(None) => Ok(Some(CloseReason::Peer)),
            Event::Frame(Some(Ok(frame))) => {
                self.guarded(|processor, state| handle_frame(processor, state, frame))
            }
            Event::Frame(Some(Err(e))) => {
                self.guarded(|processor, state| handle_error(processor, state, e, false))
            }
            Event::Timeout(expired) => self.guarded(|_, _| {
                expired.resolve();
                None
            }),
            Event::Timer(mut due) => self.guarded(|_, state| {
                (due.task)(&mut ConnectionContext::new(state));
                state.scheduler.rearm(due);
                None
            }),
        };
        outcome.unwrap_or_else(Some)
    }

    /// Run `f` with the processor and state, converting a panic into
    /// [`CloseReason::Panicked`].
    fn guarded<R>(
        &mut self,
        f: impl FnOnce(&mut P, &mut ConnectionState) -> R,
    ) -> Result<R, CloseReason> {
        let processor = &mut self.processor;
        let state = &mut self.state;
        catch_unwind(AssertUnwindSafe(|| f(processor, state)))
            .map_err(|panic| panicked(self.state.shared.id, self.state.shared.peer_addr, panic))
    }

    async fn flush(&mut self) -> Result<(), CodecError> {
        if self.state.outbox.is_empty() {
            return Ok(());
        }
        while let Some(frame) = self.state.outbox.pop_front() {
            self.framed.feed(frame).await?;
        }
        SinkExt::<Bytes>::flush(&mut self.framed).await
    }

    async fn teardown(&mut self, reason: &CloseReason) {
        let id = self.state.shared.id;
        self.state.closing = true;
        self.state.shared.deactivate();
        self.state.shared.shutdown.cancel();
        self.commands.close();
        let timers = self.state.scheduler.len();
        self.state.scheduler.clear();

        let mut queued = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Request { handler, .. } = command {
                queued.push(handler);
            }
        }
        let pending = self.state.correlation.len() + queued.len();
        let _ = self.guarded(|_, state| {
            for handler in queued {
                handler(Err(CorrelationError::NotConnected));
            }
            state.correlation.close_all();
        });
        let _ = self.guarded(|processor, state| {
            let ctx = state.stage_context();
            state.pipeline.on_inactive(&ctx);
            processor.on_inactive(id);
        });

        if !matches!(reason, CloseReason::Error(_))
            && let Err(e) = SinkExt::<Bytes>::close(&mut self.framed).await
        {
            debug!("failed to shut down transport: id={id}, error={e}");
        }
        metrics::dec_connections();
        debug!(
            "connection closed: id={id}, reason={reason:?}, pending_requests={pending}, \
             timers={timers}"
        );
        self.state.shared.finished.cancel();
    }
}

fn apply_command(state: &mut ConnectionState, command: Command) {
    match command {
        Command::Send(envelope) => state.send(envelope),
        Command::Request {
            envelope,
            timeout,
            handler,
        } => state.request(envelope, timeout, handler),
        Command::Upgrade(next) => {
            if let Err(e) = state.upgrade(next) {
                warn!("upgrade rejected: id={}, error={e}", state.shared.id);
            }
        }
        Command::Schedule {
            id,
            delay,
            period,
            task,
        } => state.scheduler.insert(id, delay, period, task),
        Command::CancelTimer(id) => {
            state.scheduler.cancel(id);
        }
    }
}

fn handle_frame<P: PacketProcessor>(
    processor: &mut P,
    state: &mut ConnectionState,
    frame: Bytes,
) -> Option<CloseReason> {
    state.pipeline.inbound_frame(&frame);
    match state.codec.decode(frame) {
        Ok(envelope) => {
            dispatch(processor, state, envelope);
            None
        }
        Err(e) => handle_error(processor, state, e, true),
    }
}

/// Route a decoded packet to its pending request or to the processor.
fn dispatch<P: PacketProcessor>(
    processor: &mut P,
    state: &mut ConnectionState,
    envelope: Envelope,
) {
    metrics::inc_packets(metrics::Direction::Inbound);
    state.pipeline.inbound_packet(&envelope);
    let Err(envelope) = state.correlation.resolve(envelope) else {
        return;
    };
    let request_id = envelope.request_id();
    if let Outcome::Respond(packet) = processor.process(&mut ConnectionContext::new(state), envelope)
    {
        let mut reply = Envelope::from_boxed(packet);
        reply.set_request_id(request_id);
        state.send(reply);
    }
}

/// Report `error` and decide whether the connection survives it.
///
/// `recoverable` is false for errors raised by the framer, after which the
/// stream cannot be read further.
fn handle_error<P: PacketProcessor>(
    processor: &mut P,
    state: &mut ConnectionState,
    error: CodecError,
    recoverable: bool,
) -> Option<CloseReason> {
    let id = state.shared.id;
    metrics::inc_errors(error.error_type());
    state.pipeline.on_error(&error);
    processor.on_error(&mut ConnectionContext::new(state), &error);

    let policy = match error.default_recovery_policy() {
        RecoveryPolicy::Drop if recoverable => state.config.get_violation_policy(),
        _ => RecoveryPolicy::Disconnect,
    };
    match policy {
        RecoveryPolicy::Drop => {
            warn!("dropping frame: id={id}, error={error}");
            None
        }
        RecoveryPolicy::Disconnect => {
            if !matches!(error, CodecError::Eof(_)) {
                warn!("closing connection: id={id}, error={error}");
            }
            Some(CloseReason::Error(error))
        }
    }
}

fn panicked(
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    panic: Box<dyn Any + Send>,
) -> CloseReason {
    CloseReason::Panicked {
        message: report_panic("connection callback", id, peer_addr, panic),
    }
}

