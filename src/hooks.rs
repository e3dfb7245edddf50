//! Application entry points invoked by the connection task.
//!
//! [`PacketProcessor`] is the interface applications implement to handle
//! decoded packets and connection lifecycle events. Every method runs on the
//! connection's own task, so a processor never races with itself.

use std::fmt;

use crate::{
    codec::CodecError,
    connection::ConnectionContext,
    packet::{Envelope, Packet},
    session::ConnectionId,
};

/// Result of processing one inbound packet.
#[derive(Debug)]
pub enum Outcome {
    /// Nothing further to send.
    Handled,
    /// Send this packet back, tagged with the inbound packet's request id
    /// when it carried one.
    Respond(Box<dyn Packet>),
}

impl Outcome {
    /// Respond with `packet`.
    #[must_use]
    pub fn respond(packet: impl Packet) -> Self { Self::Respond(Box::new(packet)) }
}

/// Handles packets and lifecycle events for one connection.
///
/// Endpoints create a fresh processor for every connection.
///
/// # Examples
///
/// ```
/// use packetwire::{
///     connection::ConnectionContext,
///     hooks::{Outcome, PacketProcessor},
///     packet::Envelope,
/// };
///
/// struct Echo;
///
/// impl PacketProcessor for Echo {
///     fn process(&mut self, _ctx: &mut ConnectionContext<'_>, envelope: Envelope) -> Outcome {
///         Outcome::Respond(envelope.into_packet())
///     }
/// }
/// ```
pub trait PacketProcessor: Send + 'static {
    /// Called once the connection is established, before any packet is read.
    fn on_active(&mut self, _ctx: &mut ConnectionContext<'_>) {}

    /// Handle a decoded packet that is not a response to a pending request.
    fn process(&mut self, ctx: &mut ConnectionContext<'_>, envelope: Envelope) -> Outcome;

    /// Called for every codec error before the recovery policy is applied.
    fn on_error(&mut self, _ctx: &mut ConnectionContext<'_>, _error: &CodecError) {}

    /// Called once after the connection has closed and all pending requests
    /// have been resolved.
    fn on_inactive(&mut self, _id: ConnectionId) {}
}

/// [`PacketProcessor`] built from a closure.
pub struct FnProcessor<F>(F);

impl<F> fmt::Debug for FnProcessor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("FnProcessor") }
}

impl<F> PacketProcessor for FnProcessor<F>
where
    F: FnMut(&mut ConnectionContext<'_>, Envelope) -> Outcome + Send + 'static,
{
    fn process(&mut self, ctx: &mut ConnectionContext<'_>, envelope: Envelope) -> Outcome {
        (self.0)(ctx, envelope)
    }
}

/// Wrap a closure as a [`PacketProcessor`] with no lifecycle hooks.
///
/// ```
/// use packetwire::hooks::{Outcome, processor_fn};
///
/// let _processor = processor_fn(|_ctx, _envelope| Outcome::Handled);
/// ```
pub fn processor_fn<F>(f: F) -> FnProcessor<F>
where
    F: FnMut(&mut ConnectionContext<'_>, Envelope) -> Outcome + Send + 'static,
{
    FnProcessor(f)
}

/// Creates a fresh [`PacketProcessor`] for every connection.
///
/// Implemented for any `Fn() -> P` closure that can be shared across
/// worker threads.
pub trait ProcessorFactory: Send + Sync + 'static {
    /// Processor type produced.
    type Processor: PacketProcessor;

    /// Build the processor for a new connection.
    fn create(&self) -> Self::Processor;
}

impl<F, P> ProcessorFactory for F
where
    F: Fn() -> P + Send + Sync + 'static,
    P: PacketProcessor,
{
    type Processor = P;

    fn create(&self) -> P { self() }
}
