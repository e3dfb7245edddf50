//! Per-connection stage chain.
//!
//! Every connection runs the same three base stages, in order:
//! [`BaseStage::Framer`], [`BaseStage::Codec`] and [`BaseStage::Handler`].
//! Endpoints may add extension [`Stage`]s around them. Inbound data flows
//! from the head of the chain to the tail and outbound data flows back.
//! Stages ahead of the codec observe frames, stages behind it observe
//! packets.
//!
//! Extensions are declared once on a [`PipelineBuilder`] in the endpoint's
//! configuration. Each new connection gets its own freshly built
//! [`Pipeline`]; existing connections keep the chain they started with.

use std::{fmt, net::SocketAddr, sync::Arc};

use bytes::Bytes;

mod traffic;

pub use traffic::{TrafficCounter, TrafficStats};

use crate::{codec::CodecError, packet::Envelope, session::ConnectionId};

/// Stages every chain contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BaseStage {
    /// Splits the byte stream into frames.
    Framer,
    /// Maps frames to packets and back.
    Codec,
    /// Delivers packets to the connection and surfaces lifecycle events.
    Handler,
}

impl BaseStage {
    /// Stage name as listed by [`Pipeline::names`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Framer => "packet-framer",
            Self::Codec => "packet-codec",
            Self::Handler => "packet-handler",
        }
    }
}

/// Where an extension stage sits relative to the base chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Head of the chain, before everything added so far.
    First,
    /// Tail of the chain, after everything added so far.
    Last,
    /// Immediately before a base stage.
    Before(BaseStage),
    /// Immediately after a base stage.
    After(BaseStage),
}

/// Identity of the connection a stage is attached to.
#[derive(Clone, Copy, Debug)]
pub struct StageContext {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Remote address, when known.
    pub peer_addr: Option<SocketAddr>,
}

/// Extension hook in a connection's chain.
///
/// All methods default to no-ops. A stage only receives the callbacks that
/// match its position: frame callbacks ahead of the codec, packet callbacks
/// behind it. Lifecycle callbacks reach every stage.
pub trait Stage: Send {
    /// The connection became active.
    fn on_active(&mut self, _ctx: &StageContext) {}

    /// The connection closed.
    fn on_inactive(&mut self, _ctx: &StageContext) {}

    /// A frame payload was read from the transport.
    fn inbound_frame(&mut self, _frame: &Bytes) {}

    /// A frame payload is about to be written.
    fn outbound_frame(&mut self, _frame: &Bytes) {}

    /// A packet was decoded.
    fn inbound_packet(&mut self, _envelope: &Envelope) {}

    /// A packet is about to be encoded.
    fn outbound_packet(&mut self, _envelope: &Envelope) {}

    /// A codec error was raised on this connection.
    fn on_error(&mut self, _error: &CodecError) {}
}

/// Constructor for a fresh stage instance per connection.
pub type StageFactory = Arc<dyn Fn() -> Box<dyn Stage> + Send + Sync>;

#[derive(Clone)]
struct Extension {
    name: String,
    placement: Placement,
    factory: StageFactory,
}

/// Ordered, append-only list of extension stages.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use packetwire::pipeline::{Placement, PipelineBuilder, TrafficCounter, TrafficStats};
///
/// let stats = Arc::new(TrafficStats::default());
/// let shared = Arc::clone(&stats);
/// let builder = PipelineBuilder::default().stage("traffic", Placement::First, move || {
///     TrafficCounter::new(Arc::clone(&shared))
/// });
///
/// let pipeline = builder.build();
/// assert_eq!(
///     pipeline.names(),
///     ["traffic", "packet-framer", "packet-codec", "packet-handler"]
/// );
/// ```
#[derive(Clone, Default)]
pub struct PipelineBuilder {
    extensions: Vec<Extension>,
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.extensions.iter().map(|e| (&e.name, e.placement)))
            .finish()
    }
}

impl PipelineBuilder {
    /// Append an extension stage.
    ///
    /// Placements resolve in insertion order, so two stages both placed
    /// [`Placement::First`] end up with the later one at the head.
    #[must_use]
    pub fn stage<S, F>(mut self, name: impl Into<String>, placement: Placement, factory: F) -> Self
    where
        S: Stage + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        self.extensions.push(Extension {
            name: name.into(),
            placement,
            factory: Arc::new(move || Box::new(factory())),
        });
        self
    }

    /// Number of extension stages.
    #[must_use]
    pub fn len(&self) -> usize { self.extensions.len() }

    /// Whether no extension stages were added.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.extensions.is_empty() }

    /// Build a chain with new stage instances.
    #[must_use]
    pub fn build(&self) -> Pipeline {
        let mut slots: Vec<Slot> = [BaseStage::Framer, BaseStage::Codec, BaseStage::Handler]
            .into_iter()
            .map(Slot::Base)
            .collect();
        for extension in &self.extensions {
            let index = match extension.placement {
                Placement::First => 0,
                Placement::Last => slots.len(),
                Placement::Before(base) => position(&slots, base),
                Placement::After(base) => position(&slots, base) + 1,
            };
            slots.insert(
                index,
                Slot::Extension {
                    name: extension.name.clone(),
                    stage: (extension.factory)(),
                },
            );
        }
        let codec = position(&slots, BaseStage::Codec);
        Pipeline { slots, codec }
    }
}

fn position(slots: &[Slot], base: BaseStage) -> usize {
    slots
        .iter()
        .position(|slot| matches!(slot, Slot::Base(b) if *b == base))
        .unwrap_or(slots.len())
}

enum Slot {
    Base(BaseStage),
    Extension { name: String, stage: Box<dyn Stage> },
}

impl Slot {
    fn name(&self) -> &str {
        match self {
            Self::Base(base) => base.name(),
            Self::Extension { name, .. } => name,
        }
    }

    fn stage(&mut self) -> Option<&mut dyn Stage> {
        match self {
            Self::Base(_) => None,
            Self::Extension { stage, .. } => Some(stage.as_mut()),
        }
    }
}

/// A connection's resolved stage chain.
pub struct Pipeline {
    slots: Vec<Slot>,
    codec: usize,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Pipeline {
    /// Stage names from head to tail.
    #[must_use]
    pub fn names(&self) -> Vec<&str> { self.slots.iter().map(Slot::name).collect() }

    fn frame_stages(&mut self) -> impl DoubleEndedIterator<Item = &mut dyn Stage> {
        self.slots[..self.codec].iter_mut().filter_map(Slot::stage)
    }

    fn packet_stages(&mut self) -> impl DoubleEndedIterator<Item = &mut dyn Stage> {
        self.slots[self.codec..].iter_mut().filter_map(Slot::stage)
    }

    fn all_stages(&mut self) -> impl Iterator<Item = &mut dyn Stage> {
        self.slots.iter_mut().filter_map(Slot::stage)
    }

    pub(crate) fn on_active(&mut self, ctx: &StageContext) {
        self.all_stages().for_each(|s| s.on_active(ctx));
    }

    pub(crate) fn on_inactive(&mut self, ctx: &StageContext) {
        self.all_stages().for_each(|s| s.on_inactive(ctx));
    }

    pub(crate) fn on_error(&mut self, error: &CodecError) {
        self.all_stages().for_each(|s| s.on_error(error));
    }

    pub(crate) fn inbound_frame(&mut self, frame: &Bytes) {
        self.frame_stages().for_each(|s| s.inbound_frame(frame));
    }

    pub(crate) fn inbound_packet(&mut self, envelope: &Envelope) {
        self.packet_stages().for_each(|s| s.inbound_packet(envelope));
    }

    pub(crate) fn outbound_packet(&mut self, envelope: &Envelope) {
        self.packet_stages()
            .rev()
            .for_each(|s| s.outbound_packet(envelope));
    }

    pub(crate) fn outbound_frame(&mut self, frame: &Bytes) {
        self.frame_stages()
            .rev()
            .for_each(|s| s.outbound_frame(frame));
    }
}

#[cfg(test)]
mod tests;
