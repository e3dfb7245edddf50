//! Mutable state owned by a connection task.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use log::{debug, warn};

use super::{
    ConnectionConfig,
    ScheduledTask,
    TimerId,
    UpgradeError,
    handle::Shared,
    scheduler::Scheduler,
};
use crate::{
    correlation::{CorrelationError, CorrelationTable, ResponseHandler},
    metrics,
    packet::{Envelope, PacketCodec, PacketError},
    pipeline::{Pipeline, StageContext},
    protocol::ProtocolState,
};

/// Everything a connection task mutates besides the transport and the
/// application processor.
pub(crate) struct ConnectionState {
    pub(crate) shared: Arc<Shared>,
    pub(crate) codec: PacketCodec,
    pub(crate) pipeline: Pipeline,
    pub(crate) correlation: CorrelationTable,
    pub(crate) scheduler: Scheduler,
    pub(crate) outbox: VecDeque<Bytes>,
    pub(crate) config: ConnectionConfig,
    pub(crate) closing: bool,
}

impl ConnectionState {
    pub(crate) fn stage_context(&self) -> StageContext {
        StageContext {
            id: self.shared.id,
            peer_addr: self.shared.peer_addr,
        }
    }

    /// Encode `envelope` and queue the frame for writing.
    ///
    /// Encoding failures are logged and the packet is dropped.
    pub(crate) fn send(&mut self, envelope: Envelope) {
        let name = envelope.packet().name();
        if let Err(e) = self.enqueue(&envelope) {
            warn!(
                "failed to encode packet: id={}, packet={name}, error={e}",
                self.shared.id
            );
            metrics::inc_errors("encode");
        }
    }

    fn enqueue(&mut self, envelope: &Envelope) -> Result<(), PacketError> {
        self.pipeline.outbound_packet(envelope);
        let mut buf = BytesMut::new();
        self.codec.encode(envelope, &mut buf)?;
        let frame = buf.freeze();
        self.pipeline.outbound_frame(&frame);
        metrics::inc_packets(metrics::Direction::Outbound);
        self.outbox.push_back(frame);
        Ok(())
    }

    /// Register `handler`, tag `envelope` with the new id, and queue it.
    pub(crate) fn request(
        &mut self,
        envelope: Envelope,
        timeout: Duration,
        handler: ResponseHandler,
    ) {
        if self.closing {
            handler(Err(CorrelationError::NotConnected));
            return;
        }
        let id = self.correlation.register(handler, timeout);
        let envelope = envelope.with_request_id(id);
        if let Err(e) = self.enqueue(&envelope) {
            metrics::inc_errors("encode");
            if let Some(handler) = self.correlation.cancel(id) {
                handler(Err(CorrelationError::Encode(e)));
            }
        }
    }

    pub(crate) fn upgrade(&mut self, next: ProtocolState) -> Result<ProtocolState, UpgradeError> {
        if self.closing {
            return Err(UpgradeError::NotConnected);
        }
        let previous = self.codec.upgrade(next)?;
        self.shared.set_state(next);
        if previous != next {
            debug!(
                "protocol upgraded: id={}, from={previous}, to={next}",
                self.shared.id
            );
        }
        Ok(previous)
    }

    pub(crate) fn schedule(
        &mut self,
        delay: Duration,
        period: Option<Duration>,
        task: ScheduledTask,
    ) -> TimerId {
        let id = self.shared.next_timer();
        self.scheduler.insert(id, delay, period, task);
        id
    }
}
