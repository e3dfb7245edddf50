//! Frame and byte counters.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;

use super::Stage;

/// Totals shared by every [`TrafficCounter`] created from it.
#[derive(Debug, Default)]
pub struct TrafficStats {
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl TrafficStats {
    /// Frames read across all connections.
    #[must_use]
    pub fn frames_in(&self) -> u64 { self.frames_in.load(Ordering::Relaxed) }

    /// Frames written across all connections.
    #[must_use]
    pub fn frames_out(&self) -> u64 { self.frames_out.load(Ordering::Relaxed) }

    /// Payload bytes read, excluding length headers.
    #[must_use]
    pub fn bytes_in(&self) -> u64 { self.bytes_in.load(Ordering::Relaxed) }

    /// Payload bytes written, excluding length headers.
    #[must_use]
    pub fn bytes_out(&self) -> u64 { self.bytes_out.load(Ordering::Relaxed) }
}

/// Stage that tallies frames into a [`TrafficStats`].
///
/// Place it ahead of [`BaseStage::Codec`](super::BaseStage::Codec); behind
/// the codec it sees no frames.
#[derive(Debug, Clone)]
pub struct TrafficCounter {
    stats: Arc<TrafficStats>,
}

impl TrafficCounter {
    /// Count into `stats`.
    #[must_use]
    pub fn new(stats: Arc<TrafficStats>) -> Self { Self { stats } }
}

impl Stage for TrafficCounter {
    fn inbound_frame(&mut self, frame: &Bytes) {
        self.stats.frames_in.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_in
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
    }

    fn outbound_frame(&mut self, frame: &Bytes) {
        self.stats.frames_out.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_out
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
    }
}
