//! Request/response correlation for one connection.
//!
//! [`CorrelationTable`] assigns request ids, remembers the handler waiting
//! on each one, and guarantees every handler runs exactly once: with the
//! matching response, with [`CorrelationError::Timeout`], or with
//! [`CorrelationError::ConnectionClosed`].

use std::{
    collections::HashMap,
    fmt,
    task::{Context, Poll},
    time::Duration,
};

use futures::future::poll_fn;
use thiserror::Error;
use tokio_util::time::{DelayQueue, delay_queue};

use crate::packet::{Envelope, PacketError};

/// Default time to wait for a response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Correlation id carried in a packet's four-byte trailer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u32);

impl RequestId {
    /// Raw value written to the wire.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }
}

impl From<u32> for RequestId {
    fn from(value: u32) -> Self { Self(value) }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// Monotonic request id source.
///
/// Ids count up from zero and wrap back to zero after `i32::MAX`, so they
/// are never negative when read as signed integers by a peer.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestIdGenerator {
    next: u32,
}

impl RequestIdGenerator {
    /// Largest id handed out before wrapping.
    pub const MAX: u32 = i32::MAX as u32;

    /// Start the sequence at `next`, clamped to [`Self::MAX`].
    #[must_use]
    pub const fn starting_at(next: u32) -> Self {
        Self {
            next: if next > Self::MAX { Self::MAX } else { next },
        }
    }

    /// Return the next id in sequence.
    pub fn next_id(&mut self) -> RequestId {
        let id = self.next;
        self.next = if id == Self::MAX { 0 } else { id + 1 };
        RequestId(id)
    }
}

/// Errors delivered to response handlers.
#[derive(Debug, Error)]
pub enum CorrelationError {
    /// No response arrived before the deadline.
    #[error("request {id} timed out after {after:?}")]
    Timeout {
        /// Id of the expired request.
        id: RequestId,
        /// Timeout that elapsed.
        after: Duration,
    },

    /// The connection closed while the request was pending.
    #[error("connection closed before request {id} was answered")]
    ConnectionClosed {
        /// Id of the abandoned request.
        id: RequestId,
    },

    /// The request was issued on a connection that is not active.
    #[error("connection is not active")]
    NotConnected,

    /// The request packet could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[source] PacketError),

    /// A blocking wait was attempted on a runtime worker thread.
    #[error("blocking request issued from within an async runtime")]
    Blocking,
}

/// Callback resolved with the response or the reason none will arrive.
pub type ResponseHandler = Box<dyn FnOnce(Result<Envelope, CorrelationError>) + Send>;

/// A request whose deadline passed before a response arrived.
#[must_use = "the handler only runs once the expiry is resolved"]
pub struct Expired {
    id: RequestId,
    handler: ResponseHandler,
    after: Duration,
}

impl fmt::Debug for Expired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expired")
            .field("id", &self.id)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

impl Expired {
    /// Id of the expired request.
    pub fn id(&self) -> RequestId { self.id }

    /// Run the handler with [`CorrelationError::Timeout`].
    pub fn resolve(self) {
        (self.handler)(Err(CorrelationError::Timeout {
            id: self.id,
            after: self.after,
        }));
    }
}

struct Pending {
    handler: ResponseHandler,
    timer: delay_queue::Key,
    timeout: Duration,
}

/// Pending requests for one connection.
///
/// The table is owned by the connection task; timers are polled through
/// [`CorrelationTable::expired`] on that same task.
#[derive(Default)]
pub struct CorrelationTable {
    ids: RequestIdGenerator,
    pending: HashMap<RequestId, Pending>,
    deadlines: DelayQueue<RequestId>,
}

impl fmt::Debug for CorrelationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationTable")
            .field("ids", &self.ids)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl CorrelationTable {
    /// Create a table whose ids start from `ids`.
    #[must_use]
    pub fn with_generator(ids: RequestIdGenerator) -> Self {
        Self {
            ids,
            ..Self::default()
        }
    }

    /// Register `handler` and return the id the request must carry.
    ///
    /// Ids still pending from before a wraparound are skipped, keeping ids
    /// unique among pending requests.
    ///
    /// Must be called from within a tokio runtime with timers enabled.
    pub fn register(&mut self, handler: ResponseHandler, timeout: Duration) -> RequestId {
        let id = loop {
            let candidate = self.ids.next_id();
            if !self.pending.contains_key(&candidate) {
                break candidate;
            }
        };
        let timer = self.deadlines.insert(id, timeout);
        self.pending.insert(
            id,
            Pending {
                handler,
                timer,
                timeout,
            },
        );
        id
    }

    /// Deliver `envelope` to the handler waiting on its request id.
    ///
    /// # Errors
    ///
    /// Hands the envelope back when it carries no id or no request with
    /// that id is pending, so the caller can dispatch it elsewhere.
    pub fn resolve(&mut self, envelope: Envelope) -> Result<(), Envelope> {
        let Some(pending) = envelope
            .request_id()
            .and_then(|id| self.pending.remove(&id))
        else {
            return Err(envelope);
        };
        self.deadlines.remove(&pending.timer);
        (pending.handler)(Ok(envelope));
        Ok(())
    }

    /// Withdraw a pending request without resolving it.
    ///
    /// Returns the handler so the caller can report its own error.
    pub fn cancel(&mut self, id: RequestId) -> Option<ResponseHandler> {
        let pending = self.pending.remove(&id)?;
        self.deadlines.remove(&pending.timer);
        Some(pending.handler)
    }

    /// Wait for the next request to time out.
    ///
    /// The entry is removed from the table; the caller resolves it with
    /// [`Expired::resolve`]. Returns `None` immediately when nothing is
    /// pending. Cancel safe.
    pub async fn expired(&mut self) -> Option<Expired> { poll_fn(|cx| self.poll_expired(cx)).await }

    fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<Option<Expired>> {
        loop {
            let Some(entry) = futures::ready!(self.deadlines.poll_expired(cx)) else {
                return Poll::Ready(None);
            };
            let id = entry.into_inner();
            if let Some(pending) = self.pending.remove(&id) {
                return Poll::Ready(Some(Expired {
                    id,
                    handler: pending.handler,
                    after: pending.timeout,
                }));
            }
        }
    }

    /// Resolve every pending request with [`CorrelationError::ConnectionClosed`].
    pub fn close_all(&mut self) {
        self.deadlines.clear();
        for (id, pending) in self.pending.drain() {
            (pending.handler)(Err(CorrelationError::ConnectionClosed { id }));
        }
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn len(&self) -> usize { self.pending.len() }

    /// Whether no requests are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.pending.is_empty() }
}
