//! Timers that run callbacks on the connection task.

use std::{
    collections::HashMap,
    fmt,
    task::{Context, Poll},
    time::Duration,
};

use futures::future::poll_fn;
use tokio_util::time::{DelayQueue, delay_queue};

use super::ConnectionContext;

/// Callback run when a timer fires.
pub type ScheduledTask = Box<dyn FnMut(&mut ConnectionContext<'_>) + Send>;

/// Identifier of a scheduled timer, unique within one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    pub(crate) const fn new(raw: u64) -> Self { Self(raw) }
}

struct Timer {
    key: delay_queue::Key,
    period: Option<Duration>,
    task: ScheduledTask,
}

/// A timer whose deadline has passed.
///
/// The task is handed out so the caller can run it with a context borrowing
/// the rest of the connection, then return it through [`Scheduler::rearm`].
pub(crate) struct Due {
    pub(crate) id: TimerId,
    pub(crate) period: Option<Duration>,
    pub(crate) task: ScheduledTask,
}

#[derive(Default)]
pub(crate) struct Scheduler {
    timers: HashMap<TimerId, Timer>,
    queue: DelayQueue<TimerId>,
    running: Option<TimerId>,
    cancelled_while_running: bool,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("timers", &self.timers.len())
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub(crate) fn insert(
        &mut self,
        id: TimerId,
        delay: Duration,
        period: Option<Duration>,
        task: ScheduledTask,
    ) {
        let key = self.queue.insert(id, delay);
        self.timers.insert(id, Timer { key, period, task });
    }

    /// Cancel `id`, returning whether a timer was removed.
    ///
    /// A periodic timer cancelling itself from its own task is not re-armed.
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        if let Some(timer) = self.timers.remove(&id) {
            self.queue.remove(&timer.key);
            return true;
        }
        if self.running == Some(id) {
            self.cancelled_while_running = true;
            return true;
        }
        false
    }

    /// Wait for the next timer to fire. Returns `None` when none are armed.
    pub(crate) async fn expired(&mut self) -> Option<Due> { poll_fn(|cx| self.poll_expired(cx)).await }

    fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<Option<Due>> {
        loop {
            let Some(entry) = futures::ready!(self.queue.poll_expired(cx)) else {
                return Poll::Ready(None);
            };
            let id = entry.into_inner();
            if let Some(timer) = self.timers.remove(&id) {
                self.running = Some(id);
                self.cancelled_while_running = false;
                return Poll::Ready(Some(Due {
                    id,
                    period: timer.period,
                    task: timer.task,
                }));
            }
        }
    }

    /// Finish running `due`, re-arming it if periodic and not cancelled.
    pub(crate) fn rearm(&mut self, due: Due) {
        let cancelled = std::mem::take(&mut self.cancelled_while_running);
        self.running = None;
        if let (Some(period), false) = (due.period, cancelled) {
            self.insert(due.id, period, Some(period), due.task);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
        self.timers.clear();
    }

    pub(crate) fn len(&self) -> usize { self.timers.len() }
}
