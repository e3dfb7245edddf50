//! Worker pools owned by endpoints.
//!
//! Every [`ClientChannel`](crate::client::ClientChannel) and
//! [`ServerChannel`](crate::server::ServerChannel) drives its connections on
//! a dedicated multi-thread tokio runtime, so endpoints never compete with
//! the caller's own runtime and blocking entry points can be offered to
//! threads outside any runtime.
//!
//! Each connection runs as a single task, so its callbacks never overlap and
//! observe its events in order. The task is not pinned to one worker thread:
//! the scheduler may resume it on any worker between polls, so per-thread
//! state must not be relied on inside callbacks.

use std::{
    fmt,
    future::Future,
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use tokio::{
    runtime::{Builder, Handle, Runtime},
    task::JoinHandle,
};

/// A named pool of worker threads.
///
/// Dropping the pool shuts it down without waiting for running tasks, which
/// is safe from inside an asynchronous context.
///
/// # Examples
///
/// ```
/// use packetwire::event_loop::EventLoop;
///
/// let pool = EventLoop::new("server", 2).expect("build worker pool");
/// assert_eq!(pool.block_on(async { 1 + 1 }), 2);
/// ```
pub struct EventLoop {
    runtime: Option<Runtime>,
    handle: Handle,
    workers: usize,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl EventLoop {
    /// Start `workers` threads named `packetwire-{role}-{n}`.
    ///
    /// A worker count of zero is raised to one.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while creating the runtime.
    pub fn new(role: &str, workers: usize) -> io::Result<Self> {
        let workers = workers.max(1);
        let prefix = format!("packetwire-{role}");
        let counter = Arc::new(AtomicUsize::new(0));
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name_fn(move || {
                let n = counter.fetch_add(1, Ordering::Relaxed);
                format!("{prefix}-{n}")
            })
            .enable_all()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            workers,
        })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize { self.workers }

    /// Handle for spawning onto the pool.
    #[must_use]
    pub fn handle(&self) -> &Handle { &self.handle }

    /// Spawn `future` onto the pool.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle().spawn(future)
    }

    /// Drive `future` to completion on the current thread.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    /// Blocking entry points check for this first and return an error.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output { self.handle().block_on(future) }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Whether the current thread is driving a tokio runtime.
pub(crate) fn in_runtime() -> bool { Handle::try_current().is_ok() }
