//! Accept-side runtime for [`ServerChannel`](super::ServerChannel).

mod accept;
mod backoff;

#[cfg(test)]
pub(super) use accept::FailingListener;
pub(super) use accept::{AcceptOptions, accept_loop};
pub use backoff::BackoffConfig;
