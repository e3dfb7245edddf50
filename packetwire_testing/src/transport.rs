//! Loopback socket helpers.

use std::{
    future::Future,
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    time::Duration,
};

/// Shared result type for integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Create a TCP listener bound to a free local port.
///
/// # Errors
///
/// Returns any IO error encountered while binding.
pub fn unused_listener() -> std::io::Result<StdTcpListener> {
    StdTcpListener::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))
}

/// An address on which nothing is listening.
///
/// The port is released before returning, so a connect to it is refused
/// unless another process claims it in the meantime.
///
/// # Errors
///
/// Returns any IO error encountered while probing for a port.
pub fn unused_addr() -> std::io::Result<SocketAddr> {
    let listener = unused_listener()?;
    listener.local_addr()
}

/// Poll `condition` every few milliseconds until it holds.
///
/// # Panics
///
/// Panics if the condition does not hold within five seconds.
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let poll = async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .expect("condition not reached within five seconds");
}
