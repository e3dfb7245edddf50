//! Accept loop for [`ServerChannel`](crate::server::ServerChannel).

use std::{
    io,
    net::SocketAddr,
    panic::AssertUnwindSafe,
    sync::Arc,
};

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::sleep,
};
use tokio_util::sync::CancellationToken;

use super::backoff::{AcceptBackoff, BackoffConfig};
use crate::{
    connection::{ConnectionActor, Endpoint},
    hooks::ProcessorFactory,
    metrics,
    panic::report_panic,
    session::SessionRegistry,
};

/// Source of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation-safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

/// Everything the accept loop needs to turn sockets into connections.
pub(in crate::server) struct AcceptOptions<F> {
    pub endpoint: Endpoint,
    pub factory: Arc<F>,
    pub sessions: Arc<SessionRegistry>,
    pub shutdown: CancellationToken,
    pub backoff: BackoffConfig,
    pub nodelay: bool,
}

/// Accept connections until `shutdown` is cancelled.
///
/// Each accepted socket gets a fresh processor from the factory and its own
/// connection task, registered in `sessions` until it finishes. Connection
/// tasks are detached: cancelling `shutdown` ends the loop and releases the
/// listener but leaves them running. Accept failures back off exponentially.
pub(in crate::server) async fn accept_loop<F, L>(listener: Arc<L>, options: AcceptOptions<F>)
where
    F: ProcessorFactory,
    L: AcceptListener + 'static,
{
    let mut backoff = options.backoff.start();
    while accept_once(&*listener, &options, &mut backoff).await {}
    debug!(
        "accept loop stopped: local_addr={:?}",
        listener.local_addr().ok()
    );
}

/// Accept or fail once. Returns `false` once shutdown is requested.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn accept_once<F, L>(
    listener: &L,
    options: &AcceptOptions<F>,
    backoff: &mut AcceptBackoff,
) -> bool
where
    F: ProcessorFactory,
    L: AcceptListener,
{
    let accepted = select! {
        biased;

        () = options.shutdown.cancelled() => return false,
        res = listener.accept() => res,
    };
    match accepted {
        Ok((stream, peer_addr)) => {
            backoff.on_success();
            spawn_connection(stream, peer_addr, options);
            true
        }
        Err(e) => {
            let retry_in = backoff.on_failure();
            let local_addr = listener.local_addr().ok();
            warn!("accept error: error={e:?}, local_addr={local_addr:?}, retry_in={retry_in:?}");
            metrics::inc_errors("accept");
            select! {
                biased;

                () = options.shutdown.cancelled() => false,
                () = sleep(retry_in) => true,
            }
        }
    }
}

/// Start the connection task for an accepted socket.
fn spawn_connection<F: ProcessorFactory>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    options: &AcceptOptions<F>,
) {
    if options.nodelay
        && let Err(e) = stream.set_nodelay(true)
    {
        warn!("failed to set TCP_NODELAY: peer_addr={peer_addr}, error={e}");
    }
    let processor = options.factory.create();
    let (actor, handle) = ConnectionActor::new(stream, Some(peer_addr), &options.endpoint, processor);
    let id = handle.id();
    options.sessions.insert(&handle);
    let sessions = Arc::clone(&options.sessions);
    tokio::spawn(async move {
        match AssertUnwindSafe(actor.run()).catch_unwind().await {
            Ok(reason) => {
                debug!("connection finished: id={id}, peer_addr={peer_addr}, reason={reason:?}");
            }
            Err(panic) => {
                report_panic("connection task", id, Some(peer_addr), panic);
            }
        }
        sessions.remove(&id);
    });
}

#[cfg(test)]
pub(in crate::server) use tests::FailingListener;
