//! Tests for [`ClientChannel`] connect, close, and reconnect behaviour.

use std::{
    io::Read,
    net::{SocketAddr, TcpListener},
    sync::{Arc, Barrier, mpsc},
    thread,
    time::{Duration, Instant},
};

use rstest::{fixture, rstest};

use super::*;
use crate::{
    connection::ConnectionContext,
    hooks::{FnProcessor, Outcome, processor_fn},
    packet::{Envelope, tests::Hello},
    protocol::ProtocolState,
};

type Processor = FnProcessor<fn(&mut ConnectionContext<'_>, Envelope) -> Outcome>;
type Client = ClientChannel<fn() -> Processor>;

fn ignore(_ctx: &mut ConnectionContext<'_>, _envelope: Envelope) -> Outcome { Outcome::Handled }

fn processor() -> Processor {
    processor_fn(ignore as fn(&mut ConnectionContext<'_>, Envelope) -> Outcome)
}

#[fixture]
fn protocol() -> Arc<Protocol> {
    let protocol = Protocol::builder()
        .register_default::<Hello>(ProtocolState::Handshake, Direction::ServerBound, 0x00)
        .and_then(|b| b.register_default::<Hello>(ProtocolState::Handshake, Direction::ClientBound, 0x00))
        .expect("valid protocol")
        .build();
    Arc::new(protocol)
}

fn client(protocol: Arc<Protocol>, addr: SocketAddr, reconnect_delay: Duration) -> Client {
    let config = ClientConfig::new(addr).reconnect_delay(reconnect_delay);
    ClientChannel::new(config, protocol, processor as fn() -> Processor).expect("start workers")
}

fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
    let addr = listener.local_addr().expect("listener address");
    (listener, addr)
}

fn refused_addr() -> SocketAddr {
    let (listener, addr) = listener();
    drop(listener);
    addr
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[rstest]
fn connect_blocking_establishes_one_connection(protocol: Arc<Protocol>) {
    let (_listener, addr) = listener();
    let client = client(protocol, addr, DEFAULT_RECONNECT_DELAY);

    let handle = client.connect_blocking().expect("connect");
    assert!(client.is_connected());
    assert_eq!(handle.peer_addr(), Some(addr));
    assert_eq!(client.connection().map(|h| h.id()), Some(handle.id()));

    let err = client.connect_blocking().expect_err("second connect fails");
    assert!(matches!(err, ClientError::AlreadyConnected { addr: live } if live == addr));
    client.close();
}

#[rstest]
fn connect_failure_carries_address(protocol: Arc<Protocol>) {
    let addr = refused_addr();
    let client = client(protocol, addr, DEFAULT_RECONNECT_DELAY);

    let err = client.connect_blocking().expect_err("nothing is listening");
    assert!(matches!(err, ClientError::Connect { addr: failed, .. } if failed == addr));
    assert_eq!(client.lifecycle_state(), LifecycleState::Disconnected);
    assert_eq!(client.reconnect_attempts(), 0);
}

#[rstest]
#[tokio::test]
async fn connect_blocking_is_rejected_inside_a_runtime(protocol: Arc<Protocol>) {
    let (_listener, addr) = listener();
    let client = client(protocol, addr, DEFAULT_RECONNECT_DELAY);

    assert!(matches!(client.connect_blocking(), Err(ClientError::Blocking)));
    let handle = client.connect().await.expect("async connect");
    assert!(handle.is_active());
    client.close();
}

#[rstest]
fn local_close_does_not_reconnect(protocol: Arc<Protocol>) {
    let (listener, addr) = listener();
    let client = client(protocol, addr, Duration::from_millis(10));
    client.connect_blocking().expect("connect");
    let (mut server_side, _) = listener.accept().expect("accept");

    client.close();
    client.close();
    assert_eq!(client.lifecycle_state(), LifecycleState::Disconnected);

    let mut buf = [0_u8; 1];
    assert_eq!(server_side.read(&mut buf).expect("read until close"), 0);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(client.lifecycle_state(), LifecycleState::Disconnected);
    assert_eq!(client.reconnect_attempts(), 0);
}

#[rstest]
fn peer_close_triggers_reconnect(protocol: Arc<Protocol>) {
    let (listener, addr) = listener();
    let client = client(protocol, addr, Duration::from_millis(20));
    let first = client.connect_blocking().expect("connect");
    let (server_side, _) = listener.accept().expect("accept");

    drop(server_side);
    wait_until(|| client.reconnect_attempts() >= 1 && client.is_connected());

    let second = client.connection().expect("reconnected handle");
    assert_ne!(second.id(), first.id());
    assert!(!first.is_active());
    listener.accept().expect("accept reconnect");
    client.close();
}

#[rstest]
fn reconnect_cycles_are_not_reentrant(protocol: Arc<Protocol>) {
    let client = client(protocol, refused_addr(), Duration::from_millis(10));

    assert!(client.reconnect());
    assert!(!client.reconnect(), "second trigger joins the running cycle");
    assert!(matches!(
        client.connect_blocking(),
        Err(ClientError::ConnectInProgress { .. })
    ));

    wait_until(|| client.reconnect_attempts() >= 3);
    assert!(!client.is_connected());

    client.close();
    assert_eq!(client.lifecycle_state(), LifecycleState::Disconnected);
    let settled = client.reconnect_attempts();
    thread::sleep(Duration::from_millis(50));
    assert!(
        client.reconnect_attempts() <= settled + 1,
        "no further attempts after close"
    );
}

#[rstest]
fn concurrent_reconnect_triggers_start_one_cycle(protocol: Arc<Protocol>) {
    const CALLERS: usize = 16;
    let client = client(protocol, refused_addr(), Duration::from_secs(60));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let started = thread::scope(|scope| {
        let callers: Vec<_> = (0..CALLERS)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let client = client.clone();
                scope.spawn(move || {
                    barrier.wait();
                    client.reconnect()
                })
            })
            .collect();
        callers
            .into_iter()
            .map(|caller| caller.join().expect("caller thread"))
            .filter(|started| *started)
            .count()
    });

    assert_eq!(started, 1);
    assert!(client.is_reconnecting());
    client.close();
    assert_eq!(client.reconnect_attempts(), 0);
}

#[rstest]
fn reconnect_attempts_follow_the_configured_delay(protocol: Arc<Protocol>) {
    let delay = Duration::from_millis(100);
    let client = client(protocol, refused_addr(), delay);

    let started = Instant::now();
    assert!(client.reconnect());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(client.reconnect_attempts(), 0, "first attempt waits a full delay");

    thread::sleep(Duration::from_millis(600));
    let attempts = client.reconnect_attempts();
    let elapsed = started.elapsed();
    client.close();

    let ceiling = u64::try_from(elapsed.as_millis() / delay.as_millis()).expect("short test");
    assert!(
        attempts <= ceiling,
        "{attempts} attempts in {elapsed:?} is faster than one per {delay:?}"
    );
    assert!(attempts >= 2, "retries keep going: {attempts} attempts in {elapsed:?}");
}

#[rstest]
fn connect_async_reports_through_callbacks(protocol: Arc<Protocol>) {
    let (_listener, addr) = listener();
    let client = client(protocol, addr, DEFAULT_RECONNECT_DELAY);
    let (tx, rx) = mpsc::channel();

    let ok = tx.clone();
    let err = tx.clone();
    client.connect_async(
        move |handle| ok.send(Ok(handle.id())).expect("report success"),
        move |e| err.send(Err(e.to_string())).expect("report failure"),
    );
    let id = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback ran")
        .expect("connected");
    assert_eq!(client.connection().map(|h| h.id()), Some(id));

    let err = tx.clone();
    client.connect_async(
        |_| panic!("already connected"),
        move |e| err.send(Err(e.to_string())).expect("report failure"),
    );
    let message = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("callback ran")
        .expect_err("busy channel");
    assert!(message.contains("already connected"));
    client.close();
}

#[rstest]
fn operations_without_connection_fail(protocol: Arc<Protocol>) {
    let client = client(protocol, refused_addr(), DEFAULT_RECONNECT_DELAY);

    assert!(matches!(
        client.send(Hello { name: "hi".into() }),
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(
        client.request_blocking(Hello { name: "hi".into() }, None),
        Err(ClientError::NotConnected)
    ));
    client.close();
    assert!(!client.is_reconnecting());
}
