//! Client and server channels talking over loopback TCP.

use std::{net::SocketAddr, time::Duration};

use futures::future::join_all;
use packetwire::{
    client::{ClientChannel, ClientConfig, ClientError},
    connection::{ConnectionContext, ConnectionHandle},
    correlation::CorrelationError,
    hooks::{Outcome, PacketProcessor, ProcessorFactory, processor_fn},
    packet::Envelope,
    protocol::ProtocolState,
    server::{ServerChannel, ServerConfig},
};
use packetwire_testing::{
    Chat,
    Hello,
    Ping,
    Pong,
    Profile,
    TestResult,
    Welcome,
    demo_protocol,
    unused_addr,
    wait_until,
};
use rstest::rstest;
use tokio::sync::mpsc;

/// Server side of the demo protocol.
#[derive(Default)]
struct GameServer {
    sessions: i32,
}

impl PacketProcessor for GameServer {
    fn process(&mut self, ctx: &mut ConnectionContext<'_>, envelope: Envelope) -> Outcome {
        if envelope.is::<Hello>() {
            self.sessions += 1;
            if let Some(id) = envelope.request_id() {
                ctx.send_response(id, Welcome { session: self.sessions });
            }
            ctx.upgrade(ProtocolState::Play).expect("upgrade to play");
            return Outcome::Handled;
        }
        if let Some(ping) = envelope.downcast_ref::<Ping>() {
            return Outcome::respond(Pong { nonce: ping.nonce });
        }
        if let Some(profile) = envelope.downcast_ref::<Profile>() {
            let mut promoted = profile.clone();
            promoted.level += 1;
            return Outcome::respond(promoted);
        }
        if let Some(chat) = envelope.downcast_ref::<Chat>()
            && chat.text != "ignore"
        {
            ctx.send(Chat {
                text: format!("echo: {}", chat.text),
            });
        }
        Outcome::Handled
    }
}

type Server = ServerChannel<fn() -> GameServer>;

fn start_server(addr: SocketAddr) -> TestResult<(Server, SocketAddr)> {
    let config = ServerConfig::new(addr).workers(2);
    let server: Server = ServerChannel::new(config, demo_protocol(), GameServer::default as fn() -> GameServer)?;
    let bound = server.bind()?;
    Ok((server, bound))
}

/// Client whose processor forwards every unsolicited packet to a channel.
fn start_client(
    addr: SocketAddr,
) -> TestResult<(ClientChannel<impl ProcessorFactory>, mpsc::UnboundedReceiver<Envelope>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let factory = move || {
        let tx = tx.clone();
        processor_fn(move |_ctx, envelope| {
            let _ = tx.send(envelope);
            Outcome::Handled
        })
    };
    let config = ClientConfig::new(addr).reconnect_delay(Duration::from_millis(50));
    Ok((ClientChannel::new(config, demo_protocol(), factory)?, rx))
}

async fn handshake(handle: &ConnectionHandle) -> TestResult<i32> {
    let reply = handle.request(Hello { name: "alex".into() }, None).await?;
    let welcome = reply.downcast::<Welcome>().ok_or("expected a welcome")?;
    handle.upgrade(ProtocolState::Play)?;
    Ok(welcome.session)
}

#[rstest]
#[tokio::test]
async fn handshake_moves_both_ends_to_play() -> TestResult {
    let (server, addr) = start_server(unused_addr()?)?;
    let (client, _rx) = start_client(addr)?;
    let handle = client.connect().await?;

    assert_eq!(handshake(&handle).await?, 1);
    wait_until(|| std::future::ready(handle.state() == ProtocolState::Play)).await;
    let server_side = server.connections();
    assert_eq!(server_side.len(), 1);
    assert_eq!(server_side[0].state(), ProtocolState::Play);

    let pong = client.request(Ping { nonce: 42 }, None).await?;
    assert_eq!(pong.downcast::<Pong>(), Some(Pong { nonce: 42 }));

    client.close();
    server.close_and_wait().await;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn concurrent_requests_resolve_with_their_own_responses() -> TestResult {
    let (server, addr) = start_server(unused_addr()?)?;
    let (client, _rx) = start_client(addr)?;
    let handle = client.connect().await?;
    handshake(&handle).await?;

    let requests = (0..64_i64).map(|nonce| {
        let handle = handle.clone();
        async move { (nonce, handle.request(Ping { nonce }, None).await) }
    });
    for (nonce, reply) in join_all(requests).await {
        let pong = reply?.downcast::<Pong>().ok_or("expected a pong")?;
        assert_eq!(pong.nonce, nonce);
    }

    let profile = Profile {
        name: "alex".into(),
        level: 9,
        badges: vec!["first-login".into()],
    };
    let promoted = client
        .request(profile.clone(), None)
        .await?
        .downcast::<Profile>()
        .ok_or("expected a profile")?;
    assert_eq!(promoted.level, 10);
    assert_eq!(promoted.badges, profile.badges);

    client.close();
    server.close_and_wait().await;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn unsolicited_packets_reach_the_client_processor() -> TestResult {
    let (server, addr) = start_server(unused_addr()?)?;
    let (client, mut rx) = start_client(addr)?;
    let handle = client.connect().await?;
    handshake(&handle).await?;

    client.send(Chat { text: "hi".into() })?;
    let echo = rx.recv().await.ok_or("client processor saw the echo")?;
    assert_eq!(echo.downcast::<Chat>(), Some(Chat { text: "echo: hi".into() }));

    for connection in server.connections() {
        connection.send(Chat {
            text: "broadcast".into(),
        })?;
    }
    let pushed = rx.recv().await.ok_or("client processor saw the push")?;
    assert_eq!(
        pushed.downcast::<Chat>(),
        Some(Chat {
            text: "broadcast".into()
        })
    );

    client.close();
    server.close_and_wait().await;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn unanswered_request_times_out() -> TestResult {
    let (server, addr) = start_server(unused_addr()?)?;
    let (client, _rx) = start_client(addr)?;
    let handle = client.connect().await?;
    handshake(&handle).await?;

    let err = client
        .request(Chat { text: "ignore".into() }, Some(Duration::from_millis(100)))
        .await
        .expect_err("server never answers");
    assert!(matches!(
        err,
        ClientError::Request(CorrelationError::Timeout { after, .. }) if after == Duration::from_millis(100)
    ));
    assert!(client.is_connected(), "a timeout does not close the connection");

    client.close();
    server.close_and_wait().await;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn client_reconnects_after_server_restart() -> TestResult {
    let addr = unused_addr()?;
    let (server, _) = start_server(addr)?;
    let (client, _rx) = start_client(addr)?;
    let first = client.connect().await?;
    handshake(&first).await?;

    server.close_and_wait().await;
    assert!(first.is_active(), "closing the listener keeps sessions");
    server.close_all_connections();
    first.closed().await;
    wait_until(|| std::future::ready(!client.is_connected())).await;

    server.bind()?;
    wait_until(|| std::future::ready(client.is_connected())).await;
    assert!(client.reconnect_attempts() >= 1);

    let second = client.connection().ok_or("reconnected handle")?;
    assert_ne!(second.id(), first.id());
    assert_eq!(second.state(), ProtocolState::Handshake);
    assert_eq!(handshake(&second).await?, 1, "server state is per connection");

    client.close();
    server.close_and_wait().await;
    Ok(())
}

#[rstest]
#[tokio::test]
async fn client_close_is_observed_by_the_server() -> TestResult {
    let (server, addr) = start_server(unused_addr()?)?;
    let (client, _rx) = start_client(addr)?;
    client.connect().await?;
    wait_until(|| std::future::ready(server.connections().len() == 1)).await;

    client.close();
    wait_until(|| std::future::ready(server.connections().is_empty())).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.reconnect_attempts(), 0);
    assert!(!client.is_reconnecting());

    server.close_and_wait().await;
    Ok(())
}
