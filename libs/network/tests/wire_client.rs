//! Integration tests for the wire client against a real wire server
//!
//! Covers:
//! - Values sent while disconnected are delivered once connected
//! - Inbound dispatch to handlers and receivers
//! - One `Disconnected` per lost session, none for caller disconnects
//! - Connect errors (refused, timed out, closed mid-connect) and the
//!   reconnect helpers

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fleet_codec::Envelope;
use fleet_config::WireConfig;
use fleet_network::{
    connect_with_retry, maintain_connection, ClientEvent, ConnectionState, ReconnectPolicy,
    TransportError, WireClient, WireServer,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(3);

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        multiplier: 2.0,
    }
}

fn wire_config(port: u16) -> WireConfig {
    WireConfig {
        port,
        replay_count: 0,
        connect_timeout_ms: 1_000,
        ..WireConfig::default()
    }
}

async fn start_server(port: u16) -> (WireServer, SocketAddr) {
    let server = WireServer::new(wire_config(port)).unwrap();
    let addr = server.start().await.unwrap();
    (server, addr)
}

fn client_for(addr: SocketAddr) -> WireClient {
    WireClient::new(wire_config(addr.port())).unwrap()
}

/// A port nothing listens on
async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn next_disconnect(events: &mut broadcast::Receiver<ClientEvent>) -> Option<Arc<TransportError>> {
    loop {
        match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
            ClientEvent::Disconnected { cause } => return cause,
            ClientEvent::Connected { .. } => continue,
        }
    }
}

#[tokio::test]
async fn test_values_queued_while_disconnected_are_delivered() {
    let (server, addr) = start_server(0).await;
    let mut inbound = server.inbound();
    let client = client_for(addr);

    client.send_value("jobs", &1u32).unwrap();
    client.send_value("jobs", &2u32).unwrap();
    assert_eq!(client.pending(), 2);

    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    for expected in [1u32, 2] {
        let envelope = timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
        assert_eq!(envelope.topic, "jobs");
        assert_eq!(envelope.decode_payload::<u32>().unwrap(), expected);
    }
    wait_until(|| client.pending() == 0).await;

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (server, addr) = start_server(0).await;
    let client = client_for(addr);

    client.connect().await.unwrap();
    client.connect().await.unwrap();
    wait_until(|| server.connection_count() == 1).await;

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_inbound_dispatch_to_handlers_and_receivers() {
    let (server, addr) = start_server(0).await;
    let client = client_for(addr);

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        client.on_message(move |envelope| {
            seen.lock().unwrap().push(envelope.topic.clone());
        });
    }
    let mut messages = client.messages();

    client.connect().await.unwrap();
    wait_until(|| server.connection_count() == 1).await;
    server.broadcast(Envelope::from_value("status", &"up").unwrap());

    let received = timeout(WAIT, messages.recv()).await.unwrap().unwrap();
    assert_eq!(received.decode_payload::<String>().unwrap(), "up");
    assert_eq!(*seen.lock().unwrap(), vec!["status".to_string()]);

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_clients_relay_through_server_without_echo() {
    let (server, addr) = start_server(0).await;
    let sender = client_for(addr);
    let receiver = client_for(addr);
    let mut sender_inbox = sender.messages();
    let mut receiver_inbox = receiver.messages();

    sender.connect().await.unwrap();
    receiver.connect().await.unwrap();
    wait_until(|| server.connection_count() == 2).await;

    sender.send_value("chat", &"ping").unwrap();
    let relayed = timeout(WAIT, receiver_inbox.recv()).await.unwrap().unwrap();
    assert_eq!(relayed.decode_payload::<String>().unwrap(), "ping");

    let echo = timeout(Duration::from_millis(200), sender_inbox.recv()).await;
    assert!(echo.is_err(), "sender must not receive its own message");

    sender.close();
    receiver.close();
    server.stop().await;
}

#[tokio::test]
async fn test_connect_refused_is_connect_error() {
    let client = WireClient::new(wire_config(closed_port().await)).unwrap();
    let err = client.connect().await.unwrap_err();
    assert!(err.is_connect_error(), "unexpected error: {err}");
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

/// A listener whose accept queue is full, so further SYNs go unanswered
async fn saturated_listener() -> (tokio::net::TcpListener, Vec<tokio::net::TcpStream>) {
    let socket = tokio::net::TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(0).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut fillers = Vec::new();
    for _ in 0..8 {
        if let Ok(Ok(stream)) =
            timeout(Duration::from_millis(100), tokio::net::TcpStream::connect(addr)).await
        {
            fillers.push(stream);
        }
    }
    (listener, fillers)
}

#[tokio::test]
async fn test_connect_timeout_is_connect_error() {
    let (listener, _fillers) = saturated_listener().await;
    let port = listener.local_addr().unwrap().port();
    let client = WireClient::new(wire_config(port)).unwrap();

    let err = client
        .connect_with_timeout(Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout { .. }), "unexpected error: {err}");
    assert!(err.is_connect_error());
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_close_during_connect_leaves_no_session() {
    let (server, addr) = start_server(0).await;
    let client = client_for(addr);
    let mut events = client.events();

    // close() runs while the TCP connect is still pending
    let (connected, ()) = tokio::join!(client.connect(), async { client.close() });
    let err = connected.unwrap_err();
    assert_eq!(err.category(), "closed");
    assert!(client.is_closed());
    assert_eq!(client.state(), ConnectionState::Disconnected);

    wait_until(|| server.connection_count() == 0).await;
    assert!(client.send_value("jobs", &1u32).is_err());
    let event = timeout(Duration::from_millis(200), events.recv()).await;
    assert!(event.is_err(), "unexpected event: {event:?}");

    server.stop().await;
}

#[tokio::test]
async fn test_server_stop_raises_single_disconnect() {
    let (server, addr) = start_server(0).await;
    let client = client_for(addr);
    let notified = Arc::new(AtomicUsize::new(0));
    {
        let notified = Arc::clone(&notified);
        client.on_disconnected(move |_| {
            notified.fetch_add(1, Ordering::SeqCst);
        });
    }
    let mut events = client.events();

    client.connect().await.unwrap();
    wait_until(|| server.connection_count() == 1).await;
    server.stop().await;

    next_disconnect(&mut events).await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_caller_disconnect_is_silent() {
    let (server, addr) = start_server(0).await;
    let client = client_for(addr);
    let notified = Arc::new(AtomicUsize::new(0));
    {
        let notified = Arc::clone(&notified);
        client.on_disconnected(move |_| {
            notified.fetch_add(1, Ordering::SeqCst);
        });
    }

    client.connect().await.unwrap();
    wait_until(|| server.connection_count() == 1).await;
    let mut events = client.events();

    client.disconnect();
    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    wait_until(|| server.connection_count() == 0).await;

    let event = timeout(Duration::from_millis(200), events.recv()).await;
    assert!(event.is_err(), "no event expected, got {event:?}");
    assert_eq!(notified.load(Ordering::SeqCst), 0);

    // Still usable afterwards
    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_connect_with_retry_stops_on_cancel() {
    let client = WireClient::new(wire_config(closed_port().await)).unwrap();
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            cancel.cancel();
        })
    };

    let result = timeout(WAIT, connect_with_retry(&client, &fast_policy(), &cancel))
        .await
        .unwrap();
    assert!(matches!(result, Err(TransportError::Cancelled { .. })));
    canceller.await.unwrap();
}

#[tokio::test]
async fn test_connect_with_retry_succeeds_once_server_appears() {
    let port = closed_port().await;
    let client = WireClient::new(wire_config(port)).unwrap();
    let cancel = CancellationToken::new();

    let connecting = {
        let client = client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { connect_with_retry(&client, &fast_policy(), &cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let (server, _) = start_server(port).await;

    timeout(WAIT, connecting).await.unwrap().unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    client.close();
    server.stop().await;
}

#[tokio::test]
async fn test_maintain_connection_reconnects_after_server_restart() {
    let (first, addr) = start_server(0).await;
    let port = addr.port();
    let client = client_for(addr);
    let cancel = CancellationToken::new();

    let supervisor = {
        let client = client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { maintain_connection(&client, &fast_policy(), &cancel).await })
    };

    wait_until(|| first.connection_count() == 1).await;
    first.stop().await;
    drop(first);

    let (second, _) = start_server(port).await;
    let mut inbound = second.inbound();
    wait_until(|| second.connection_count() == 1).await;

    client.send_value("after", &42u32).unwrap();
    let envelope = timeout(WAIT, inbound.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.decode_payload::<u32>().unwrap(), 42);

    cancel.cancel();
    timeout(WAIT, supervisor).await.unwrap().unwrap().unwrap();

    client.close();
    second.stop().await;
}
