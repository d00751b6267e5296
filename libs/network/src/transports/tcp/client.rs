//! # Wire Client - Decoupled Send Queue over TCP
//!
//! [`WireClient::send`] only enqueues; a send loop drains the queue while a
//! connection exists. A receive loop decodes inbound lines and dispatches
//! them to handlers and to [`WireClient::messages`] receivers.
//!
//! ## State Machine
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──ok──► Connected
//!      ▲                          │                  │
//!      └──────── failure ─────────┘◄── EOF / I/O ────┘
//! ```
//!
//! Reconnection is never automatic: callers drive it, usually through
//! [`crate::recovery::maintain_connection`].
//!
//! ## Disconnect Notification
//!
//! Exactly one `Disconnected` event is raised per session lost to EOF or
//! an I/O error, whichever loop notices first. A caller-initiated
//! [`WireClient::disconnect`] or [`WireClient::close`] raises none.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use fleet_codec::Envelope;
use fleet_config::WireConfig;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::framing::{LineReader, ReadLine};
use crate::{Result, TransportError};

const EVENT_CAPACITY: usize = 64;

/// Connection state as observed by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Lifecycle notifications
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected { peer: SocketAddr },
    /// `cause` is `None` for a graceful close by the peer
    Disconnected { cause: Option<Arc<TransportError>> },
}

type MessageHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;
type DisconnectHandler = Arc<dyn Fn(Option<&TransportError>) + Send + Sync>;

/// One live connection. Dropped when either loop ends or on disconnect.
struct Session {
    id: u64,
    peer: SocketAddr,
    cancel: CancellationToken,
    // Set by whoever ends the session first; later enders stay silent
    ended: Arc<AtomicBool>,
}

#[derive(Clone)]
struct SessionCtx {
    id: u64,
    cancel: CancellationToken,
    ended: Arc<AtomicBool>,
}

struct ClientInner {
    config: WireConfig,
    outgoing: mpsc::UnboundedSender<Envelope>,
    outgoing_rx: AsyncMutex<mpsc::UnboundedReceiver<Envelope>>,
    // Line whose write failed; written first on the next connection
    unsent: Mutex<Option<String>>,
    queued: AtomicUsize,
    state: watch::Sender<ConnectionState>,
    session: Mutex<Option<Session>>,
    session_counter: AtomicU64,
    connect_lock: AsyncMutex<()>,
    messages: broadcast::Sender<Envelope>,
    events: broadcast::Sender<ClientEvent>,
    message_handlers: RwLock<Vec<MessageHandler>>,
    disconnect_handlers: RwLock<Vec<DisconnectHandler>>,
    closed: AtomicBool,
}

/// TCP client with an unbounded outgoing queue. Cheap to clone; clones
/// share the connection and the queue.
#[derive(Clone)]
pub struct WireClient {
    inner: Arc<ClientInner>,
}

impl WireClient {
    /// Create a disconnected client. Fails fast on invalid configuration.
    pub fn new(config: WireConfig) -> Result<Self> {
        config.validate_for_client()?;
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (messages, _) = broadcast::channel(config.outbound_queue);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                outgoing,
                outgoing_rx: AsyncMutex::new(outgoing_rx),
                unsent: Mutex::new(None),
                queued: AtomicUsize::new(0),
                state,
                session: Mutex::new(None),
                session_counter: AtomicU64::new(1),
                connect_lock: AsyncMutex::new(()),
                messages,
                events,
                message_handlers: RwLock::new(Vec::new()),
                disconnect_handlers: RwLock::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// `host:port` this client connects to
    pub fn address(&self) -> String {
        self.inner.config.address()
    }

    /// Connect using the configured timeout
    pub async fn connect(&self) -> Result<()> {
        self.connect_with_timeout(self.inner.config.connect_timeout())
            .await
    }

    /// Open a connection and start the send and receive loops.
    ///
    /// A no-op if already connected. On failure the state returns to
    /// `Disconnected` and the error is a connect error (or `Closed`).
    pub async fn connect_with_timeout(&self, timeout: std::time::Duration) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::closed("client has been closed"));
        }
        let _connecting = self.inner.connect_lock.lock().await;
        if self.inner.session.lock().is_some() {
            return Ok(());
        }

        let address = self.address();
        self.inner.state.send_replace(ConnectionState::Connecting);
        info!("Connecting to wire server at {}", address);

        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.inner.state.send_replace(ConnectionState::Disconnected);
                return Err(TransportError::connection_with_source(
                    "Failed to connect",
                    address,
                    e,
                ));
            }
            Err(_) => {
                self.inner.state.send_replace(ConnectionState::Disconnected);
                return Err(TransportError::timeout(
                    format!("TCP connect to {address}"),
                    timeout.as_millis() as u64,
                ));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                self.inner.state.send_replace(ConnectionState::Disconnected);
                return Err(TransportError::connection_with_source(
                    "Connection dropped during setup",
                    address,
                    e,
                ));
            }
        };
        let (read_half, write_half) = stream.into_split();

        let ctx = SessionCtx {
            id: self.inner.session_counter.fetch_add(1, Ordering::SeqCst),
            cancel: CancellationToken::new(),
            ended: Arc::new(AtomicBool::new(false)),
        };
        {
            let mut session = self.inner.session.lock();
            // close() may have landed while the connect was in flight
            if self.is_closed() {
                self.inner.state.send_replace(ConnectionState::Disconnected);
                return Err(TransportError::closed("client closed while connecting"));
            }
            *session = Some(Session {
                id: ctx.id,
                peer,
                cancel: ctx.cancel.clone(),
                ended: Arc::clone(&ctx.ended),
            });
            self.inner.state.send_replace(ConnectionState::Connected);
        }

        tokio::spawn(receive_loop(Arc::clone(&self.inner), ctx.clone(), read_half));
        tokio::spawn(send_loop(Arc::clone(&self.inner), ctx, write_half));

        info!("Successfully connected to wire server at {}", peer);
        let _ = self.inner.events.send(ClientEvent::Connected { peer });
        Ok(())
    }

    /// Enqueue `envelope` for delivery. Never performs I/O and never waits
    /// for a connection; only a closed client rejects it.
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::closed("client has been closed"));
        }
        self.inner.queued.fetch_add(1, Ordering::SeqCst);
        self.inner.outgoing.send(envelope).map_err(|_| {
            self.inner.queued.fetch_sub(1, Ordering::SeqCst);
            TransportError::closed("outgoing queue closed")
        })
    }

    /// Build an envelope from `value` and enqueue it
    pub fn send_value<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> Result<()> {
        self.send(Envelope::from_value(topic, value)?)
    }

    /// Items waiting to be written, including a line retained after a
    /// failed write
    pub fn pending(&self) -> usize {
        self.inner.queued.load(Ordering::SeqCst) + usize::from(self.inner.unsent.lock().is_some())
    }

    /// Drop the current connection without raising `Disconnected`.
    /// Queued items stay queued for the next connection. Idempotent.
    pub fn disconnect(&self) {
        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            session.ended.store(true, Ordering::SeqCst);
            session.cancel.cancel();
            self.inner.state.send_replace(ConnectionState::Disconnected);
            info!(session_id = session.id, "Disconnected from {}", session.peer);
        }
    }

    /// Disconnect for good; later `connect`/`send` calls fail with `Closed`
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.disconnect();
            debug!("Wire client for {} closed", self.address());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Inbound envelopes from the server
    pub fn messages(&self) -> broadcast::Receiver<Envelope> {
        self.inner.messages.subscribe()
    }

    /// Lifecycle events
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Register a handler called for every inbound envelope.
    ///
    /// Runs on the receive task: it must not block.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.inner.message_handlers.write().push(Arc::new(handler));
    }

    /// Register a handler called once per lost session with its cause.
    ///
    /// Runs on whichever loop detected the loss: it must not block.
    pub fn on_disconnected<F>(&self, handler: F)
    where
        F: Fn(Option<&TransportError>) + Send + Sync + 'static,
    {
        self.inner.disconnect_handlers.write().push(Arc::new(handler));
    }
}

impl std::fmt::Debug for WireClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireClient")
            .field("address", &self.address())
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

impl ClientInner {
    fn dispatch(&self, envelope: Envelope) {
        let handlers = self.message_handlers.read().clone();
        for handler in &handlers {
            handler(&envelope);
        }
        // No receivers is fine
        let _ = self.messages.send(envelope);
    }

    /// Tear down `ctx`'s session after a loop failure. Only the first caller
    /// per session (and never after a caller-initiated disconnect) notifies.
    fn end_session(&self, ctx: &SessionCtx, cause: Option<TransportError>) {
        if ctx.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        ctx.cancel.cancel();

        {
            let mut session = self.session.lock();
            if session.as_ref().map(|s| s.id) == Some(ctx.id) {
                *session = None;
                self.state.send_replace(ConnectionState::Disconnected);
            }
        }

        match &cause {
            Some(e) => warn!(session_id = ctx.id, "Connection lost: {}", e),
            None => info!(session_id = ctx.id, "Server closed the connection"),
        }

        let handlers = self.disconnect_handlers.read().clone();
        for handler in &handlers {
            handler(cause.as_ref());
        }
        let _ = self.events.send(ClientEvent::Disconnected {
            cause: cause.map(Arc::new),
        });
    }
}

async fn receive_loop(inner: Arc<ClientInner>, ctx: SessionCtx, read_half: OwnedReadHalf) {
    let mut reader = LineReader::new(read_half, inner.config.max_line_bytes);

    let cause = loop {
        let next = tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            next = reader.next_line() => next,
        };

        match next {
            Ok(ReadLine::Line(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match Envelope::from_line(&line) {
                    Ok(envelope) => {
                        trace!(topic = %envelope.topic, "Received envelope");
                        inner.dispatch(envelope);
                    }
                    Err(e) => warn!("Skipping undecodable line: {}", e),
                }
            }
            Ok(ReadLine::Oversized(len)) => warn!(len, "Skipping oversized line"),
            Ok(ReadLine::InvalidUtf8) => warn!("Skipping non UTF-8 line"),
            Ok(ReadLine::Eof { partial }) => {
                if partial > 0 {
                    debug!(partial, "Discarded partial line at EOF");
                }
                break None;
            }
            Err(e) => break Some(TransportError::network_with_source("Read failed", e)),
        }
    };

    inner.end_session(&ctx, cause);
}

async fn send_loop(inner: Arc<ClientInner>, ctx: SessionCtx, mut write_half: OwnedWriteHalf) {
    // A previous session's loop may still hold the queue for a moment
    let mut outgoing = tokio::select! {
        _ = ctx.cancel.cancelled() => return,
        outgoing = inner.outgoing_rx.lock() => outgoing,
    };

    let retained = inner.unsent.lock().take();
    let mut next_line = retained;

    loop {
        let line = match next_line.take() {
            Some(line) => line,
            None => {
                let envelope = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => break,
                    envelope = outgoing.recv() => match envelope {
                        Some(envelope) => envelope,
                        None => break,
                    },
                };
                inner.queued.fetch_sub(1, Ordering::SeqCst);
                match envelope.to_line() {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(topic = %envelope.topic, "Skipping unserializable envelope: {}", e);
                        continue;
                    }
                }
            }
        };

        let result = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                // Interrupted mid-write; resend on the next connection
                *inner.unsent.lock() = Some(line);
                break;
            }
            result = write_half.write_all(line.as_bytes()) => result,
        };

        if let Err(e) = result {
            *inner.unsent.lock() = Some(line);
            drop(outgoing);
            inner.end_session(
                &ctx,
                Some(TransportError::network_with_source("Write failed", e)),
            );
            return;
        }
    }

    drop(outgoing);
    let _ = write_half.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WireConfig {
        WireConfig {
            port: 1,
            ..WireConfig::default()
        }
    }

    #[test]
    fn test_port_zero_is_rejected() {
        let err = WireClient::new(WireConfig {
            port: 0,
            ..WireConfig::default()
        })
        .unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_send_while_disconnected_queues() {
        let client = WireClient::new(config()).unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        client.send_value("topic", &1u32).unwrap();
        client.send_value("topic", &2u32).unwrap();
        assert_eq!(client.pending(), 2);
    }

    #[test]
    fn test_send_value_rejects_empty_topic() {
        let client = WireClient::new(config()).unwrap();
        let err = client.send_value("", &1u32).unwrap_err();
        assert_eq!(err.category(), "protocol");
        assert_eq!(client.pending(), 0);
    }

    #[tokio::test]
    async fn test_closed_client_rejects_work() {
        let client = WireClient::new(config()).unwrap();
        client.close();
        client.close();
        assert!(client.is_closed());
        assert_eq!(client.send_value("t", &1u32).unwrap_err().category(), "closed");
        assert_eq!(client.connect().await.unwrap_err().category(), "closed");
    }

    #[test]
    fn test_disconnect_without_session_is_noop() {
        let client = WireClient::new(config()).unwrap();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
