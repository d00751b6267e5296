//! # Wire Server - Replay and Relay over TCP
//!
//! Accepts many peers on one listener. Every peer gets the most recent
//! history first, then sees every envelope any *other* peer sends, plus
//! everything the host process [`WireServer::broadcast`]s.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! Accepted ──► Replaying ──► Relaying ──► Closed
//!                  │             │
//!                  └─────────────┴──── I/O error, EOF or stop()
//! ```
//!
//! Each connection runs two tasks: a read task (decode, relay, advisory
//! idle timeout) and a write task draining a bounded line queue. A failure
//! in either removes only that connection.
//!
//! ## Ordering at Admission
//!
//! Replay snapshot + registration and history append + fan-out are
//! serialized by one short admission lock, so a joining peer never misses
//! or double-receives an envelope published while it was being admitted.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use fleet_codec::Envelope;
use fleet_config::WireConfig;
use fleet_types::BoundedHistory;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::framing::{LineReader, ReadLine};
use crate::{Result, TransportError};

/// Unique identifier for server-side connections
pub type ConnectionId = u64;

struct Connection {
    peer: SocketAddr,
    outbound: mpsc::Sender<Arc<str>>,
    cancel: CancellationToken,
}

struct Running {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

struct ServerInner {
    config: WireConfig,
    history: BoundedHistory<Envelope>,
    replay_count: AtomicUsize,
    connections: DashMap<ConnectionId, Connection>,
    connection_counter: AtomicU64,
    admission: parking_lot::Mutex<()>,
    inbound: broadcast::Sender<Envelope>,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
}

/// TCP relay server with replay history
pub struct WireServer {
    inner: Arc<ServerInner>,
    running: AsyncMutex<Option<Running>>,
}

impl WireServer {
    /// Create a stopped server. Fails fast on invalid configuration.
    pub fn new(config: WireConfig) -> Result<Self> {
        config.validate()?;
        let history = BoundedHistory::new(config.history_size)?;
        let (inbound, _) = broadcast::channel(config.outbound_queue);

        Ok(Self {
            inner: Arc::new(ServerInner {
                replay_count: AtomicUsize::new(config.replay_count.min(history.capacity())),
                history,
                connections: DashMap::new(),
                connection_counter: AtomicU64::new(1),
                admission: parking_lot::Mutex::new(()),
                inbound,
                local_addr: parking_lot::Mutex::new(None),
                config,
            }),
            running: AsyncMutex::new(None),
        })
    }

    /// Bind and start accepting. Idempotent: returns the bound address of
    /// an already running server.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(running) = running.as_ref() {
            return Ok(running.local_addr);
        }

        let address = self.inner.config.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            TransportError::connection_with_source("Failed to bind listener", address.clone(), e)
        })?;
        let local_addr = listener.local_addr()?;
        info!("Wire server listening on {}", local_addr);

        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();
        tasks.spawn(accept_loop(
            Arc::clone(&self.inner),
            listener,
            cancel.clone(),
            tasks.clone(),
        ));

        *self.inner.local_addr.lock() = Some(local_addr);
        *running = Some(Running {
            local_addr,
            cancel,
            tasks,
        });
        Ok(local_addr)
    }

    /// Stop accepting, close every connection and wait for their tasks.
    /// Idempotent. History is kept; the server may be started again.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        running.cancel.cancel();
        running.tasks.close();
        running.tasks.wait().await;

        self.inner.connections.clear();
        *self.inner.local_addr.lock() = None;
        info!("Wire server on {} stopped", running.local_addr);
    }

    /// Send `envelope` to every connected peer and record it in history.
    /// Returns the number of peers it was queued for.
    pub fn broadcast(&self, envelope: Envelope) -> usize {
        self.inner.relay(None, envelope)
    }

    /// Envelopes received from peers, in arrival order per peer
    pub fn inbound(&self) -> broadcast::Receiver<Envelope> {
        self.inner.inbound.subscribe()
    }

    /// Change how many history entries later peers receive on connect.
    /// Capped at the history capacity.
    pub fn set_replay_count(&self, replay_count: usize) {
        let replay_count = replay_count.min(self.inner.history.capacity());
        self.inner.replay_count.store(replay_count, Ordering::Relaxed);
    }

    pub fn replay_count(&self) -> usize {
        self.inner.replay_count.load(Ordering::Relaxed)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    /// History snapshot, oldest first
    pub fn history(&self) -> Vec<Envelope> {
        self.inner.history.snapshot()
    }

    pub fn config(&self) -> &WireConfig {
        &self.inner.config
    }
}

impl Drop for WireServer {
    fn drop(&mut self) {
        // Tasks hold the inner state alive; make sure they wind down
        if let Some(running) = self.running.get_mut().as_ref() {
            running.cancel.cancel();
        }
    }
}

impl ServerInner {
    /// Record `envelope` and queue it for every peer except `origin`
    fn relay(&self, origin: Option<ConnectionId>, envelope: Envelope) -> usize {
        let line: Arc<str> = match envelope.to_line() {
            Ok(line) => line.into(),
            Err(e) => {
                warn!(topic = %envelope.topic, "Dropping unencodable envelope: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let _admission = self.admission.lock();
            self.history.enqueue(envelope);

            for entry in self.connections.iter() {
                let id = *entry.key();
                if Some(id) == origin {
                    continue;
                }
                match entry.outbound.try_send(Arc::clone(&line)) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(connection_id = id, peer = %entry.peer, "Outbound queue full, message dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
                }
            }
        }

        for id in dead {
            self.remove_connection(id);
        }
        trace!(?origin, delivered, "Relayed envelope");
        delivered
    }

    /// Register a peer and queue its replay under the admission lock
    fn admit(&self, peer: SocketAddr, cancel: CancellationToken) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let id = self.connection_counter.fetch_add(1, Ordering::SeqCst);
        let replay_count = self
            .replay_count
            .load(Ordering::Relaxed)
            .min(self.history.capacity());
        // Room for the whole replay on top of the steady-state queue
        let (outbound, receiver) =
            mpsc::channel(self.config.outbound_queue.saturating_add(replay_count));

        let _admission = self.admission.lock();
        let replay = self.history.latest(replay_count);
        let mut replayed = 0;
        for envelope in &replay {
            match envelope.to_line() {
                Ok(line) => {
                    if outbound.try_send(line.into()).is_ok() {
                        replayed += 1;
                    }
                }
                Err(e) => warn!(connection_id = id, "Skipping unencodable history entry: {}", e),
            }
        }
        self.connections.insert(
            id,
            Connection {
                peer,
                outbound,
                cancel,
            },
        );
        debug!(connection_id = id, %peer, replayed, "Replaying history");
        (id, receiver)
    }

    fn remove_connection(&self, id: ConnectionId) {
        if let Some((_, connection)) = self.connections.remove(&id) {
            connection.cancel.cancel();
            info!(connection_id = id, peer = %connection.peer, "Connection closed");
        }
    }
}

async fn accept_loop(
    inner: Arc<ServerInner>,
    listener: TcpListener,
    cancel: CancellationToken,
    tasks: TaskTracker,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                handle_connection(&inner, stream, peer, cancel.child_token(), &tasks);
            }
            Err(e) => {
                // Transient (e.g. EMFILE); keep the loop alive
                warn!("Accept failed: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
    debug!("Accept loop ended");
}

fn handle_connection(
    inner: &Arc<ServerInner>,
    stream: TcpStream,
    peer: SocketAddr,
    cancel: CancellationToken,
    tasks: &TaskTracker,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }
    let (read_half, write_half) = stream.into_split();
    let (id, receiver) = inner.admit(peer, cancel.clone());
    info!(connection_id = id, %peer, "Accepted connection");

    tasks.spawn(write_loop(
        Arc::clone(inner),
        id,
        write_half,
        receiver,
        cancel.clone(),
    ));
    tasks.spawn(read_loop(Arc::clone(inner), id, read_half, cancel));
}

async fn read_loop(
    inner: Arc<ServerInner>,
    id: ConnectionId,
    read_half: OwnedReadHalf,
    cancel: CancellationToken,
) {
    let mut reader = LineReader::new(read_half, inner.config.max_line_bytes);
    let idle = inner.config.read_idle_timeout();
    let mut received = 0u64;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = tokio::time::timeout(idle, reader.next_line()) => next,
        };

        match next {
            Err(_) => {
                debug!(connection_id = id, "No data for {:?}, connection kept", idle);
            }
            Ok(Ok(ReadLine::Line(line))) => {
                if line.trim().is_empty() {
                    continue;
                }
                match Envelope::from_line(&line) {
                    Ok(envelope) => {
                        received += 1;
                        // No receivers is fine
                        let _ = inner.inbound.send(envelope.clone());
                        inner.relay(Some(id), envelope);
                    }
                    Err(e) => warn!(connection_id = id, "Dropping malformed line: {}", e),
                }
            }
            Ok(Ok(ReadLine::Oversized(len))) => {
                warn!(connection_id = id, len, "Dropping oversized line");
            }
            Ok(Ok(ReadLine::InvalidUtf8)) => {
                warn!(connection_id = id, "Dropping non UTF-8 line");
            }
            Ok(Ok(ReadLine::Eof { partial })) => {
                if partial > 0 {
                    debug!(connection_id = id, partial, "Discarded partial line at EOF");
                }
                break;
            }
            Ok(Err(e)) => {
                warn!(connection_id = id, "Read error: {}", e);
                break;
            }
        }
    }

    debug!(connection_id = id, received, "Read task ended");
    inner.remove_connection(id);
}

async fn write_loop(
    inner: Arc<ServerInner>,
    id: ConnectionId,
    mut write_half: OwnedWriteHalf,
    mut receiver: mpsc::Receiver<Arc<str>>,
    cancel: CancellationToken,
) {
    let mut written = 0u64;
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = receiver.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = write_half.write_all(line.as_bytes()) => result,
        };
        if let Err(e) = result {
            warn!(connection_id = id, "Failed to write to connection: {}", e);
            break;
        }
        written += 1;
    }

    let _ = write_half.shutdown().await;
    debug!(connection_id = id, written, "Write task ended");
    inner.remove_connection(id);
}
