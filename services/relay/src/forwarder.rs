//! # Envelope Forwarder - Broker to Wire Bridge
//!
//! Subscribes to each forwarded channel on the in-process broker and
//! broadcasts every envelope to all wire peers. Broadcasting also records the
//! envelope in the server history, so peers that connect later get it as
//! replay.
//!
//! ```text
//! Broker["ConsoleLogMessage"] ──► forward task ──┐
//! Broker["ServiceStatus"]     ──► forward task ──┼──► WireServer::broadcast ──► peers
//! Broker[<service>]           ──► forward task ──┘
//! ```
//!
//! One supervised task per channel: a slow or failing channel never stalls
//! the others.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fleet_broker::Broker;
use fleet_codec::Envelope;
use fleet_config::ForwardingConfig;
use fleet_network::WireServer;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::supervise::track_supervised;

pub struct EnvelopeForwarder {
    broker: Broker,
    server: Arc<WireServer>,
    channels: Vec<String>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    started: AtomicBool,
}

impl EnvelopeForwarder {
    pub fn new(broker: Broker, server: Arc<WireServer>, config: &ForwardingConfig) -> Self {
        Self {
            broker,
            server,
            channels: config.topics(),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Channels this forwarder relays, in subscription order
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Subscribe to every channel and start forwarding. Subscriptions are
    /// registered before this returns. Calling it again is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        for channel in &self.channels {
            let envelopes = self.broker.subscribe_envelopes(channel);
            track_supervised(
                &self.tasks,
                format!("forward:{channel}"),
                forward_channel(
                    channel.clone(),
                    envelopes,
                    Arc::clone(&self.server),
                    self.cancel.clone(),
                ),
            );
        }

        info!(channels = ?self.channels, "Envelope forwarder started");
    }

    /// Stop every forwarding task and wait for them to finish
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        debug!("Envelope forwarder stopped");
    }
}

impl Drop for EnvelopeForwarder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn forward_channel<S>(
    channel: String,
    mut envelopes: S,
    server: Arc<WireServer>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Envelope> + Unpin,
{
    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => break,
            next = envelopes.next() => match next {
                Some(envelope) => envelope,
                None => {
                    debug!(topic = %channel, "Broker subscription ended");
                    break;
                }
            },
        };

        let delivered = server.broadcast(envelope);
        trace!(topic = %channel, delivered, "Forwarded envelope");
    }
}
