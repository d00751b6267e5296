//! Pumps between a wire client and the in-process broker
//!
//! - [`ingest`]: every envelope the client receives is pushed into the broker
//!   under its own topic
//! - [`uplink`]: every envelope published on a broker topic is sent out
//!   through the client
//!
//! Running both over the same topics in one process loops traffic back to
//! its origin; pick one direction per topic.

use fleet_broker::Broker;
use fleet_network::{TransportError, WireClient};
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::supervise::spawn_supervised;

/// Push envelopes received by `client` into `broker` until cancelled or the
/// client's receive channel closes.
pub fn ingest(client: &WireClient, broker: &Broker, cancel: CancellationToken) -> JoinHandle<()> {
    let mut messages = client.messages();
    let broker = broker.clone();

    spawn_supervised("ingest", async move {
        loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => break,
                received = messages.recv() => match received {
                    Ok(envelope) => envelope,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Ingest fell behind, envelopes dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            match broker.push_envelope(&envelope) {
                Ok(delivered) => trace!(topic = %envelope.topic, delivered, "Ingested envelope"),
                Err(e) => warn!(topic = %envelope.topic, "Failed to ingest envelope: {}", e),
            }
        }
        debug!("Ingest stopped");
    })
}

/// Send every envelope published on `topic` through `client` until
/// cancelled or the client is closed.
///
/// Subscribes before returning, so nothing published afterwards is missed.
/// Envelopes queue in the client while it is disconnected.
pub fn uplink(
    broker: &Broker,
    topic: &str,
    client: &WireClient,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut envelopes = broker.subscribe_envelopes(topic);
    let client = client.clone();
    let topic = topic.to_string();

    spawn_supervised(format!("uplink:{topic}"), async move {
        loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => break,
                next = envelopes.next() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            match client.send(envelope) {
                Ok(()) => {}
                Err(TransportError::Closed { .. }) => {
                    debug!(topic = %topic, "Client closed, uplink stopping");
                    break;
                }
                Err(e) => warn!(topic = %topic, "Failed to send envelope: {}", e),
            }
        }
        debug!(topic = %topic, "Uplink stopped");
    })
}
