//! Hub role: broker + wire server + forwarder
//!
//! Producers in the hub process publish on the broker; the forwarder pushes
//! the configured channels to every wire peer. Traffic from peers is relayed
//! between peers by the server and logged here, never pushed back into the
//! forwarded broker topics.

use std::net::SocketAddr;
use std::sync::Arc;

use fleet_broker::Broker;
use fleet_config::BusConfig;
use fleet_network::WireServer;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::forwarder::EnvelopeForwarder;
use crate::supervise::track_supervised;

pub struct Hub {
    broker: Broker,
    server: Arc<WireServer>,
    forwarder: EnvelopeForwarder,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Hub {
    pub fn new(config: &BusConfig) -> Result<Self> {
        let broker = Broker::new(config.broker.clone())?;
        let server = Arc::new(WireServer::new(config.wire.clone())?);
        let forwarder = EnvelopeForwarder::new(broker.clone(), Arc::clone(&server), &config.forwarding);

        Ok(Self {
            broker,
            server,
            forwarder,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// Bind the server and start forwarding. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr> {
        let addr = self.server.start().await?;
        self.forwarder.start();

        let mut inbound = self.server.inbound();
        let cancel = self.cancel.clone();
        track_supervised(&self.tasks, "hub-inbound-log", async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = inbound.recv() => match received {
                        Ok(envelope) => debug!(
                            topic = %envelope.topic,
                            payload_type = %envelope.payload_type,
                            "Peer envelope relayed"
                        ),
                        Err(RecvError::Lagged(skipped)) => warn!(skipped, "Inbound log fell behind"),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        info!("Hub listening on {}", addr);
        Ok(addr)
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn server(&self) -> &Arc<WireServer> {
        &self.server
    }

    /// Stop forwarding, close every peer and end broker subscriptions
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.forwarder.stop().await;
        self.tasks.close();
        self.tasks.wait().await;
        self.server.stop().await;
        self.broker.close();
        info!("Hub stopped");
    }
}
