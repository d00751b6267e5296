//! Agent role: wire client kept connected to a hub
//!
//! Reconnects with backoff whenever the session drops, reports host
//! heartbeats and logs what the hub forwards.

use std::sync::atomic::{AtomicBool, Ordering};

use fleet_config::{BusConfig, HeartbeatConfig};
use fleet_network::{maintain_connection, ReconnectPolicy, WireClient};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::heartbeat::Heartbeat;
use crate::supervise::track_supervised;

pub struct Agent {
    client: WireClient,
    policy: ReconnectPolicy,
    heartbeat: Option<HeartbeatConfig>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    started: AtomicBool,
}

impl Agent {
    pub fn new(config: &BusConfig) -> Result<Self> {
        let client = WireClient::new(config.wire.clone())?;
        let heartbeat = config.heartbeat.enabled.then(|| config.heartbeat.clone());

        Ok(Self {
            client,
            policy: ReconnectPolicy::from(&config.reconnect),
            heartbeat,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            started: AtomicBool::new(false),
        })
    }

    pub fn client(&self) -> &WireClient {
        &self.client
    }

    /// Start the connection supervisor, heartbeat and inbound log.
    /// Returns immediately; the first connection is made in the background.
    /// Calling it again is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut messages = self.client.messages();
        let cancel = self.cancel.clone();
        track_supervised(&self.tasks, "agent-inbound-log", async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = messages.recv() => match received {
                        Ok(envelope) => info!(
                            topic = %envelope.topic,
                            payload = envelope.payload_raw().unwrap_or("null"),
                            "Received"
                        ),
                        Err(RecvError::Lagged(skipped)) => warn!(skipped, "Inbound log fell behind"),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        let client = self.client.clone();
        let policy = self.policy;
        let cancel = self.cancel.clone();
        track_supervised(&self.tasks, "agent-connection", async move {
            if let Err(e) = maintain_connection(&client, &policy, &cancel).await {
                error!("Connection supervisor gave up: {}", e);
            }
        });

        if let Some(config) = self.heartbeat.clone() {
            let heartbeat = Heartbeat::new(self.client.clone(), config);
            track_supervised(&self.tasks, "heartbeat", heartbeat.run(self.cancel.clone()));
        }

        info!("Agent started for hub at {}", self.client.address());
    }

    /// Stop every background task and close the client
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.client.close();
        info!("Agent stopped");
    }
}
