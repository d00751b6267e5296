//! Periodic host liveness reports

use std::time::Instant;

use fleet_config::HeartbeatConfig;
use fleet_network::{ConnectionState, TransportError, WireClient};
use fleet_types::{topics, WorkerStatus};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Sends a `HostHeartbeat` [`WorkerStatus`] every `interval` while the
/// client is connected. Beats are skipped while disconnected.
pub struct Heartbeat {
    client: WireClient,
    config: HeartbeatConfig,
    process_id: u32,
    started: Instant,
}

impl Heartbeat {
    pub fn new(client: WireClient, config: HeartbeatConfig) -> Self {
        Self {
            client,
            config,
            process_id: std::process::id(),
            started: Instant::now(),
        }
    }

    /// Status for this instant
    pub fn status(&self) -> WorkerStatus {
        let mut status = WorkerStatus::healthy(self.config.service_name.clone(), self.process_id);
        status.uptime_seconds = Some(self.started.elapsed().as_secs_f64());
        status
    }

    /// Queue one heartbeat regardless of connection state
    pub fn beat(&self) -> Result<()> {
        self.client.send_value(topics::HOST_HEARTBEAT, &self.status())?;
        Ok(())
    }

    /// Beat until cancelled or the client is closed
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            service = %self.config.service_name,
            interval_ms = self.config.interval_ms,
            "Heartbeat started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.client.state() != ConnectionState::Connected {
                continue;
            }
            match self.client.send_value(topics::HOST_HEARTBEAT, &self.status()) {
                Ok(()) => debug!("Heartbeat queued"),
                Err(TransportError::Closed { .. }) => break,
                Err(e) => warn!("Failed to queue heartbeat: {}", e),
            }
        }
        debug!("Heartbeat stopped");
    }
}
