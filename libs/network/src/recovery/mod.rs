//! # Reconnection
//!
//! The client never reconnects on its own. These caller-owned helpers drive
//! [`WireClient::connect`] with exponential backoff:
//!
//! - [`connect_with_retry`]: one successful connect, or cancellation
//! - [`maintain_connection`]: connect, wait for a `Disconnected` event,
//!   repeat until cancelled
//!
//! The delay for attempt `n` is `initial × multiplier^n`, clamped to `max`.

use std::time::Duration;

use fleet_config::ReconnectConfig;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transports::tcp::client::{ClientEvent, ConnectionState, WireClient};
use crate::{Result, TransportError};

/// Exponential backoff between connect attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    /// 1s doubling, capped at 30s
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            multiplier: config.multiplier,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait after failed attempt number `attempt` (0-indexed)
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let max_secs = self.max_delay.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Call `connect` until it succeeds, backing off between failures.
///
/// Returns [`TransportError::Cancelled`] if `cancel` fires first, or the
/// error itself if it is not retryable (closed client, bad configuration).
pub async fn connect_with_retry(
    client: &WireClient,
    policy: &ReconnectPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut attempt: u32 = 0;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::cancelled("connect")),
            result = client.connect() => result,
        };

        match result {
            Ok(()) => {
                if attempt > 0 {
                    info!("Connected to {} after {} retries", client.address(), attempt);
                }
                return Ok(());
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                let delay = policy.next_delay(attempt);
                warn!(
                    "Connect attempt {} to {} failed: {}; retrying in {:?}",
                    attempt + 1,
                    client.address(),
                    e,
                    delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(TransportError::cancelled("connect")),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

/// Keep `client` connected until `cancel` fires.
///
/// Returns `Ok(())` on cancellation; any other return is a non-retryable
/// failure.
pub async fn maintain_connection(
    client: &WireClient,
    policy: &ReconnectPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    // Subscribe before the first connect so no disconnect is missed
    let mut events = client.events();

    loop {
        match connect_with_retry(client, policy, cancel).await {
            Ok(()) => {}
            Err(TransportError::Cancelled { .. }) => return Ok(()),
            Err(e) => return Err(e),
        }

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                event = events.recv() => event,
            };
            match event {
                Ok(ClientEvent::Disconnected { cause }) => {
                    match cause {
                        Some(cause) => warn!("Connection to {} lost: {}", client.address(), cause),
                        None => info!("Connection to {} closed by peer", client.address()),
                    }
                    break;
                }
                Ok(ClientEvent::Connected { .. }) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Missed {} client events", skipped);
                    if client.state() == ConnectionState::Disconnected {
                        break;
                    }
                }
                Err(RecvError::Closed) => {
                    return Err(TransportError::closed("client event channel closed"))
                }
            }
        }
    }
}
