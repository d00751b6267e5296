//! Well-known payloads carried on the bus
//!
//! The transport never inspects payloads; these types are what the fleet's
//! producers (process supervisor, workers) publish and what observers
//! (scheduler, dashboards) decode on demand:
//! - Worker reports: [`WorkerStatus`], also used for host heartbeats
//! - Aggregated service view: [`ServiceStatus`] with its [`ServiceState`]
//! - Captured process output: [`ConsoleLogMessage`]
//!
//! All fields serialize as camelCase to match the envelope wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Topic names shared by producers and observers.
pub mod topics {
    /// Aggregated [`super::ServiceStatus`] updates.
    pub const SERVICE_STATUS: &str = "ServiceStatus";
    /// Captured stdout/stderr lines as [`super::ConsoleLogMessage`].
    pub const CONSOLE_LOG: &str = "ConsoleLogMessage";
    /// Periodic liveness reports from connected hosts.
    pub const HOST_HEARTBEAT: &str = "HostHeartbeat";
}

/// Lifecycle state of a supervised service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ServiceState {
    Initializing,
    Running,
    Suspended,
    Stopped,
    Failed,
    #[default]
    Unknown,
}

/// Status report emitted by a single worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    /// Logical name of the service emitting this status
    pub service_name: String,
    /// Process ID of the worker
    pub process_id: u32,
    /// When this status was recorded
    pub timestamp: DateTime<Utc>,
    /// Whether the worker considers itself healthy
    pub healthy: bool,
    /// Arbitrary diagnostic details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Human-readable description of current status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Worker uptime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<f64>,
}

impl WorkerStatus {
    /// Healthy status stamped now, with no details.
    pub fn healthy(service_name: impl Into<String>, process_id: u32) -> Self {
        Self {
            service_name: service_name.into(),
            process_id,
            timestamp: Utc::now(),
            healthy: true,
            details: None,
            message: None,
            uptime_seconds: None,
        }
    }
}

/// Aggregated view of one configured service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub running_instances: u32,
    pub state: ServiceState,
    #[serde(default)]
    pub last_report_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_healthy: Option<bool>,
}

/// One line of captured process output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLogMessage {
    /// Name of the process
    pub name: String,
    /// Process ID, `-1` when unknown
    #[serde(default = "unknown_pid")]
    pub pid: i64,
    pub is_healthy: bool,
    /// The captured stdout/stderr text
    #[serde(default)]
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

fn unknown_pid() -> i64 {
    -1
}
