//! Bus Configuration Module
//!
//! Sections mirror the components that consume them: `wire` for the TCP
//! server/client pair, `broker` for the in-process registry, `reconnect` for
//! the caller-owned retry helper, `forwarding` and `heartbeat` for the relay
//! service. Durations are stored as integer milliseconds/seconds in TOML and
//! exposed as [`Duration`] accessors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config_crate::{Config, Environment, File, Map};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

/// Base file read when no explicit path is supplied
pub const DEFAULT_CONFIG_PATH: &str = "config/bus.toml";

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "FLEET";

/// Complete bus configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub global: GlobalConfig,
    pub wire: WireConfig,
    pub broker: BrokerConfig,
    pub reconnect: ReconnectConfig,
    pub forwarding: ForwardingConfig,
    pub heartbeat: HeartbeatConfig,
}

/// Process-wide settings consumed by the binary only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable text
    pub json_logs: bool,
}

/// TCP line-protocol settings shared by `WireServer` and `WireClient`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    pub host: String,
    /// Server binds here (0 = ephemeral); clients connect here
    pub port: u16,
    /// History entries replayed to each newly accepted peer
    pub replay_count: usize,
    /// Server-side history capacity
    pub history_size: usize,
    pub connect_timeout_ms: u64,
    /// Advisory idle window on server reads; expiry never disconnects
    pub read_idle_timeout_secs: u64,
    /// Longer lines are dropped like malformed JSON
    pub max_line_bytes: usize,
    /// Per-connection outbound line queue on the server
    pub outbound_queue: usize,
}

/// In-process broker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Per-topic history capacity
    pub history_size: usize,
    /// Per-subscriber live queue; a full queue misses messages
    pub subscriber_queue: usize,
}

/// Exponential backoff for the caller-owned reconnect helper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

/// Broker topics relayed to wire peers by the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Fixed channels (console output, service status)
    pub channels: Vec<String>,
    /// Per-service topics, one per configured service name
    pub services: Vec<String>,
}

/// Periodic host liveness report sent by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub service_name: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            replay_count: 20,
            history_size: 100,
            connect_timeout_ms: 5_000,
            read_idle_timeout_secs: 300,
            max_line_bytes: 1024 * 1024,
            outbound_queue: 1024,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            history_size: 50,
            subscriber_queue: 1024,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            channels: vec!["ConsoleLogMessage".to_string(), "ServiceStatus".to_string()],
            services: Vec::new(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1_000,
            service_name: "fleet-agent".to_string(),
        }
    }
}

impl BusConfig {
    /// Load configuration from files with environment overrides.
    ///
    /// An explicit `base_path` must exist; the default path is optional so a
    /// bare checkout runs on built-in defaults.
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        Self::load_with_env(base_path, environment, None)
    }

    /// Same as [`BusConfig::load`], with an explicit environment map in place
    /// of the process environment (`None` reads the process environment).
    pub fn load_with_env(
        base_path: Option<&Path>,
        environment: Option<&str>,
        env_vars: Option<Map<String, String>>,
    ) -> Result<Self> {
        let (base, required) = match base_path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let mut builder = Config::builder().add_source(File::from(base.as_path()).required(required));

        // Add environment-specific overrides if specified
        if let Some(env) = environment {
            let env_file = base
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("environments")
                .join(format!("{env}.toml"));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        // Override with environment variables (FLEET_ prefix)
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("forwarding.channels")
                .with_list_parse_key("forwarding.services")
                .source(env_vars),
        );

        let config = builder
            .build()
            .map_err(|e| ConfigError::load("failed to build configuration", e))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| ConfigError::load("failed to deserialize configuration", e))?;

        debug!("Effective bus configuration: {:?}", config);
        Ok(config)
    }

    /// Reject values no component can run with. Call before starting loops.
    pub fn validate(&self) -> Result<()> {
        self.global.validate()?;
        self.wire.validate()?;
        self.broker.validate()?;
        self.reconnect.validate()?;
        self.forwarding.validate()?;
        self.heartbeat.validate()
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::invalid("global.log_level", "must not be empty"));
        }
        Ok(())
    }
}

impl WireConfig {
    /// `host:port` for binding or connecting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.read_idle_timeout_secs)
    }

    /// Checks shared by server and client. Port 0 is allowed (ephemeral bind).
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("wire.host", "must not be empty"));
        }
        if self.history_size == 0 {
            return Err(ConfigError::invalid("wire.history_size", "must be greater than 0"));
        }
        if self.replay_count > self.history_size {
            return Err(ConfigError::invalid(
                "wire.replay_count",
                format!(
                    "{} exceeds history_size {}",
                    self.replay_count, self.history_size
                ),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::invalid("wire.connect_timeout_ms", "must be greater than 0"));
        }
        if self.read_idle_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "wire.read_idle_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::invalid("wire.max_line_bytes", "must be greater than 0"));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::invalid("wire.outbound_queue", "must be greater than 0"));
        }
        Ok(())
    }

    /// Client-side checks: everything in [`WireConfig::validate`] plus a real port
    pub fn validate_for_client(&self) -> Result<()> {
        self.validate()?;
        if self.port == 0 {
            return Err(ConfigError::invalid("wire.port", "clients need a non-zero port"));
        }
        Ok(())
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history_size == 0 {
            return Err(ConfigError::invalid("broker.history_size", "must be greater than 0"));
        }
        if self.subscriber_queue == 0 {
            return Err(ConfigError::invalid(
                "broker.subscriber_queue",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl ReconnectConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms == 0 {
            return Err(ConfigError::invalid(
                "reconnect.initial_delay_ms",
                "must be greater than 0",
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ConfigError::invalid(
                "reconnect.max_delay_ms",
                "must not be smaller than initial_delay_ms",
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "reconnect.multiplier",
                "must be a finite value >= 1.0",
            ));
        }
        Ok(())
    }
}

impl ForwardingConfig {
    /// Fixed channels followed by service topics, duplicates removed
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::with_capacity(self.channels.len() + self.services.len());
        for topic in self.channels.iter().chain(self.services.iter()) {
            if !topics.contains(topic) {
                topics.push(topic.clone());
            }
        }
        topics
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(blank) = self
            .channels
            .iter()
            .chain(self.services.iter())
            .find(|topic| topic.trim().is_empty())
        {
            return Err(ConfigError::invalid(
                "forwarding",
                format!("topic names must not be empty (got {blank:?})"),
            ));
        }
        Ok(())
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.interval_ms == 0 {
            return Err(ConfigError::invalid("heartbeat.interval_ms", "must be greater than 0"));
        }
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::invalid("heartbeat.service_name", "must not be empty"));
        }
        Ok(())
    }
}
