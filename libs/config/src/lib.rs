//! # Fleet Bus Configuration
//!
//! Explicit configuration values for every bus component. Nothing here is
//! global: the binary loads one [`BusConfig`], validates it, and hands each
//! section to the component that needs it by value.
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults (`Default` impls on every section)
//! 2. Base TOML file (`config/bus.toml` unless overridden)
//! 3. Environment file `<base dir>/environments/<env>.toml`, if present
//! 4. `FLEET_`-prefixed environment variables, `__` between path segments
//!    (`FLEET_WIRE__REPLAY_COUNT=50`)
//!
//! ## Usage
//!
//! ```rust
//! use fleet_config::BusConfig;
//!
//! let config = BusConfig::default();
//! config.validate().unwrap();
//! assert_eq!(config.wire.replay_count, 20);
//! assert_eq!(config.broker.history_size, 50);
//! ```

pub mod bus_config;
pub mod error;

pub use bus_config::{
    BrokerConfig, BusConfig, ForwardingConfig, GlobalConfig, HeartbeatConfig, ReconnectConfig,
    WireConfig, DEFAULT_CONFIG_PATH, ENV_PREFIX,
};
pub use error::{ConfigError, Result};
