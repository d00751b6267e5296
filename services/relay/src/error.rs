//! Error types for the relay service

use fleet_broker::BrokerError;
use fleet_codec::CodecError;
use fleet_config::ConfigError;
use fleet_network::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, RelayError>;
