use fleet_codec::CodecError;
use fleet_config::ConfigError;
use thiserror::Error;

/// Broker errors. Backpressure is never an error.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Invalid broker configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Envelope error: {0}")]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
