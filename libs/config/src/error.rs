//! Configuration errors. All of them are fatal at startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is present but unusable
    #[error("Invalid configuration for '{field}': {message}")]
    Invalid { field: String, message: String },

    /// Sources could not be read, merged or deserialized
    #[error("Failed to load configuration: {message}")]
    Load {
        message: String,
        #[source]
        source: config_crate::ConfigError,
    },

    /// Effective configuration could not be rendered back to TOML
    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

impl ConfigError {
    /// Create an invalid-value error for `field`
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a load error wrapping the underlying source failure
    pub fn load(message: impl Into<String>, source: config_crate::ConfigError) -> Self {
        Self::Load {
            message: message.into(),
            source,
        }
    }

    /// Field name for [`ConfigError::Invalid`], `None` otherwise
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
