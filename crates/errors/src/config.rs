//! Configuration error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {message}")]
    Invalid { message: String },

    #[error("configuration file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse configuration: {message}")]
    ParseFailed { message: String },
}
