//! Durable-settings error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    #[error("failed to persist settings: {message}")]
    PersistFailed { message: String },

    #[error("corrupted settings document: {message}")]
    CorruptedData { message: String },
}
