#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the updraft update engine
//!
//! This crate provides fine-grained error types organized by domain.
//! All error types implement Clone for easier handling across the
//! async boundaries of the engine.

use thiserror::Error;

pub mod config;
pub mod download;
pub mod install;
pub mod network;
pub mod settings;
pub mod storage;

pub use config::ConfigError;
pub use download::{DownloadError, IntegrityError, SignatureError};
pub use install::{InstallError, RollbackError};
pub use network::{NetworkError, ReportError, ServerError};
pub use settings::SettingsError;
pub use storage::StorageError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("server error: {0}")]
    Server(#[from] ServerError),

    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("install error: {0}")]
    Install(#[from] InstallError),

    #[error("rollback error: {0}")]
    Rollback(#[from] RollbackError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("status report error: {0}")]
    Report(#[from] ReportError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }

    /// Whether this error left the previously-current package usable.
    ///
    /// Every acquisition, download and verification failure is recoverable:
    /// staged data is discarded and the running package is untouched. A
    /// rollback with no backup is the one condition the host must escalate.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Rollback(RollbackError::NoBackupAvailable))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

/// Result type alias for updraft operations
pub type Result<T> = std::result::Result<T, Error>;
