//! Install and rollback error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum InstallError {
    #[error("staged package missing at {path}")]
    StagingMissing { path: String },

    #[error("failed to write slot metadata: {message}")]
    MetadataWriteFailed { message: String },

    #[error("failed to rotate package slots: {message}")]
    SlotSwapFailed { message: String },

    #[error("filesystem operation '{operation}' failed on {path}: {message}")]
    FilesystemError {
        operation: String,
        path: String,
        message: String,
    },
}

#[derive(Debug, Clone, Error)]
pub enum RollbackError {
    /// There is no previous package to restore (first-ever install). The
    /// only recovery is the application's built-in bundled package, which
    /// is a host concern.
    #[error("no backup package available to roll back to")]
    NoBackupAvailable,

    #[error("failed to restore previous package: {message}")]
    RestoreFailed { message: String },
}
