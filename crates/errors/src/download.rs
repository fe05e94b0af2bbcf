//! Download and package-verification error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error("download stream failed: {0}")]
    StreamFailed(String),

    #[error("downloaded {actual} bytes, server advertised {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("failed to unpack bundle archive: {message}")]
    UnpackFailed { message: String },

    #[error("staging directory could not be prepared: {message}")]
    StagingFailed { message: String },
}

/// Content hash of the staged bundle does not match the advertised hash.
/// The staged data has been discarded by the time this surfaces.
#[derive(Debug, Clone, Error)]
pub enum IntegrityError {
    #[error("package hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, Error)]
pub enum SignatureError {
    #[error("signature verification failed: {reason}")]
    VerificationFailed { reason: String },

    #[error("a public key is configured but the package carries no signature")]
    MissingSignature,

    #[error("invalid public key: {reason}")]
    InvalidPublicKey { reason: String },

    #[error("invalid signature format: {reason}")]
    InvalidFormat { reason: String },
}
