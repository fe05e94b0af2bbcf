//! Storage-related error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    #[error("corrupted metadata: {message}")]
    CorruptedData { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}
