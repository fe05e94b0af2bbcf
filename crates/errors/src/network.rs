//! Transport and deployment-server error types

use thiserror::Error;

/// Failures of the HTTP transport itself.
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    #[error("connection timeout to {url}")]
    Timeout { url: String },

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Failures of the deployment server: a response arrived but was not usable.
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("malformed server response: {message}")]
    MalformedResponse { message: String },
}

/// Failure delivering a deployment status report. Best-effort: callers log
/// and swallow this, it never affects the install decision already made.
#[derive(Debug, Clone, Error)]
pub enum ReportError {
    #[error("status report rejected with HTTP status {status}")]
    Rejected { status: u16 },

    #[error("status report could not be sent: {message}")]
    SendFailed { message: String },
}
