use crate::session::ResponseType;
use std::io;
use thiserror::Error;

/// Errors raised on the caller side.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The session issuer answered with a non-success status.
    #[error("session issuer rejected the request ({status}): {message}")]
    UpstreamSession { status: String, message: String },

    /// No app with this id or name in the issued session.
    #[error("app not found in session: {0}")]
    AppNotFound(String),

    /// The app cannot be launched the way it was asked to.
    #[error("app {app_id} responds as {actual}, not {expected}")]
    UnsupportedResponseType {
        app_id: String,
        actual: ResponseType,
        expected: ResponseType,
    },

    /// Unusable configuration.
    #[error("invalid config: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for mcp-host operations.
pub type Result<T> = std::result::Result<T, Error>;
