use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the callee runtime.
///
/// Protocol faults (malformed messages, calls after termination) are absorbed
/// by the session and never appear here.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No context was resolved within the caller-chosen bound.
    #[error("init timeout after {0:?}")]
    InitTimeout(Duration),

    /// The session was dropped before a context was resolved.
    #[error("session dropped before init")]
    SessionDropped,

    /// Session options are unusable.
    #[error("invalid session options: {0}")]
    InvalidOptions(String),
}

/// Result type for mcp-runtime operations.
pub type Result<T> = std::result::Result<T, SessionError>;
