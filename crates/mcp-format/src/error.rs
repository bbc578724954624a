use thiserror::Error;

/// Errors that can occur when reading or shaping protocol messages.
#[derive(Debug, Error)]
pub enum Error {
    /// The message is not an object or carries no `type` tag.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The `type` tag is not part of the protocol vocabulary.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// A field is present but has the wrong shape.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// Unknown transport mode name.
    #[error("invalid transport mode: {0}")]
    InvalidMode(String),

    /// JSON parsing error.
    #[error("json parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type for mcp-format operations.
pub type Result<T> = std::result::Result<T, Error>;
