//! # mcp-format
//!
//! Wire vocabulary for the lifecycle protocol spoken between a host
//! application (the caller) and an embedded mini-app (the callee).
//!
//! This crate provides:
//! - Message tags and the flat JSON [`Envelope`] shape
//! - Parsing of host-bound ([`CalleeMessage`]) and callee-bound
//!   ([`HostMessage`]) messages
//! - [`InvocationContext`] normalization across field-naming dialects and
//!   URL query fallback
//! - Typed progress, completion, cancellation and error payloads
//!
//! ## Example
//!
//! ```ignore
//! use mcp_format::{HostMessage, InvocationContext, TransportMode};
//! use serde_json::json;
//!
//! let message = json!({
//!     "type": "mcp:init",
//!     "context": { "customer_id": "c1", "user_id": "u1", "token": "t1" }
//! });
//!
//! if let HostMessage::Init(body) = HostMessage::parse(&message)? {
//!     let context = InvocationContext::from_init(&body, TransportMode::Iframe)?;
//!     assert_eq!(context.user_id.as_deref(), Some("u1"));
//! }
//! ```

mod context;
mod error;
mod message;
pub mod payload;

pub use context::{
    InvocationContext, ProtocolDialect, TransportMode, DEFAULT_LANGUAGE, DEFAULT_THEME,
};
pub use error::{Error, Result};
pub use message::{
    message_tag, CalleeMessage, Direction, Envelope, HostMessage, MessageType, LAYER_READY_EVENT,
};
pub use payload::{
    ErrorReport, GameCompletion, GameProgress, GameStatus, Progress, QuizCompletion,
    QuizProgress, VideoCompletion, VideoProgress,
};
