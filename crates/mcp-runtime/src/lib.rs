//! # mcp-runtime
//!
//! Callee-side runtime for mini-apps embedded by a host application.
//!
//! This crate provides:
//! - Transport detection (layer, iframe or standalone) and the message bus
//! - Invocation context resolution, racing host init against URL fallback
//! - The [`CalleeSession`] lifecycle state machine with progress and
//!   completion reporting
//!
//! ## Example
//!
//! ```ignore
//! use mcp_runtime::{CalleeSession, HostEnvironment, SessionEvent, SessionOptions};
//! use mcp_format::Progress;
//!
//! let mut session = CalleeSession::new(SessionOptions::new("arcade", "1.0.0"), env)?;
//!
//! while let Some(event) = session.next_event().await {
//!     if let SessionEvent::Initialized { .. } = event {
//!         session.send_progress(&Progress { current: 1, total: 10, message: None });
//!     }
//! }
//! ```

mod error;
mod host;
mod session;
mod transport;

pub use error::{Result, SessionError};
pub use host::{
    EventTarget, HostEnvironment, HostEvent, Inbound, Subscription, KEYDOWN_EVENT, MESSAGE_EVENT,
};
pub use session::{
    CalleeSession, ContextSource, InitWatcher, SessionEvent, SessionOptions, SessionState,
    Termination, DEFAULT_CAPABILITIES, DEFAULT_CLOSE_REQUEST_DELAY, DEFAULT_INIT_TIMEOUT,
    DEFAULT_STANDALONE_GRACE, USER_CANCELLED,
};
pub use transport::{Delivery, MessageBus, TransportDetector};

// Re-export mcp-format types for convenience
pub use mcp_format::{InvocationContext, ProtocolDialect, TransportMode};
