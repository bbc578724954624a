//! # mcp-host
//!
//! Caller side of the mini-app lifecycle protocol.
//!
//! This crate provides:
//! - A client for the session issuer (`session/init`, `token/refresh`)
//! - Launch URL building and inline app calls
//! - [`Embedding`], the caller end of a mounted layer app: one init per
//!   ready, teardown on complete, cancel or close-request
//! - TOML caller configuration
//! - The `mcp-session` command-line tool (with the `cli` feature)
//!
//! ## Example
//!
//! ```ignore
//! use mcp_host::{CallerConfig, CallerOrchestrator, LaunchContext, SurfaceKind};
//!
//! let config = CallerConfig::load("mcp.toml")?;
//! let orchestrator = CallerOrchestrator::bootstrap(config, jwt).await?;
//!
//! let context = LaunchContext::new("game-session-123", "user-456");
//! let mut embedding = orchestrator.embed("Arcade", &context, SurfaceKind::Frame)?;
//!
//! while let Some(message) = embedding.next_event().await {
//!     println!("{}: {:?}", message.kind(), message);
//! }
//! ```

pub mod config;
mod error;
pub mod issuer;
pub mod orchestrator;
pub mod session;

pub use config::CallerConfig;
pub use error::{Error, Result};
pub use issuer::SessionIssuerClient;
pub use orchestrator::{CallerOrchestrator, Embedding, LaunchContext, SurfaceKind};
pub use session::{AppGrant, IssuedSession, ResponseType, SessionInfo, TokenRefresh};
