//! # sandboxd
//!
//! A multi-tenant command execution service. Clients address a logical
//! *session*, submit shell commands or file operations against it, and
//! receive structured results. Each session is backed by exactly one
//! long-lived sandbox container with strict resource ceilings and no
//! network.
//!
//! ## Architecture Overview
//!
//! The crate is a library with two thin facades on top:
//!
//! - **[`store`]**: the authoritative session → container map (Redis,
//!   sliding TTL) and the per-principal rate limiter
//! - **[`container`]**: runtime capability trait, bollard adapter,
//!   isolation profile, and the adopt-or-create orchestrator
//! - **[`workspace`]**: path confinement and file operations over
//!   in-container exec
//! - **[`reaper`]**: background age-based container reclamation
//! - **[`http`]**: REST and tool-call facades over the same operations
//!
//! Data flow for a command: authenticate → rate-limit → whitelist →
//! orchestrator yields a running container for (session, user) →
//! bounded exec → captured output, with the session TTL refreshed.

/// Principal resolution from API keys and bearer tokens.
pub mod auth;

/// Command whitelist enforcement.
pub mod command;

/// Service configuration record and loading.
pub mod config;

/// Sandbox container layer: runtime trait, bollard adapter, isolation
/// profile, and session orchestration.
pub mod container;

/// Crate-wide error taxonomy.
pub mod error;

/// HTTP and tool-call facades.
pub mod http;

/// Background container garbage collection.
pub mod reaper;

/// Redis-backed session store and rate limiter.
pub mod store;

/// Workspace path confinement and file operations.
pub mod workspace;

// Re-export the main types
pub use command::CommandPolicy;
pub use config::Settings;
pub use container::{
    DockerRuntime, ExecResult, Orchestrator, Runtime, RuntimeError, SandboxProfile, SandboxState,
};
pub use error::{Error, Result};
pub use reaper::Reaper;
pub use store::{RateLimiter, SessionRecord, SessionStore};
pub use workspace::WorkspaceService;
