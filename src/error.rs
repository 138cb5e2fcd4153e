//! Crate-wide error taxonomy.
//!
//! Every failure the core can produce is one of these kinds. The HTTP facade
//! maps each kind to a status code; the tool facade maps them to in-band
//! error payloads. Exec failures after a successful start are not errors:
//! they surface in-band as `exit_code = -1` (see [`crate::container::orchestrator`]).

use crate::container::RuntimeError;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classified failure kinds.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid credentials (API key or Bearer token)
    #[error("missing or invalid authentication")]
    Unauthorized,

    /// Session owned by another principal
    #[error("session belongs to another user")]
    Forbidden,

    /// Per-principal request budget exhausted for the current window
    #[error("rate limit exceeded")]
    RateLimited,

    /// Command rejected by the whitelist
    #[error("command not allowed by whitelist")]
    CommandForbidden,

    /// Path escapes the workspace or is malformed
    #[error("path escapes workspace")]
    BadPath,

    /// Workspace target does not exist
    #[error("path not found")]
    PathNotFound,

    /// Read attempted on a directory
    #[error("path is a directory")]
    PathIsDirectory,

    /// Payload or file exceeds the configured size ceiling
    #[error("file exceeds max size ({limit} bytes)")]
    FileTooLarge { limit: u64 },

    /// Malformed request at the facade boundary
    #[error("{0}")]
    InvalidRequest(String),

    /// Container runtime failure
    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Session store failure
    #[error("session store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Unclassified failure
    #[error("internal error: {0}")]
    Internal(String),
}
