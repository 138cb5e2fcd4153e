//! Sandbox container layer.
//!
//! Maps stable session identities onto ephemeral containers via the
//! Docker/Podman API (bollard). The module is organized as:
//!
//! - [`runtime`]: capability trait the rest of the crate consumes
//!   (create/start/remove/exec/status/list, nothing more)
//! - [`docker`]: bollard-backed runtime adapter with connection fallback
//! - [`profile`]: the fixed isolation profile applied at creation
//! - [`orchestrator`]: adopt-or-create lifecycle, bounded exec, reconciliation

pub mod docker;
pub mod orchestrator;
pub mod profile;
pub mod runtime;

pub use docker::DockerRuntime;
pub use orchestrator::{ExecResult, Orchestrator};
pub use profile::SandboxProfile;
pub use runtime::{ExecOutput, ExecSpec, LabelledSandbox, Runtime, SandboxState};

/// Label carrying the owning session id; the reaper keys off this.
pub const SESSION_LABEL: &str = "exec.session_id";
/// Label carrying the owning principal.
pub const USER_LABEL: &str = "exec.user_id";
/// Label carrying the creation timestamp (ISO-8601 UTC).
pub const CREATED_AT_LABEL: &str = "exec.created_at";

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Docker/Podman API error
    #[error("container API error: {0}")]
    Api(#[from] bollard::errors::Error),

    /// Container not found
    #[error("container not found: {0}")]
    NotFound(String),

    /// Container name already taken by a concurrent creator
    #[error("container name in use: {0}")]
    NameConflict(String),

    /// Isolation profile construction error
    #[error("profile error: {0}")]
    Profile(String),

    /// Command execution error
    #[error("execution error: {0}")]
    Exec(String),

    /// General error
    #[error("container error: {0}")]
    Other(String),
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
