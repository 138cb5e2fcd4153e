//! Runtime capability interface.
//!
//! The orchestrator, workspace service, and reaper consume this trait
//! instead of a concrete daemon client. The bollard adapter lives in
//! [`crate::container::docker`]; tests substitute their own.

use crate::container::{Result, SandboxProfile};
use async_trait::async_trait;
use std::collections::HashMap;

/// Operations the core needs from a container runtime.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Verify daemon connectivity.
    async fn ping(&self) -> Result<()>;

    /// Create a container with the given name and isolation profile.
    /// Returns the container id. A taken name fails with `NameConflict`.
    async fn create(&self, name: &str, profile: &SandboxProfile) -> Result<String>;

    /// Start a created container. Starting an already-running container is
    /// not an error.
    async fn start(&self, container_id: &str) -> Result<()>;

    /// Remove a container. `force` kills a running one first.
    async fn remove(&self, container_id: &str, force: bool) -> Result<()>;

    /// Current state of a container, by id or name.
    async fn status(&self, container_id: &str) -> Result<SandboxState>;

    /// Resolve a container name to its id.
    async fn lookup(&self, name: &str) -> Result<String>;

    /// Run a command in a running container and wait for completion.
    async fn exec(&self, container_id: &str, spec: &ExecSpec) -> Result<ExecOutput>;

    /// All containers (including stopped) carrying the given label.
    async fn list_labelled(&self, label: &str) -> Result<Vec<LabelledSandbox>>;
}

/// Sandbox container state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// Container is running
    Running,
    /// Container is paused
    Paused,
    /// Container is restarting
    Restarting,
    /// Container is stopped
    Stopped,
    /// Container is dead
    Dead,
}

impl SandboxState {
    /// Whether the container can accept execs.
    pub fn is_running(self) -> bool {
        self == SandboxState::Running
    }
}

/// Specification for a single in-container exec.
#[derive(Debug, Clone)]
pub struct ExecSpec {
    /// Argument vector
    pub cmd: Vec<String>,
    /// uid:gid to run as; container default when `None`
    pub user: Option<String>,
    /// Working directory; container default when `None`
    pub workdir: Option<String>,
}

impl ExecSpec {
    /// Exec an explicit argument vector.
    pub fn argv<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            user: None,
            workdir: None,
        }
    }

    /// Exec a command line via `sh -c`.
    pub fn shell(command: &str) -> Self {
        Self::argv(["sh", "-c", command])
    }

    /// Run as the given uid:gid.
    pub fn user<S: Into<String>>(mut self, user: S) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Run in the given working directory.
    pub fn workdir<S: Into<String>>(mut self, dir: S) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

/// Captured output of a completed exec.
///
/// Streams are kept as raw bytes: the workspace service needs them to detect
/// binary content, and lossy decoding is a caller decision.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Demultiplexed standard output
    pub stdout: Vec<u8>,
    /// Demultiplexed standard error
    pub stderr: Vec<u8>,
    /// Exit code; `None` when the runtime does not report one
    pub exit_code: Option<i64>,
}

impl ExecOutput {
    /// Exit code, treating an unreported code as success.
    pub fn code(&self) -> i64 {
        self.exit_code.unwrap_or(0)
    }

    /// Whether the exec succeeded.
    pub fn success(&self) -> bool {
        self.code() == 0
    }

    /// Stdout decoded as UTF-8 with replacement.
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded as UTF-8 with replacement.
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// A labelled container as reported by the runtime listing.
#[derive(Debug, Clone)]
pub struct LabelledSandbox {
    /// Container id
    pub id: String,
    /// Container labels
    pub labels: HashMap<String, String>,
}
