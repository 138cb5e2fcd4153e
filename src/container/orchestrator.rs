//! Session-to-sandbox lifecycle orchestration.
//!
//! Adopt-or-create semantics: a session's container is reused while the
//! runtime reports it running, reconciled when it has exited or vanished,
//! and created on first demand. Execs run under a clamped timeout and a
//! bounded pool; exec failures after a successful start surface in-band as
//! `exit_code = -1`, never as transport errors.

use crate::config::Settings;
use crate::container::{
    ExecSpec, Runtime, RuntimeError, SandboxProfile, profile::SANDBOX_USER,
};
use crate::error::{Error, Result};
use crate::store::SessionStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Outcome of one command execution, always well-formed for the caller.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Captured stdout (UTF-8, replacement for invalid bytes)
    pub stdout: String,
    /// Captured stderr, or the failure description
    pub stderr: String,
    /// Process exit code; `-1` for timeouts and exec failures
    pub exit_code: i64,
    /// Wall-clock seconds, rounded to milliseconds
    pub execution_time: f64,
}

/// Per-session sandbox lifecycle manager.
pub struct Orchestrator {
    runtime: Arc<dyn Runtime>,
    store: SessionStore,
    settings: Arc<Settings>,
    exec_pool: Arc<Semaphore>,
}

impl Orchestrator {
    /// Build an orchestrator over a runtime and session store.
    pub fn new(runtime: Arc<dyn Runtime>, store: SessionStore, settings: Arc<Settings>) -> Self {
        let exec_pool = Arc::new(Semaphore::new(settings.exec_pool_size.max(1)));
        Self {
            runtime,
            store,
            settings,
            exec_pool,
        }
    }

    /// The session store backing this orchestrator.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Return the running container for a session, creating or repairing as
    /// needed. The stored record is corrected whenever the runtime disagrees
    /// with it: the runtime wins for existence.
    pub async fn get_or_create(&self, session_id: &str, user_id: &str) -> Result<String> {
        if let Some(existing) = self.store.get_container_id(session_id).await? {
            match self.runtime.status(&existing).await {
                Ok(state) if state.is_running() => {
                    debug!("Adopting running container {} for session {}", existing, session_id);
                    return Ok(existing);
                }
                Ok(_) => {
                    info!(
                        "Container {} for session {} has exited, recreating",
                        short_id(&existing),
                        session_id
                    );
                    if let Err(e) = self.runtime.remove(&existing, true).await {
                        warn!("Failed to remove exited container {}: {}", short_id(&existing), e);
                    }
                    self.store.delete(session_id).await?;
                }
                Err(RuntimeError::NotFound(_)) => {
                    info!(
                        "Container {} for session {} is gone, recreating",
                        short_id(&existing),
                        session_id
                    );
                    self.store.delete(session_id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let name = container_name(user_id, session_id);
        let created_at = Utc::now().to_rfc3339();
        let profile = SandboxProfile::for_session(&self.settings, session_id, user_id, &created_at)?;

        let container_id = match self.runtime.create(&name, &profile).await {
            Ok(id) => {
                self.runtime.start(&id).await?;
                id
            }
            Err(RuntimeError::NameConflict(_)) => {
                // A concurrent caller for the same session won the race.
                // Adopt its container instead of creating a second one.
                debug!("Name conflict on {}, adopting concurrent creation", name);
                let id = self.runtime.lookup(&name).await?;
                self.runtime.start(&id).await?;
                id
            }
            Err(e) => return Err(e.into()),
        };

        self.store.create(session_id, user_id, &container_id).await?;

        info!(
            "Sandbox ready for session {}: {} ({})",
            session_id,
            name,
            short_id(&container_id)
        );
        Ok(container_id)
    }

    /// Execute a command in a running sandbox under the clamped timeout.
    ///
    /// Never fails at the transport level: timeouts and exec errors come
    /// back with `exit_code = -1` and the reason in `stderr`. A timed-out
    /// exec is abandoned rather than killed; the container's pid ceiling
    /// bounds what it can leak.
    pub async fn execute(
        &self,
        container_id: &str,
        command: &str,
        timeout_seconds: u64,
        workdir: &str,
    ) -> ExecResult {
        let timeout = timeout_seconds.clamp(1, self.settings.max_exec_timeout_seconds);
        let start = Instant::now();

        let spec = ExecSpec::shell(command)
            .user(SANDBOX_USER)
            .workdir(if workdir.is_empty() { "/workspace" } else { workdir });

        let bounded = async {
            let _permit = self
                .exec_pool
                .acquire()
                .await
                .map_err(|_| RuntimeError::Exec("exec pool closed".to_string()))?;
            self.runtime.exec(container_id, &spec).await
        };

        match tokio::time::timeout(Duration::from_secs(timeout), bounded).await {
            Err(_) => ExecResult {
                stdout: String::new(),
                stderr: format!("Command timed out after {timeout}s"),
                exit_code: -1,
                execution_time: round_millis(start.elapsed()),
            },
            Ok(Err(e)) => ExecResult {
                stdout: String::new(),
                stderr: e.to_string(),
                exit_code: -1,
                execution_time: round_millis(start.elapsed()),
            },
            Ok(Ok(output)) => ExecResult {
                stdout: output.stdout_lossy(),
                stderr: output.stderr_lossy(),
                exit_code: output.code(),
                execution_time: round_millis(start.elapsed()),
            },
        }
    }

    /// Tear down a session: remove its container and clear the store.
    ///
    /// Idempotent: deleting an absent session succeeds. Only the owning
    /// principal may delete; removal failures are logged and swallowed so
    /// the store entry is always cleared.
    pub async fn delete(&self, session_id: &str, requesting_user_id: &str) -> Result<()> {
        let Some(record) = self.store.get(session_id).await? else {
            return Ok(());
        };
        if record.user_id != requesting_user_id {
            return Err(Error::Forbidden);
        }

        if let Some(container_id) = self.store.get_container_id(session_id).await? {
            match self.runtime.remove(&container_id, true).await {
                Ok(()) | Err(RuntimeError::NotFound(_)) => {}
                Err(e) => {
                    warn!(
                        "Failed to remove container {} for session {}: {}",
                        short_id(&container_id),
                        session_id,
                        e
                    );
                }
            }
        }

        self.store.delete(session_id).await?;
        info!("Deleted session {}", session_id);
        Ok(())
    }
}

/// Deterministic sandbox name for a (user, session) pair: `exec-<user>-<session>`,
/// reduced to alphanumerics and hyphens, truncated to 64 chars.
pub fn container_name(user_id: &str, session_id: &str) -> String {
    let name = format!("exec-{}-{}", sanitize_name(user_id), sanitize_name(session_id));
    name.chars().take(64).collect()
}

fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Shortened container id for names and logs.
pub fn short_id(container_id: &str) -> &str {
    container_id.get(..12).unwrap_or(container_id)
}

fn round_millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}
