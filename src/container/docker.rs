//! Bollard-backed runtime adapter.
//!
//! Connects to a Docker or Podman daemon with automatic fallback and
//! implements the [`Runtime`] capability trait over the bollard API.

use crate::container::{
    ExecOutput, ExecSpec, LabelledSandbox, Result, Runtime, RuntimeError, SandboxProfile,
    SandboxState,
};
use async_trait::async_trait;
use bollard::Docker;
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Docker/Podman API adapter.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Arc<Docker>,
}

impl DockerRuntime {
    /// Connect to the container daemon and verify the connection.
    ///
    /// # Errors
    ///
    /// Returns error if neither Docker nor Podman is reachable.
    pub async fn connect() -> Result<Self> {
        let docker = Self::connect_daemon().await?;
        let runtime = Self {
            docker: Arc::new(docker),
        };
        runtime.ping().await?;
        Ok(runtime)
    }

    /// Connection strategies, in order:
    /// 1. Local defaults (Unix socket or Windows named pipe)
    /// 2. Rootless Podman socket
    /// 3. System Podman socket
    async fn connect_daemon() -> Result<Docker> {
        debug!("Attempting to connect to container runtime...");

        match Docker::connect_with_local_defaults() {
            Ok(docker) => {
                info!("Connected to container runtime via local defaults");
                return Ok(docker);
            }
            Err(e) => {
                debug!("Local defaults failed: {}", e);
            }
        }

        #[cfg(unix)]
        {
            if let Ok(home) = std::env::var("HOME") {
                let podman_socket = format!("unix://{}/run/podman/podman.sock", home);
                debug!("Trying Podman socket: {}", podman_socket);

                match Docker::connect_with_socket(&podman_socket, 120, bollard::API_DEFAULT_VERSION)
                {
                    Ok(docker) => {
                        info!("Connected to Podman via rootless socket");
                        return Ok(docker);
                    }
                    Err(e) => {
                        debug!("Podman rootless socket failed: {}", e);
                    }
                }
            }

            let system_socket = "unix:///run/podman/podman.sock";
            debug!("Trying system Podman socket: {}", system_socket);

            match Docker::connect_with_socket(system_socket, 120, bollard::API_DEFAULT_VERSION) {
                Ok(docker) => {
                    info!("Connected to Podman via system socket");
                    return Ok(docker);
                }
                Err(e) => {
                    debug!("Podman system socket failed: {}", e);
                }
            }
        }

        Err(RuntimeError::Other(
            "Failed to connect to Docker or Podman. Please ensure Docker or Podman is installed and running.".to_string()
        ))
    }

    /// Direct access to the underlying bollard client.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl Runtime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Other(format!("Failed to ping container runtime: {}", e)))?;
        debug!("Container runtime ping successful");
        Ok(())
    }

    async fn create(&self, name: &str, profile: &SandboxProfile) -> Result<String> {
        let options = bollard::container::CreateContainerOptions {
            name,
            ..Default::default()
        };

        let config = bollard::container::Config {
            image: Some(profile.image.clone()),
            cmd: Some(profile.cmd.clone()),
            user: Some(profile.user.clone()),
            labels: Some(profile.labels.clone()),
            host_config: Some(profile.host_config.clone()),
            ..Default::default()
        };

        debug!("Creating sandbox container: {}", name);

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 409, ..
                } => RuntimeError::NameConflict(name.to_string()),
                e => RuntimeError::Api(e),
            })?;

        info!("Created sandbox container: {} ({})", name, response.id);
        Ok(response.id)
    }

    async fn start(&self, container_id: &str) -> Result<()> {
        let started = self
            .docker
            .start_container(
                container_id,
                None::<bollard::container::StartContainerOptions<String>>,
            )
            .await;

        match started {
            Ok(()) => Ok(()),
            // 304: already started, fine for the adoption path
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(RuntimeError::Api(e)),
        }
    }

    async fn remove(&self, container_id: &str, force: bool) -> Result<()> {
        self.docker
            .remove_container(
                container_id,
                Some(bollard::container::RemoveContainerOptions {
                    force,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => RuntimeError::NotFound(container_id.to_string()),
                e => RuntimeError::Api(e),
            })?;

        debug!("Removed container: {}", container_id);
        Ok(())
    }

    async fn status(&self, container_id: &str) -> Result<SandboxState> {
        let inspect = self
            .docker
            .inspect_container(
                container_id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => RuntimeError::NotFound(container_id.to_string()),
                e => RuntimeError::Api(e),
            })?;

        let state = inspect.state.ok_or_else(|| {
            RuntimeError::Other(format!("Container {} has no state", container_id))
        })?;

        if state.running.unwrap_or(false) {
            Ok(SandboxState::Running)
        } else if state.paused.unwrap_or(false) {
            Ok(SandboxState::Paused)
        } else if state.restarting.unwrap_or(false) {
            Ok(SandboxState::Restarting)
        } else if state.dead.unwrap_or(false) {
            Ok(SandboxState::Dead)
        } else {
            Ok(SandboxState::Stopped)
        }
    }

    async fn lookup(&self, name: &str) -> Result<String> {
        let inspect = self
            .docker
            .inspect_container(
                name,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => RuntimeError::NotFound(name.to_string()),
                e => RuntimeError::Api(e),
            })?;

        inspect
            .id
            .ok_or_else(|| RuntimeError::Other(format!("Container {} has no ID", name)))
    }

    async fn exec(&self, container_id: &str, spec: &ExecSpec) -> Result<ExecOutput> {
        debug!(
            "Executing command in container {}: {:?}",
            container_id, spec.cmd
        );

        let exec_options = CreateExecOptions {
            cmd: Some(spec.cmd.clone()),
            user: spec.user.clone(),
            working_dir: spec.workdir.clone(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.docker.create_exec(container_id, exec_options).await?;
        let start_results = self.docker.start_exec(&exec.id, None).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        match start_results {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(result) = output.next().await {
                    match result {
                        Ok(bollard::container::LogOutput::StdOut { message }) => {
                            stdout.extend_from_slice(&message);
                        }
                        Ok(bollard::container::LogOutput::StdErr { message }) => {
                            stderr.extend_from_slice(&message);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            return Err(RuntimeError::Exec(format!(
                                "Failed to read output: {}",
                                e
                            )));
                        }
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(RuntimeError::Exec(
                    "Unexpected detached execution".to_string(),
                ));
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        let exit_code = inspect.exit_code;

        debug!("Command executed with exit code: {:?}", exit_code);

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn list_labelled(&self, label: &str) -> Result<Vec<LabelledSandbox>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label.to_string()]);

        let containers = self
            .docker
            .list_containers(Some(bollard::container::ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(LabelledSandbox {
                    id: c.id?,
                    labels: c.labels.unwrap_or_default(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[tokio::test]
    #[ignore] // Requires Docker/Podman to be running
    async fn test_connect_and_ping() {
        let runtime = DockerRuntime::connect().await.unwrap();
        runtime.ping().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_status_of_missing_container() {
        let runtime = DockerRuntime::connect().await.unwrap();
        let err = runtime.status("no-such-container-xyz").await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotFound(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn test_create_conflict_maps_to_name_conflict() {
        let runtime = DockerRuntime::connect().await.unwrap();
        let settings = Settings {
            container_image: "alpine:latest".to_string(),
            ..Settings::default()
        };
        let profile = SandboxProfile::for_session(
            &settings,
            "conflict-test",
            "tester",
            "2026-01-01T00:00:00+00:00",
        )
        .unwrap();

        let id = runtime.create("sandboxd-conflict-test", &profile).await.unwrap();
        let second = runtime.create("sandboxd-conflict-test", &profile).await;
        assert!(matches!(second, Err(RuntimeError::NameConflict(_))));

        runtime.remove(&id, true).await.unwrap();
    }
}
