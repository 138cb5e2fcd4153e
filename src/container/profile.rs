//! Sandbox isolation profile.
//!
//! The profile is fixed at creation time: no network, all capabilities
//! dropped, `no-new-privileges`, read-only rootfs, non-root user, memory and
//! CPU ceilings, pid/file/process limits, and two bounded tmpfs mounts. The
//! entrypoint is `sleep infinity` so the container idles between execs.

use crate::config::Settings;
use crate::container::{
    CREATED_AT_LABEL, Result, RuntimeError, SESSION_LABEL, USER_LABEL,
};
use bollard::service::{HostConfig, ResourcesUlimits};
use std::collections::HashMap;

/// Non-root uid:gid every sandbox runs as.
pub const SANDBOX_USER: &str = "1000:1000";

/// Everything the runtime needs to create one sandbox container.
#[derive(Debug, Clone)]
pub struct SandboxProfile {
    /// Container image
    pub image: String,
    /// Container command (keeps the sandbox alive between execs)
    pub cmd: Vec<String>,
    /// uid:gid the container runs as
    pub user: String,
    /// Identification labels (session, user, creation time)
    pub labels: HashMap<String, String>,
    /// Resource and isolation settings
    pub host_config: HostConfig,
}

impl SandboxProfile {
    /// Build the profile for a session's sandbox from configuration.
    ///
    /// `created_at` is stamped into the labels so the reaper can age
    /// containers without consulting the store.
    pub fn for_session(
        settings: &Settings,
        session_id: &str,
        user_id: &str,
        created_at: &str,
    ) -> Result<Self> {
        let mut labels = HashMap::new();
        labels.insert(SESSION_LABEL.to_string(), session_id.to_string());
        labels.insert(USER_LABEL.to_string(), user_id.to_string());
        labels.insert(CREATED_AT_LABEL.to_string(), created_at.to_string());

        let mut tmpfs = HashMap::new();
        tmpfs.insert(
            "/tmp".to_string(),
            format!("rw,noexec,nosuid,size={}", settings.container_tmpfs_tmp_size),
        );
        tmpfs.insert(
            "/workspace".to_string(),
            format!(
                "rw,noexec,nosuid,size={}",
                settings.container_tmpfs_workspace_size
            ),
        );

        let host_config = HostConfig {
            memory: Some(parse_byte_size(&settings.container_mem_limit)?),
            memory_swap: Some(parse_byte_size(&settings.container_memswap_limit)?),
            cpu_period: Some(settings.container_cpu_period),
            cpu_quota: Some(settings.container_cpu_quota),
            pids_limit: Some(settings.container_pids_limit),
            readonly_rootfs: Some(true),
            network_mode: Some("none".to_string()),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges".to_string()]),
            tmpfs: Some(tmpfs),
            ulimits: Some(vec![
                ResourcesUlimits {
                    name: Some("nofile".to_string()),
                    soft: Some(settings.container_ulimit_nofile_soft),
                    hard: Some(settings.container_ulimit_nofile_hard),
                },
                ResourcesUlimits {
                    name: Some("nproc".to_string()),
                    soft: Some(settings.container_ulimit_nproc_soft),
                    hard: Some(settings.container_ulimit_nproc_hard),
                },
            ]),
            ..Default::default()
        };

        Ok(Self {
            image: settings.container_image.clone(),
            cmd: vec!["sleep".to_string(), "infinity".to_string()],
            user: SANDBOX_USER.to_string(),
            labels,
            host_config,
        })
    }
}

/// Parse a Docker-style byte size (`256m`, `1g`, `512k`, `1048576`) to bytes.
pub fn parse_byte_size(size: &str) -> Result<i64> {
    let trimmed = size.trim();
    if trimmed.is_empty() {
        return Err(RuntimeError::Profile("empty byte size".to_string()));
    }
    let (digits, multiplier) = match trimmed.chars().last() {
        Some(c) if c.is_ascii_digit() => (trimmed, 1_i64),
        Some('b') | Some('B') => (&trimmed[..trimmed.len() - 1], 1),
        Some('k') | Some('K') => (&trimmed[..trimmed.len() - 1], 1 << 10),
        Some('m') | Some('M') => (&trimmed[..trimmed.len() - 1], 1 << 20),
        Some('g') | Some('G') => (&trimmed[..trimmed.len() - 1], 1 << 30),
        _ => {
            return Err(RuntimeError::Profile(format!(
                "unrecognized byte size: {trimmed}"
            )));
        }
    };
    let value: i64 = digits
        .parse()
        .map_err(|_| RuntimeError::Profile(format!("unrecognized byte size: {trimmed}")))?;
    Ok(value * multiplier)
}
