//! Service configuration.
//!
//! Settings are an explicit record threaded through constructors; nothing
//! reads configuration globals at use sites. Loading order:
//!
//! 1. Built-in defaults
//! 2. TOML file: `--config <path>`, `SANDBOXD_CONFIG`, or `./sandboxd.toml`
//! 3. `SANDBOXD_*` environment variable overrides, one per knob

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// All service knobs with their defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Verbose logging and diagnostics
    pub debug: bool,
    /// Listen address for the HTTP facade
    pub bind_addr: String,

    // Session store (Redis)
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: i64,
    pub redis_password: Option<String>,

    // Auth
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    /// Header name carrying the principal API key
    pub api_key_header: String,
    /// Comma-separated list of valid API keys (empty disables key auth)
    pub api_keys: String,

    // Rate limiting (fixed window per principal)
    pub rate_limit_requests: u64,
    pub rate_limit_window_seconds: u64,

    // Session lifecycle
    pub session_ttl_seconds: u64,

    // Sandbox container profile
    pub container_image: String,
    pub container_mem_limit: String,
    pub container_memswap_limit: String,
    pub container_cpu_period: i64,
    pub container_cpu_quota: i64,
    pub container_pids_limit: i64,
    pub container_tmpfs_tmp_size: String,
    pub container_tmpfs_workspace_size: String,
    pub container_ulimit_nofile_soft: i64,
    pub container_ulimit_nofile_hard: i64,
    pub container_ulimit_nproc_soft: i64,
    pub container_ulimit_nproc_hard: i64,

    // Exec
    pub default_exec_timeout_seconds: u64,
    pub max_exec_timeout_seconds: u64,
    /// Cap on concurrently outstanding exec waits per process
    pub exec_pool_size: usize,

    // Reaper
    pub cleanup_interval_seconds: u64,
    pub cleanup_max_container_age_seconds: i64,

    /// Comma-separated binaries admitted by the command whitelist
    pub allowed_commands: String,

    /// Max size per workspace read/write in bytes; 0 = no limit
    pub workspace_max_file_size_bytes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            bind_addr: "0.0.0.0:8080".to_string(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_db: 0,
            redis_password: None,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_algorithm: "HS256".to_string(),
            api_key_header: "X-API-Key".to_string(),
            api_keys: String::new(),
            rate_limit_requests: 100,
            rate_limit_window_seconds: 60,
            session_ttl_seconds: 600,
            container_image: "python:3.12-slim".to_string(),
            container_mem_limit: "256m".to_string(),
            container_memswap_limit: "256m".to_string(),
            container_cpu_period: 100_000,
            container_cpu_quota: 50_000,
            container_pids_limit: 50,
            container_tmpfs_tmp_size: "100m".to_string(),
            container_tmpfs_workspace_size: "500m".to_string(),
            container_ulimit_nofile_soft: 64,
            container_ulimit_nofile_hard: 128,
            container_ulimit_nproc_soft: 50,
            container_ulimit_nproc_hard: 100,
            default_exec_timeout_seconds: 30,
            max_exec_timeout_seconds: 120,
            exec_pool_size: 32,
            cleanup_interval_seconds: 60,
            cleanup_max_container_age_seconds: 900,
            allowed_commands: "ls,cat,echo,pwd,id,whoami,sh,bash,\
                               python,python3,pip,pip3,\
                               git,curl,wget,\
                               mkdir,cp,mv,rm,grep,find,head,tail,sort,uniq,xargs,env,basename,dirname,\
                               test,diff,patch,tar"
                .to_string(),
            workspace_max_file_size_bytes: 1 << 20,
        }
    }
}

impl Settings {
    /// Load settings: defaults, then an optional TOML file, then env overrides.
    pub fn load(config_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = match Self::find_config_file(config_override) {
            Some(path) => {
                info!("Loading configuration from: {:?}", path);
                Self::from_toml_file(&path)?
            }
            None => {
                debug!("No configuration file found, using defaults");
                Self::default()
            }
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Load from a TOML file.
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    fn find_config_file(config_override: Option<&Path>) -> Option<std::path::PathBuf> {
        if let Some(path) = config_override {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var("SANDBOXD_CONFIG") {
            return Some(std::path::PathBuf::from(path));
        }
        let local = std::path::PathBuf::from("sandboxd.toml");
        if local.is_file() { Some(local) } else { None }
    }

    /// Apply `SANDBOXD_*` environment overrides on top of file/default values.
    pub fn apply_env_overrides(&mut self) {
        override_from_env(&mut self.debug, "SANDBOXD_DEBUG");
        override_from_env(&mut self.bind_addr, "SANDBOXD_BIND_ADDR");
        override_from_env(&mut self.redis_host, "SANDBOXD_REDIS_HOST");
        override_from_env(&mut self.redis_port, "SANDBOXD_REDIS_PORT");
        override_from_env(&mut self.redis_db, "SANDBOXD_REDIS_DB");
        if let Ok(value) = std::env::var("SANDBOXD_REDIS_PASSWORD") {
            self.redis_password = if value.is_empty() { None } else { Some(value) };
        }
        override_from_env(&mut self.jwt_secret, "SANDBOXD_JWT_SECRET");
        override_from_env(&mut self.jwt_algorithm, "SANDBOXD_JWT_ALGORITHM");
        override_from_env(&mut self.api_key_header, "SANDBOXD_API_KEY_HEADER");
        override_from_env(&mut self.api_keys, "SANDBOXD_API_KEYS");
        override_from_env(&mut self.rate_limit_requests, "SANDBOXD_RATE_LIMIT_REQUESTS");
        override_from_env(
            &mut self.rate_limit_window_seconds,
            "SANDBOXD_RATE_LIMIT_WINDOW_SECONDS",
        );
        override_from_env(&mut self.session_ttl_seconds, "SANDBOXD_SESSION_TTL_SECONDS");
        override_from_env(&mut self.container_image, "SANDBOXD_CONTAINER_IMAGE");
        override_from_env(&mut self.container_mem_limit, "SANDBOXD_CONTAINER_MEM_LIMIT");
        override_from_env(
            &mut self.container_memswap_limit,
            "SANDBOXD_CONTAINER_MEMSWAP_LIMIT",
        );
        override_from_env(&mut self.container_cpu_period, "SANDBOXD_CONTAINER_CPU_PERIOD");
        override_from_env(&mut self.container_cpu_quota, "SANDBOXD_CONTAINER_CPU_QUOTA");
        override_from_env(&mut self.container_pids_limit, "SANDBOXD_CONTAINER_PIDS_LIMIT");
        override_from_env(
            &mut self.container_tmpfs_tmp_size,
            "SANDBOXD_CONTAINER_TMPFS_TMP_SIZE",
        );
        override_from_env(
            &mut self.container_tmpfs_workspace_size,
            "SANDBOXD_CONTAINER_TMPFS_WORKSPACE_SIZE",
        );
        override_from_env(
            &mut self.container_ulimit_nofile_soft,
            "SANDBOXD_CONTAINER_ULIMIT_NOFILE_SOFT",
        );
        override_from_env(
            &mut self.container_ulimit_nofile_hard,
            "SANDBOXD_CONTAINER_ULIMIT_NOFILE_HARD",
        );
        override_from_env(
            &mut self.container_ulimit_nproc_soft,
            "SANDBOXD_CONTAINER_ULIMIT_NPROC_SOFT",
        );
        override_from_env(
            &mut self.container_ulimit_nproc_hard,
            "SANDBOXD_CONTAINER_ULIMIT_NPROC_HARD",
        );
        override_from_env(
            &mut self.default_exec_timeout_seconds,
            "SANDBOXD_DEFAULT_EXEC_TIMEOUT_SECONDS",
        );
        override_from_env(
            &mut self.max_exec_timeout_seconds,
            "SANDBOXD_MAX_EXEC_TIMEOUT_SECONDS",
        );
        override_from_env(&mut self.exec_pool_size, "SANDBOXD_EXEC_POOL_SIZE");
        override_from_env(
            &mut self.cleanup_interval_seconds,
            "SANDBOXD_CLEANUP_INTERVAL_SECONDS",
        );
        override_from_env(
            &mut self.cleanup_max_container_age_seconds,
            "SANDBOXD_CLEANUP_MAX_CONTAINER_AGE_SECONDS",
        );
        override_from_env(&mut self.allowed_commands, "SANDBOXD_ALLOWED_COMMANDS");
        override_from_env(
            &mut self.workspace_max_file_size_bytes,
            "SANDBOXD_WORKSPACE_MAX_FILE_SIZE_BYTES",
        );
    }

    /// Redis connection URL assembled from the host/port/db/password knobs.
    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.redis_host, self.redis_port, self.redis_db
            ),
            None => format!(
                "redis://{}:{}/{}",
                self.redis_host, self.redis_port, self.redis_db
            ),
        }
    }

    /// Valid API keys as a set; empty when key auth is disabled.
    pub fn api_key_set(&self) -> std::collections::HashSet<String> {
        self.api_keys
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn override_from_env<T: FromStr>(field: &mut T, key: &str) {
    if let Ok(value) = std::env::var(key) {
        match value.parse::<T>() {
            Ok(parsed) => *field = parsed,
            Err(_) => warn!("Ignoring unparseable {} = {:?}", key, value),
        }
    }
}
