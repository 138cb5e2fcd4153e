//! REST handlers.
//!
//! Every handler runs the same pipeline: authenticate → rate-limit →
//! (execute only) whitelist → (paths) sanitize → core call. Responses are
//! serialization of core results; failures are mapped by the `Error`
//! `IntoResponse` impl.

use crate::auth;
use crate::container::orchestrator::short_id;
use crate::error::{Error, Result};
use crate::http::AppState;
use crate::workspace::{self, Entry, FileContent};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Request body for `POST /execute`.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    pub session_id: String,
    pub timeout: Option<u64>,
    pub working_dir: Option<String>,
}

/// Response for `POST /execute`.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub execution_time: f64,
    pub container_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct PathParams {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct WriteRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct WorkspaceListResponse {
    pub entries: Vec<Entry>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub path: String,
    pub session_id: String,
    pub size: usize,
}

fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() || session_id.len() > 256 {
        return Err(Error::InvalidRequest(
            "session_id must be 1-256 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_command(command: &str) -> Result<()> {
    if command.is_empty() || command.len() > 32_000 {
        return Err(Error::InvalidRequest(
            "command must be 1-32000 characters".to_string(),
        ));
    }
    Ok(())
}

/// Execute a command in the session's sandbox.
pub async fn execute_command(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CommandRequest>,
) -> Result<Json<CommandResponse>> {
    let user_id = auth::authenticate(&headers, &state.settings)?;
    state.rate.check(&user_id).await?;

    validate_command(&body.command)?;
    validate_session_id(&body.session_id)?;
    if body.working_dir.as_ref().is_some_and(|dir| dir.len() > 512) {
        return Err(Error::InvalidRequest(
            "working_dir must be at most 512 characters".to_string(),
        ));
    }
    state.policy.ensure_allowed(&body.command)?;

    let container_id = state
        .orchestrator
        .get_or_create(&body.session_id, &user_id)
        .await?;
    state.store.refresh(&body.session_id).await?;

    let timeout = body
        .timeout
        .unwrap_or(state.settings.default_exec_timeout_seconds);
    let workdir = body.working_dir.as_deref().unwrap_or("/workspace");

    let result = state
        .orchestrator
        .execute(&container_id, &body.command, timeout, workdir)
        .await;

    info!(
        user_id = %user_id,
        session_id = %body.session_id,
        command = %body.command.chars().take(200).collect::<String>(),
        exit_code = result.exit_code,
        execution_time = result.execution_time,
        container_id = short_id(&container_id),
        "Command executed"
    );

    Ok(Json(CommandResponse {
        stdout: result.stdout,
        stderr: result.stderr,
        exit_code: result.exit_code,
        execution_time: result.execution_time,
        container_id: short_id(&container_id).to_string(),
    }))
}

/// Create (or reuse) a session and its sandbox. Idempotent per session_id.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = auth::authenticate(&headers, &state.settings)?;
    state.rate.check(&user_id).await?;
    validate_session_id(&body.session_id)?;

    let container_id = state
        .orchestrator
        .get_or_create(&body.session_id, &user_id)
        .await?;

    Ok(Json(serde_json::json!({
        "session_id": body.session_id,
        "container_id": short_id(&container_id),
    })))
}

/// Tear down a session: remove its sandbox and store record.
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let user_id = auth::authenticate(&headers, &state.settings)?;
    state.rate.check(&user_id).await?;

    state.orchestrator.delete(&session_id, &user_id).await?;

    Ok(Json(serde_json::json!({
        "status": "deleted",
        "session_id": session_id,
    })))
}

/// Resolve the sandbox and sanitized path for a workspace operation,
/// refreshing the session on the way.
async fn workspace_target(
    state: &AppState,
    headers: &HeaderMap,
    session_id: &str,
    path: &str,
) -> Result<(String, String)> {
    let user_id = auth::authenticate(headers, &state.settings)?;
    state.rate.check(&user_id).await?;

    let container_id = state.orchestrator.get_or_create(session_id, &user_id).await?;
    state.store.refresh(session_id).await?;

    let relative = workspace::sanitize(path)?;
    Ok((container_id, relative))
}

/// List directory entries under `/workspace`.
pub async fn list_workspace(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Result<Json<WorkspaceListResponse>> {
    let (container_id, relative) =
        workspace_target(&state, &headers, &session_id, &params.path).await?;
    let entries = state.workspace.list(&container_id, &relative).await?;
    Ok(Json(WorkspaceListResponse { entries }))
}

/// Read a workspace file.
pub async fn read_workspace_content(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<PathParams>,
    headers: HeaderMap,
) -> Result<Json<FileContent>> {
    let (container_id, relative) =
        workspace_target(&state, &headers, &session_id, &params.path).await?;
    if relative.is_empty() {
        return Err(Error::InvalidRequest("path is required for read".to_string()));
    }
    let content = state
        .workspace
        .read(
            &container_id,
            &relative,
            state.settings.workspace_max_file_size_bytes,
        )
        .await?;
    Ok(Json(content))
}

/// Write a workspace file. Body is raw bytes, or JSON `{"content": "..."}`
/// when the content type says so.
pub async fn write_workspace_content(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<PathParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let (container_id, relative) =
        workspace_target(&state, &headers, &session_id, &params.path).await?;
    if relative.is_empty() {
        return Err(Error::InvalidRequest("path is required for write".to_string()));
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"));
    let content: Vec<u8> = if is_json {
        let request: WriteRequest = serde_json::from_slice(&body)
            .map_err(|e| Error::InvalidRequest(format!("invalid JSON body: {e}")))?;
        request.content.into_bytes()
    } else {
        body.to_vec()
    };

    state
        .workspace
        .write(
            &container_id,
            &relative,
            &content,
            state.settings.workspace_max_file_size_bytes,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Upload a file via multipart form data.
pub async fn upload_workspace_file(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let (container_id, directory) =
        workspace_target(&state, &headers, &session_id, &params.path).await?;

    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("invalid multipart body: {e}")))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidRequest(format!("invalid multipart body: {e}")))?;
        upload = Some((filename, data));
        break;
    }
    let Some((filename, data)) = upload else {
        return Err(Error::InvalidRequest(
            "multipart file field is required".to_string(),
        ));
    };

    let target = if directory.is_empty() {
        filename
    } else {
        format!("{directory}/{filename}")
    };
    let relative = workspace::sanitize(&target)?;
    if relative.is_empty() {
        return Err(Error::InvalidRequest("upload filename is required".to_string()));
    }

    state
        .workspace
        .write(
            &container_id,
            &relative,
            &data,
            state.settings.workspace_max_file_size_bytes,
        )
        .await?;

    Ok(Json(UploadResponse {
        path: relative,
        session_id,
        size: data.len(),
    }))
}

/// Delete a workspace file or directory.
pub async fn delete_workspace_path(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(params): Query<PathParams>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let (container_id, relative) =
        workspace_target(&state, &headers, &session_id, &params.path).await?;
    state.workspace.delete(&container_id, &relative).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness probe.
pub async fn ready() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ready" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_request_shape() {
        let body: CommandRequest = serde_json::from_str(
            r#"{"command": "echo hi", "session_id": "s1", "timeout": 5}"#,
        )
        .unwrap();
        assert_eq!(body.command, "echo hi");
        assert_eq!(body.timeout, Some(5));
        assert!(body.working_dir.is_none());
    }

    #[test]
    fn test_request_validation_bounds() {
        assert!(validate_session_id("s1").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id(&"x".repeat(257)).is_err());

        assert!(validate_command("echo hi").is_ok());
        assert!(validate_command("").is_err());
        assert!(validate_command(&"y".repeat(32_001)).is_err());
    }

    #[test]
    fn test_command_response_shape() {
        let response = CommandResponse {
            stdout: "hi\n".to_string(),
            stderr: String::new(),
            exit_code: 0,
            execution_time: 0.012,
            container_id: "0123456789ab".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["exit_code"], 0);
        assert_eq!(json["execution_time"], 0.012);
        assert_eq!(json["container_id"], "0123456789ab");
    }
}
