//! Tool-call facade.
//!
//! A second, LLM-friendly surface over the same core operations, mounted at
//! `/mcp/` (with a `307` redirect from `/mcp` for clients that omit the
//! trailing slash). Failures come back as `{error, status_code}` payloads
//! instead of transport errors, so a tool caller always receives a result
//! document.

use crate::auth;
use crate::container::orchestrator::short_id;
use crate::error::{Error, Result};
use crate::http::AppState;
use crate::workspace;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Redirect;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// A single tool invocation.
#[derive(Debug, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Redirect `/mcp` to `/mcp/`.
pub async fn redirect_to_slash() -> Redirect {
    Redirect::temporary("/mcp/")
}

/// Dispatch a tool call; errors are folded into the result document.
pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(call): Json<ToolCall>,
) -> Json<Value> {
    match dispatch(&state, &headers, &call).await {
        Ok(value) => Json(value),
        Err(e) => Json(json!({
            "error": e.to_string(),
            "status_code": e.http_status().as_u16(),
        })),
    }
}

async fn dispatch(state: &AppState, headers: &HeaderMap, call: &ToolCall) -> Result<Value> {
    let user_id = auth::authenticate(headers, &state.settings)?;
    state.rate.check(&user_id).await?;
    let args = &call.arguments;

    match call.tool.as_str() {
        "create_session" => {
            let session_id = str_arg(args, "session_id")?;
            let container_id = state.orchestrator.get_or_create(session_id, &user_id).await?;
            Ok(json!({
                "session_id": session_id,
                "container_id": short_id(&container_id),
            }))
        }
        "delete_session" => {
            let session_id = str_arg(args, "session_id")?;
            state.orchestrator.delete(session_id, &user_id).await?;
            Ok(json!({ "status": "deleted", "session_id": session_id }))
        }
        "execute" => {
            let session_id = str_arg(args, "session_id")?;
            let command = str_arg(args, "command")?;
            state.policy.ensure_allowed(command)?;

            let timeout = args
                .get("timeout")
                .and_then(Value::as_u64)
                .unwrap_or(state.settings.default_exec_timeout_seconds);
            let workdir = args
                .get("working_dir")
                .and_then(Value::as_str)
                .unwrap_or("/workspace");

            let container_id = state.orchestrator.get_or_create(session_id, &user_id).await?;
            state.store.refresh(session_id).await?;
            let result = state
                .orchestrator
                .execute(&container_id, command, timeout, workdir)
                .await;

            Ok(json!({
                "stdout": result.stdout,
                "stderr": result.stderr,
                "exit_code": result.exit_code,
                "execution_time": result.execution_time,
                "container_id": short_id(&container_id),
            }))
        }
        "workspace_list" => {
            let session_id = str_arg(args, "session_id")?;
            let path = args.get("path").and_then(Value::as_str).unwrap_or("");
            let container_id = state.orchestrator.get_or_create(session_id, &user_id).await?;
            state.store.refresh(session_id).await?;
            let relative = workspace::sanitize(path)?;
            let entries = state.workspace.list(&container_id, &relative).await?;
            Ok(json!({ "entries": entries }))
        }
        "workspace_read" => {
            let session_id = str_arg(args, "session_id")?;
            let relative = required_path(args)?;
            let container_id = state.orchestrator.get_or_create(session_id, &user_id).await?;
            state.store.refresh(session_id).await?;
            let content = state
                .workspace
                .read(
                    &container_id,
                    &relative,
                    state.settings.workspace_max_file_size_bytes,
                )
                .await?;
            Ok(serde_json::to_value(content).map_err(|e| Error::Internal(e.to_string()))?)
        }
        "workspace_write" => {
            let session_id = str_arg(args, "session_id")?;
            let relative = required_path(args)?;
            let content = str_arg(args, "content")?;
            let container_id = state.orchestrator.get_or_create(session_id, &user_id).await?;
            state.store.refresh(session_id).await?;
            state
                .workspace
                .write(
                    &container_id,
                    &relative,
                    content.as_bytes(),
                    state.settings.workspace_max_file_size_bytes,
                )
                .await?;
            Ok(json!({ "status": "written", "path": relative }))
        }
        "workspace_delete" => {
            let session_id = str_arg(args, "session_id")?;
            let relative = required_path(args)?;
            let container_id = state.orchestrator.get_or_create(session_id, &user_id).await?;
            state.store.refresh(session_id).await?;
            state.workspace.delete(&container_id, &relative).await?;
            Ok(json!({ "status": "deleted", "path": relative }))
        }
        other => Err(Error::InvalidRequest(format!("unknown tool: {other}"))),
    }
}

fn str_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::InvalidRequest(format!("{name} is required")))
}

fn required_path(args: &Value) -> Result<String> {
    let path = str_arg(args, "path")?;
    let relative = workspace::sanitize(path)?;
    if relative.is_empty() {
        return Err(Error::InvalidRequest("path is required".to_string()));
    }
    Ok(relative)
}
