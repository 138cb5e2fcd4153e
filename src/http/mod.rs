//! HTTP facade.
//!
//! A thin serialization shell over the core: handlers authenticate,
//! rate-limit, whitelist, sanitize, then call the same library operations
//! the tool facade uses. Core failure kinds map to status codes here and
//! nowhere else.

pub mod handlers;
pub mod tools;

use crate::command::CommandPolicy;
use crate::config::Settings;
use crate::container::Orchestrator;
use crate::error::Error;
use crate::store::{RateLimiter, SessionStore};
use crate::workspace::WorkspaceService;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::{any, get, post};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: SessionStore,
    pub rate: RateLimiter,
    pub orchestrator: Orchestrator,
    pub workspace: WorkspaceService,
    pub policy: CommandPolicy,
}

/// Build the router with all routes and layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Leave headroom over the largest accepted workspace payload
    let body_limit = (state.settings.workspace_max_file_size_bytes as usize)
        .saturating_mul(2)
        .max(1 << 20);

    Router::new()
        .route("/execute", post(handlers::execute_command))
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/{session_id}", axum::routing::delete(handlers::delete_session))
        .route(
            "/sessions/{session_id}/workspace",
            get(handlers::list_workspace).delete(handlers::delete_workspace_path),
        )
        .route(
            "/sessions/{session_id}/workspace/content",
            get(handlers::read_workspace_content).put(handlers::write_workspace_content),
        )
        .route(
            "/sessions/{session_id}/workspace/upload",
            post(handlers::upload_workspace_file),
        )
        .route("/mcp/", post(tools::call_tool))
        .route("/mcp", any(tools::redirect_to_slash))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl Error {
    /// External status code for this failure kind.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Error::CommandForbidden
            | Error::BadPath
            | Error::PathIsDirectory
            | Error::FileTooLarge { .. }
            | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::PathNotFound => StatusCode::NOT_FOUND,
            Error::Runtime(_) => StatusCode::BAD_GATEWAY,
            Error::Store(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::RuntimeError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::Unauthorized.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::Forbidden.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(Error::RateLimited.http_status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(Error::CommandForbidden.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::BadPath.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::PathNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::PathIsDirectory.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::FileTooLarge { limit: 1024 }.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Runtime(RuntimeError::Other("daemon down".to_string())).http_status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Internal("boom".to_string()).http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
