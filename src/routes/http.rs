// GET handlers: index, api/snapshot, version

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::version::{NAME, VERSION};

/// GET /: serves the last rendered index.htm; 404 until the first minute completes.
pub(super) async fn index_handler(State(state): State<AppState>) -> Response {
    match tokio::fs::read(state.index_path.as_ref()).await {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/html; charset=UTF-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::debug!(error = %e, path = %state.index_path.display(), "index not available");
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
    }
}

/// GET /api/snapshot: latest published snapshot as JSON.
pub(super) async fn snapshot_handler(State(state): State<AppState>) -> Response {
    let latest = state.snapshots.borrow().clone();
    match latest {
        Some(snapshot) => axum::Json(snapshot.as_ref().clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "no snapshot yet").into_response(),
    }
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}
