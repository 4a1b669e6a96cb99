// HTTP routes: rendered index, latest snapshot as JSON, version

mod http;

use axum::{Router, routing::get};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::publisher::SnapshotRx;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) index_path: Arc<PathBuf>,
    pub(crate) snapshots: SnapshotRx,
}

/// `index_path` is the file the publisher renders; `snapshots` follows its latest snapshot.
pub fn app(index_path: PathBuf, snapshots: SnapshotRx) -> Router {
    let state = AppState {
        index_path: Arc::new(index_path),
        snapshots,
    };
    Router::new()
        .route("/", get(http::index_handler)) // GET /
        .route("/api/snapshot", get(http::snapshot_handler)) // GET /api/snapshot
        .route("/version", get(http::version_handler)) // GET /version
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
