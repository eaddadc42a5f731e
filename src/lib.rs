pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod handlers;
pub mod models;
pub mod state;
pub mod storage;
pub mod utils;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{
    handlers::{delete_file, download_file, file_url, health_check, put_file, upload_file},
    state::AppState,
};

/// Routes of the storage service. `/public` serves the local provider's root
/// so URLs handed out by that provider resolve.
pub fn build_router(state: AppState) -> Router {
    let public_root = state.registry.settings().local.root_path.clone();
    let body_limit = usize::try_from(state.config.max_file_size).unwrap_or(usize::MAX);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/files/upload", post(upload_file))
        .route("/files/url", get(file_url))
        .route("/files/download", get(download_file))
        .route("/files", put(put_file).delete(delete_file))
        .nest_service("/public", ServeDir::new(public_root))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
