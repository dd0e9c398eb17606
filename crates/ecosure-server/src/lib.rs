//! ecoSure relay server
//!
//! Accepts chat turns from the browser or CLI, drives them against the
//! hosted assistant service and streams the answer back as SSE.

pub mod api;
pub mod config;
pub mod error;
pub mod relay;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, header};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

pub use api::AppState;
pub use config::ServerConfig;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION]);

    let body_limit = api::chat::request_body_limit(&state.config);

    Router::new()
        .route("/health", get(api::health::health))
        .route(
            "/api/chat/stream",
            post(api::chat::chat_stream).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/api/threads/{thread_id}/messages",
            get(api::threads::list_thread_messages),
        )
        .route("/api/files/{file_id}", get(api::files::download_file))
        .layer(cors)
        .with_state(state)
}
