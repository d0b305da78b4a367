use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{delete, get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use super::handlers;
use crate::chatterbox::ChatterboxClient;
use crate::registry::Registry;

pub struct AppState {
    pub registry: Registry,
    pub chatterbox: ChatterboxClient,
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: u64,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    // Leave headroom for multipart framing on top of the audio payload.
    let body_limit = (state.max_upload_bytes as usize).saturating_add(1024 * 1024);

    let api_routes = Router::new()
        .route("/signup", post(handlers::signup))
        .route("/admin/users", get(handlers::list_users))
        .route("/admin/users/:id/approve", post(handlers::approve_user))
        .route("/admin/users/:id/revoke", post(handlers::revoke_user))
        .route(
            "/voices",
            post(handlers::upload_voice).get(handlers::list_voices),
        )
        .route("/voices/:id", delete(handlers::delete_voice))
        .route("/generate", post(handlers::generate))
        .route("/jobs/:id", get(handlers::get_job))
        .route("/audio/:job_id", get(handlers::download_audio))
        .route("/webhooks/chatterbox", post(handlers::chatterbox_webhook))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api", api_routes)
        .nest_service(
            "/",
            ServeDir::new("static").append_index_html_on_directories(true),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
