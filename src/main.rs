use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use voice_clone_server::api::routes::{create_router, AppState};
use voice_clone_server::chatterbox::ChatterboxClient;
use voice_clone_server::config::Config;
use voice_clone_server::registry::Registry;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configuration from environment
    let config = Config::from_env().expect("Invalid configuration");

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid address");

    tracing::info!("Voice Clone Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Starting server on http://{}", addr);
    tracing::info!("Uploads directory: {}", config.uploads_dir.display());
    tracing::info!("Registry database: {}", config.database_path.display());

    std::fs::create_dir_all(&config.uploads_dir).expect("Failed to create uploads directory");

    let registry = Registry::open(&config.database_path).expect("Failed to open registry");
    registry
        .ensure_admin(&config.admin_username)
        .expect("Failed to seed admin account");

    let chatterbox = ChatterboxClient::new(
        config.chatterbox_api_key.clone(),
        config.chatterbox_base_url.clone(),
    );

    let state = Arc::new(AppState {
        registry,
        chatterbox,
        uploads_dir: config.uploads_dir.clone(),
        max_upload_bytes: config.max_upload_bytes(),
    });

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app).await.expect("Server error");
}
