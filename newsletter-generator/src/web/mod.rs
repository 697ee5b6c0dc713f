use crate::types::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

pub mod handlers;
pub mod state;

pub use state::{AppState, Session};

pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/status", get(handlers::status))
        .route("/api/interests", post(handlers::enter_interests))
        .route("/api/configure", post(handlers::configure))
        .route("/api/generate", post(handlers::generate))
        .route("/api/cancel", post(handlers::cancel))
        .route("/api/preview", get(handlers::preview))
        .route("/api/download/:format", get(handlers::download))
        .route("/api/profiles", get(handlers::list_profiles).post(handlers::save_profile))
        .layer(cors)
        .with_state(state)
}

/// Serve the GUI until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = create_app(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Web GUI listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
