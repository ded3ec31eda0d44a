//! HTTP front end: analyze, apply, run, cross-check and vision routes plus
//! the static web client.

pub mod errors;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use errors::AppError;
pub use routes::clamp_model_timeout;
pub use state::{AppInner, AppState};

/// Screenshots arrive base64-encoded inside JSON, so allow generous bodies.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn build_app(state: AppState) -> Router {
    let static_dir = state.inner.static_dir.clone();
    routes::build_routes(state)
        .fallback_service(ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let static_dir = state.inner.static_dir.clone();
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        static_dir = %static_dir.display(),
        "linefix server listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
