//! Debug HTTP server -- axum routes over the monitor's introspection view.

mod dashboard;
mod routes;
pub mod state;

use anyhow::{Context, Result};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use self::state::AppState;

/// Build the application router with all debug routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::debug_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}

/// Serve the debug router on `bind` until `cancel` fires.
pub async fn serve(bind: &str, state: AppState, cancel: CancellationToken) -> Result<()> {
    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid debug server address '{bind}'"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind debug server to {addr}"))?;

    tracing::info!(%addr, "debug server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("debug server failed")?;

    tracing::info!("debug server stopped");
    Ok(())
}
