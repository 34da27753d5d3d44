//! HTTP server assembly.
//!
//! Thin translation layer: the router maps HTTP requests onto engine
//! calls and nothing else. All state is injected through [`AppState`] at
//! startup; there are no globals.

use crate::routes;
use axum::Router;
use dreamgate::engine::Engine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared state injected into every handler.
pub struct AppState {
    pub engine: Engine,
}

/// Builds the application router.
pub fn app(state: Arc<AppState>) -> Router {
    routes::router(state)
}

/// Binds and serves until `shutdown` fires.
pub async fn serve(
    engine: Engine,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let state = Arc::new(AppState { engine });
    let router = app(Arc::clone(&state));

    let address = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&address).await?;
    info!(address = %address, "Gateway listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await?;

    state.engine.shutdown();
    info!("Gateway stopped");
    Ok(())
}
