//! Demo HTTP server wired to the shutdown coordinator.
use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::State,
    routing::get,
    serve::Listener,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::core::ShutdownCoordinator;

/// Shared state for the demo handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ShutdownCoordinator>,
    pub response_delay: Duration,
}

/// Snapshot of the coordinator served on `/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: &'static str,
    pub accepting: bool,
    pub live_connections: u64,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn hello(State(state): State<AppState>) -> &'static str {
    if !state.response_delay.is_zero() {
        tokio::time::sleep(state.response_delay).await;
    }
    "Hello, client\n"
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let coordinator = &state.coordinator;
    Json(StatusResponse {
        state: coordinator.state().as_str(),
        accepting: coordinator.is_accepting(),
        live_connections: coordinator.live_connections(),
    })
}

/// Serve `router` on `listener`.
///
/// The tracking listener never runs dry, so this only returns if the server
/// fails; callers stop it by dropping or aborting the future.
pub async fn serve<L>(listener: L, router: Router) -> io::Result<()>
where
    L: Listener<Addr = SocketAddr>,
{
    axum::serve(listener, router).await
}
