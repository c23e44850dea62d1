use std::net::SocketAddr;

use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::registry::handler::{probe_handler, ready_handler, registry_handler};
use crate::registry::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(ready_handler))
        .route("/v2", any(probe_handler))
        .route("/v2/", any(probe_handler))
        .route("/v2/*path", any(registry_handler))
        .with_state(state)
}

/// Bind and serve the registry. Returns the bound address (useful when
/// binding port 0) and the server task handle.
pub async fn start_server(addr: &str, state: AppState) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "registry mirror listening");

    let app = build_router(state);
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "registry server error");
        }
    });
    Ok((local_addr, handle))
}
