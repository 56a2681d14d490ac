//! HTTP read surface: `GET /logs` and `GET /health`

pub mod auth;
pub mod handlers;
pub mod router;
pub mod state;

pub use state::AppState;

use std::future::Future;

use crate::config::ServerConfig;
use crate::error::{AuditLogError, Result};

/// Serve the router until `shutdown` resolves.
pub async fn serve<F>(config: &ServerConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_addr = config.bind_address();
    let app = router::build(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AuditLogError::Server(format!("Failed to bind to {bind_addr}: {e}")))?;

    tracing::info!("Server listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AuditLogError::Server(format!("Server error: {e}")))?;

    tracing::info!("Server stopped");
    Ok(())
}
