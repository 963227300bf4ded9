//! Server lifecycle for the trigger API.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::error::ServerError;
use crate::routes::create_router;
use crate::state::AppState;

/// Serves the trigger API on `addr` until `shutdown` resolves.
pub async fn run_server<F>(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: F
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static
{
    let router = create_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Bind {
            addr: addr.to_string(),
            reason: e.to_string()
        })?;

    tracing::info!(%addr, "Trigger API starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

    tracing::info!("Trigger API stopped");
    Ok(())
}
