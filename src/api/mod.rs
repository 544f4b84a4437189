//! HTTP API: `POST /run`, `GET /read` and the supporting endpoints.

mod error;
mod routes;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use routes::{router, AppState};

use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::Dispatcher;

/// Build the dispatcher from `config` and serve until Ctrl-C.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::from_config(&config)?;
    let app = router(Arc::new(AppState { dispatcher }));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
