//! Delivery server - static files behind the secure-transport policy
//!
//! TLS is terminated upstream; this server only decides between redirecting
//! to `https` and serving with hardening headers.

pub mod policy;
mod router;

use std::future::Future;
use std::path::Path;

use tokio::net::TcpListener;

use crate::common::{config::ServerConfig, Error, Result};

pub use router::{app, apply_hardening_headers, enforce_secure_transport};

/// Run the server until Ctrl-C or SIGTERM
pub async fn run(config: &ServerConfig) -> Result<()> {
    if !config.root.is_dir() {
        return Err(Error::InvalidRoot(config.root.display().to_string()));
    }

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| Error::ServerBind { addr, source })?;

    tracing::info!(
        root = %config.root.display(),
        "LayerAudio server running at http://localhost:{}",
        config.port
    );

    serve(listener, &config.root, shutdown_signal()).await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Serve `root` on an already-bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, root: &Path, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app(root))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to create SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down gracefully"),
    }
}
