//! HTTP server bring-up: binding the listener and driving `axum::serve`,
//! with a graceful-shutdown path the engine's signal handler triggers.

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

/// Binds a listener for the REST management API.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> Result<(TcpListener, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    Ok((listener, actual_addr))
}

/// Binds a listener on any available port, for tests.
///
/// # Errors
///
/// Returns an error if no port is available.
pub async fn bind_any() -> Result<(TcpListener, SocketAddr), std::io::Error> {
    bind(SocketAddr::from(([127, 0, 0, 1], 0))).await
}

/// Serves `router` on `listener` until the process receives Ctrl+C or a
/// SIGTERM.
///
/// # Errors
///
/// Returns an error if the server fails during operation.
pub async fn serve(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_on_signal())
        .await
}

/// Serves `router` on `listener` until `shutdown` resolves, rather than
/// waiting on an OS signal. Used by tests and by `donkey-ctl`-driven
/// embedding scenarios that need deterministic shutdown.
///
/// # Errors
///
/// Returns an error if the server fails during operation.
pub async fn serve_until(
    listener: TcpListener,
    router: Router,
    shutdown: oneshot::Receiver<()>,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.await;
        })
        .await
}

async fn shutdown_on_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::rest_api::{AppState, create_app};
    use crate::database::{DatabaseConfig, DatabaseConnection, DatabasePath};
    use crate::domain_types::ServerId;
    use crate::vm_router::VmRouter;
    use std::sync::Arc;
    use std::time::Duration;

    async fn test_app_state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        let path = DatabasePath::new(dir.path().join("server_test.db")).unwrap();
        let connection = DatabaseConnection::initialize(DatabaseConfig::for_testing(path))
            .await
            .unwrap();
        std::mem::forget(dir);
        AppState {
            engine: Arc::new(Engine::new(connection, ServerId::generate())),
            vm_router: Arc::new(VmRouter::new()),
            http_client: reqwest::Client::new(),
        }
    }

    #[tokio::test]
    async fn bind_any_returns_a_loopback_address_with_a_real_port() {
        let (listener, addr) = bind_any().await.unwrap();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_ne!(addr.port(), 0);
        drop(listener);
    }

    #[tokio::test]
    async fn serve_until_stops_accepting_once_the_shutdown_signal_fires() {
        let (listener, addr) = bind_any().await.unwrap();
        let app = create_app(test_app_state().await);
        let (tx, rx) = oneshot::channel();

        let handle = tokio::spawn(serve_until(listener, app, rx));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{addr}/api/v1/health"))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok(), "server should shut down promptly");
    }
}
