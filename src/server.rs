use std::future::Future;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::forwarder::{chat_handler, GatewayState};
use crate::shutdown::ShutdownHandle;

pub fn router(state: GatewayState, cors_permissive: bool) -> Router {
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn root_handler() -> &'static str {
    "LLM gateway is working fine"
}

/// Serve `app` until `shutdown` resolves, then stop accepting connections
/// and give in-flight requests (open streams included) `grace` to finish.
/// After that `force_close` cancels whatever is still running, which ends
/// open streams and pending upstream calls so their connections close.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    grace: Duration,
    force_close: ShutdownHandle,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = drain_rx.await;
            })
            .await
    });

    tokio::select! {
        res = &mut server => return flatten(res),
        _ = shutdown => {}
    }

    info!("Shutting down the server, draining for up to {:?}", grace);
    let _ = drain_tx.send(());

    if let Ok(res) = tokio::time::timeout(grace, &mut server).await {
        return flatten(res);
    }

    warn!("Failed to shutdown server gracefully within {:?}, forcing close", grace);
    if tokio::time::timeout(grace, force_close.force_close()).await.is_err() {
        warn!("Stream relays did not stop after cancellation");
    }

    match tokio::time::timeout(grace, &mut server).await {
        Ok(res) => flatten(res),
        Err(_) => {
            warn!("Connections still open after force close, aborting accept loop");
            server.abort();
            Ok(())
        }
    }
}

fn flatten(res: Result<std::io::Result<()>, tokio::task::JoinError>) -> std::io::Result<()> {
    res.map_err(std::io::Error::other)?
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received terminate signal, starting graceful shutdown"),
    }
}
