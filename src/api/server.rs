use std::net::SocketAddr;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{
    services::{get_project, health, list_approved},
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/projects/approved", get(list_approved))
        .route("/projects/{owner}", get(get_project))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind the read API listener. Called before the supervisor starts so an
/// unusable address fails the process up front.
pub async fn bind(address: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(address).await?;
    info!(address = %listener.local_addr()?, "Read API listening");
    Ok(listener)
}

/// Serve the read API on a bound listener until `cancel` fires
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Read API stopped");
    Ok(())
}
