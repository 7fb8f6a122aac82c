//! HTTP transport: a REST endpoint, a JSON-RPC endpoint and a health check,
//! all thin wrappers over [`Aggregator::compute_within`].

pub mod error;
pub mod jsonrpc;
pub mod rest;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use bc_data::BiggestChange;
use bc_engine::{Aggregator, ChangeError};
use color_eyre::eyre::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared per-server state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>, request_timeout: Duration) -> Self {
        Self {
            aggregator,
            request_timeout,
        }
    }

    /// One bounded computation. Dropping the returned future (client gone)
    /// aborts its block workers.
    pub async fn biggest_change(&self, count_of_blocks: u64) -> Result<BiggestChange, ChangeError> {
        let cancel = CancellationToken::new();
        self.aggregator
            .compute_within(count_of_blocks, self.request_timeout, &cancel)
            .await
    }
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new().route("/get_biggest_change", get(rest::get_biggest_change));

    Router::new()
        .route("/", post(jsonrpc::handle))
        .route("/healthz", get(healthz))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Serves until Ctrl-C or SIGTERM, then drains in-flight requests.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let local = listener
        .local_addr()
        .wrap_err("failed to read listener address")?;
    info!(addr = %local, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("http server failed")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}
