//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the confirmation handlers
//! - Wire up middleware (timeout, request ID, tracing, caller identity)
//! - Serve on a listener until shutdown

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::schema::ServiceConfig;
use crate::confirmation::coordinator::ConfirmationCoordinator;
use crate::http::confirm::{confirm_handler, health_handler, state_handler};
use crate::http::middleware::caller::caller_middleware;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ConfirmationCoordinator>,
}

/// HTTP front of the confirmation coordinator.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ServiceConfig, coordinator: Arc<ConfirmationCoordinator>) -> Self {
        let state = AppState { coordinator };
        Self {
            router: build_router(state, config),
        }
    }

    /// Serve until Ctrl+C.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        self.run_until(listener, shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(state: AppState, config: &ServiceConfig) -> Router {
    Router::new()
        .route(
            "/agents/{agent_id}/operations/{operation}/confirm",
            post(confirm_handler),
        )
        .route("/agents/{agent_id}/operations/{operation}", get(state_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn(caller_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C, shutting down");
    }
    tracing::info!("Shutdown signal received");
}
