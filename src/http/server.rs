//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with the single gateway endpoint
//! - Wire up middleware (tracing, request ID, timeout)
//! - Cap concurrently processed requests at `listener.max_connections`
//! - Serve until shutdown, then drain in-flight requests

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::gateway::GatewayController;
use crate::http::request::RequestIdLayer;
use crate::lifecycle::Shutdown;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayController>,
    /// One permit per request being processed.
    pub in_flight: Arc<Semaphore>,
}

/// HTTP front of the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(gateway: Arc<GatewayController>) -> Self {
        Self {
            router: Self::build_router(gateway),
        }
    }

    /// Every path and method lands in the gateway; dispatch is by parameters,
    /// not by route.
    #[allow(deprecated)]
    pub fn build_router(gateway: Arc<GatewayController>) -> Router {
        let config = gateway.settings().config.clone();
        let state = AppState {
            gateway,
            in_flight: Arc::new(Semaphore::new(config.listener.max_connections.max(1))),
        };
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Arc<Shutdown>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    // waits for a slot while the limit is reached
    let _permit = match state.in_flight.acquire().await {
        Ok(permit) => Some(permit),
        Err(_) => {
            tracing::warn!("Request limiter closed, processing without a permit");
            None
        }
    };
    tracing::trace!(available = state.in_flight.available_permits(), "Request admitted");
    state.gateway.handle(request).await
}
