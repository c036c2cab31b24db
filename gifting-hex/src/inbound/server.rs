//! HTTP server configuration and startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use gifting_types::LedgerStore;

use super::auth::auth_middleware;
use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use super::webhook_guard::SignatureFailureTracker;
use crate::GiftingService;

/// Path the payment gateway delivers callbacks to.
pub const WEBHOOK_PATH: &str = "/webhooks/payment-gateway";

/// HTTP server for the gifting API.
pub struct HttpServer<S: LedgerStore> {
    state: Arc<AppState<S>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<S: LedgerStore> HttpServer<S> {
    /// Creates a server with the default limit of 100 requests per minute per owner.
    pub fn new(service: GiftingService<S>) -> Self {
        Self::with_rate_limit(service, 100)
    }

    /// Creates a server with a custom per-owner rate limit.
    pub fn with_rate_limit(service: GiftingService<S>, requests_per_minute: u32) -> Self {
        Self {
            state: Arc::new(AppState {
                service,
                signature_failures: SignatureFailureTracker::default(),
            }),
            rate_limiter: Arc::new(RateLimiterState::new(
                requests_per_minute,
                Duration::from_secs(60),
            )),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Uses the globally installed MeterProvider.
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        // Layers run bottom-up: auth resolves the owner, then the rate limiter keys on it.
        let owner_routes = Router::new()
            .route("/items/{id}/purchase", post(handlers::purchase::<S>))
            .route("/items/{id}", get(handlers::get_item::<S>))
            .route("/checkout", post(handlers::checkout::<S>))
            .route("/credits/checkout", post(handlers::credit_checkout::<S>))
            .route("/ledger", get(handlers::get_ledger::<S>))
            .route(
                "/ledger/transactions",
                get(handlers::list_transactions::<S>),
            )
            .route_layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware::<S>,
            ));

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api-docs/openapi.json", get(handlers::openapi_json))
            .route(WEBHOOK_PATH, post(handlers::payment_webhook::<S>))
            .merge(owner_routes)
            .layer(metrics)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received, draining in-flight requests");
}
