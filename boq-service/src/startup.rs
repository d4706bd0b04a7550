//! Application startup and lifecycle management.

use crate::billing::InvoiceLifecycle;
use crate::config::BoqConfig;
use crate::handlers::{documents, invoices, rate_card};
use crate::repository::Repository;
use crate::services::{get_metrics, init_metrics, Database, IngestionService};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use service_core::retry::RetryConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub ingestion: IngestionService,
    pub invoices: InvoiceLifecycle,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repository>, retry: RetryConfig) -> Self {
        Self {
            ingestion: IngestionService::new(repo.clone(), retry.clone()),
            invoices: InvoiceLifecycle::new(repo.clone(), retry),
            repo,
        }
    }
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.repo.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "boq-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "boq-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.repo.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Build the HTTP router over `state`.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route(
            "/vendors/:vendor/rate-card",
            put(rate_card::replace_rate_card).get(rate_card::get_rate_card),
        )
        .route(
            "/vendors/:vendor/documents/:reference",
            post(documents::ingest_document),
        )
        .route(
            "/documents/:document_id/line-items",
            get(documents::list_line_items),
        )
        .route(
            "/invoices",
            post(invoices::create_invoice).get(invoices::list_invoices),
        )
        .route(
            "/invoices/:invoice_id",
            get(invoices::get_invoice).delete(invoices::delete_invoice),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        // Innermost, so handlers run inside the span carrying request_id/user_id.
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
    max_upload_bytes: usize,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: BoqConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: BoqConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: BoqConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?
        .with_lock_timeout(config.database.lock_timeout_ms);

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let state = AppState::new(Arc::new(db), config.billing.retry_config());

        let http_addr = SocketAddr::new(config.common.host, config.common.port);
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "boq-service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = router(self.state, self.max_upload_bytes);

        tracing::info!(
            service = "boq-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, app).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
