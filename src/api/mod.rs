//! REST API server module
//!
//! Provides an OpenAPI 3.1 compliant REST API for starting slice jobs,
//! following their progress (SSE or WebSocket) and retrieving the result.

use crate::{Config, Result, SliceDownloader};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Prefix every API route is nested under
pub const API_PREFIX: &str = "/api/v1";

/// Create the API router with all route definitions
///
/// # Routes
///
/// All routes below are nested under `/api/v1`.
///
/// ## Jobs
/// - `POST /jobs` - Start a job
/// - `GET /jobs` - List jobs
/// - `GET /jobs/:id` - Get single job
/// - `DELETE /jobs/:id` - Remove a finished job and its files
/// - `GET /jobs/:id/events` - Server-sent events stream of one job
/// - `GET /jobs/:id/file` - Download the finished artifact (once)
///
/// ## Channel
/// - `GET /ws` - WebSocket channel for starting and following jobs
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
///
/// Swagger UI is served at `/swagger-ui` when enabled.
pub fn create_router(downloader: Arc<SliceDownloader>, config: Arc<Config>) -> Router {
    let state = AppState::new(downloader, config.clone());

    let api = Router::new()
        // Jobs
        .route("/jobs", post(routes::start_job).get(routes::list_jobs))
        .route("/jobs/:id", get(routes::get_job).delete(routes::delete_job))
        .route("/jobs/:id/events", get(routes::job_events))
        .route("/jobs/:id/file", get(routes::download_file))
        // Channel
        .route("/ws", get(routes::channel))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .with_state(state);

    // Authentication applies to the API routes only, not the Swagger UI
    let api = if config.server.api.api_key.is_some() {
        api.layer(middleware::from_fn_with_state(
            config.server.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        api
    };

    let router = Router::new().nest(API_PREFIX, api);

    let router = if config.server.api.swagger_ui {
        router.merge(
            SwaggerUi::new("/swagger-ui")
                .url(format!("{}/openapi.json", API_PREFIX), ApiDoc::openapi()),
        )
    } else {
        router
    };

    // Apply CORS middleware if enabled in config
    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the downloader shuts down or the listener fails.
///
/// # Example
///
/// ```no_run
/// use slice_dl::{SliceDownloader, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let downloader = Arc::new(SliceDownloader::new((*config).clone()).await?);
///
/// // Start API server (blocks until shutdown)
/// slice_dl::api::start_api_server(downloader, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(downloader: Arc<SliceDownloader>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.server.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let stopped = downloader.shutdown_token.clone();
    let app = create_router(downloader, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().unwrap_or(bind_address),
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { stopped.cancelled().await })
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
