//! Shared application router builder.
//!
//! Both the binary and the integration tests use [`build_app_router`] so
//! they run the same middleware stack.

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::handlers::{health, index, jobs, optimize};
use crate::state::AppState;

/// Build the full application [`Router`] with all middleware layers.
///
/// The middleware stack is applied bottom-up:
///
/// 1. CORS (only when origins are configured)
/// 2. Structured request/response tracing
/// 3. Panic recovery (catch panics, return 500)
/// 4. Upload body limit
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    let body_limit = state.service.max_upload_bytes;

    let router = Router::new()
        .route("/", get(index::index))
        .route("/health", get(health::health_check))
        .route("/start", post(jobs::start_job))
        .route("/status/{job_id}", get(jobs::job_status))
        .route("/download/{job_id}", get(jobs::download))
        .route("/optimize", post(optimize::optimize))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let router = match build_cors_layer(config) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.with_state(state)
}

/// CORS layer for the configured origins. Origins that do not parse as
/// header values are skipped with a warning.
pub fn build_cors_layer(config: &ServerConfig) -> Option<CorsLayer> {
    if config.cors_origins.is_empty() {
        return None;
    }

    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(%origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([CONTENT_TYPE])
            .max_age(Duration::from_secs(3600)),
    )
}
