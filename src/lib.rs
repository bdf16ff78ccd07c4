//! Deploy Sentinel - deployment safety tooling for a Postgres-backed web service
//!
//! This library provides the liveness and readiness probes served over HTTP,
//! the shared connection pool they rely on, and the orchestration used by the
//! deployment CLIs: blue-green promotion, automatic rollback and post-deploy
//! verification.

use axum::{http::Method, Router};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod application;
pub mod config;
pub mod core;
pub mod deployment;
pub mod error;
pub mod infrastructure;
pub mod presentation;

// Re-export commonly used types
pub use error::{AppError, Result};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<core::observability::HealthProbe>,
    pub readiness: Arc<core::observability::ReadinessProbe>,
    pub handler_timeout: Duration,
}

/// Builds the HTTP application serving the probe endpoints.
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::HEAD]);

    Router::new()
        .nest("/api", presentation::routes::health_router())
        .fallback(application::handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
