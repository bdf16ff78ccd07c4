use crate::{
    application::handlers::health::{health_check, readiness_check},
    AppState,
};
use axum::{routing::get, Router};

/// Probe routes, mounted under `/api`.
pub fn health_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
}
