//! Probe endpoint handlers
//!
//! Both handlers bound the probe with the configured handler timeout. A
//! probe that overruns answers 503 with a globally failed body instead of
//! leaving the caller hanging.

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::{error::AppError, AppState};

fn no_store<T: Serialize>(status_code: u16, body: T) -> Response {
    let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// `GET /api/health`
pub async fn health_check(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let snapshot = match tokio::time::timeout(state.handler_timeout, state.health.check_health())
        .await
    {
        Ok(snapshot) => snapshot,
        Err(_) => {
            let error = AppError::Timeout(format!(
                "Health check exceeded {}ms",
                state.handler_timeout.as_millis()
            ));
            error!(error = %error, "Health check did not complete");
            state.health.failed_snapshot(&error.to_string(), start.elapsed())
        }
    };

    no_store(snapshot.http_status_code(), snapshot)
}

/// `GET /api/ready`
pub async fn readiness_check(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let snapshot = match tokio::time::timeout(
        state.handler_timeout,
        state.readiness.check_readiness(),
    )
    .await
    {
        Ok(snapshot) => snapshot,
        Err(_) => {
            let error = AppError::Timeout(format!(
                "Readiness check exceeded {}ms",
                state.handler_timeout.as_millis()
            ));
            warn!(error = %error, "Readiness check did not complete");
            state.readiness.failed_snapshot(&error, start.elapsed())
        }
    };

    no_store(snapshot.http_status_code(), snapshot)
}
