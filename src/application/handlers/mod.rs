use axum::http::Uri;

use crate::error::AppError;

pub mod health;

/// Router fallback: unknown paths answer with the JSON error body.
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
