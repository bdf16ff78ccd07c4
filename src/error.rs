use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Database pool is not initialized")]
    PoolNotInitialized,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("No deployment URL found in platform output")]
    DeploymentUrlNotFound,

    #[error("No previous successful deployment found to roll back to")]
    NoPreviousDeployment,

    #[error("Rollback verification timed out after {0} seconds")]
    RollbackVerificationTimeout(u64),

    #[error("Deployment failed: {0}")]
    DeploymentFailed(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl AppError {
    /// Transient failures that may succeed when attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseError(_) | AppError::NetworkError(_) | AppError::Timeout(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                AppError::Timeout("Timed out acquiring a database connection".to_string())
            }
            other => AppError::DatabaseError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else {
            AppError::NetworkError(err.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DatabaseError(_) | AppError::PoolNotInitialized => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::NetworkError(_) | AppError::CommandFailed { .. } => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) | AppError::RollbackVerificationTimeout(_) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DeploymentUrlNotFound
            | AppError::NoPreviousDeployment
            | AppError::DeploymentFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotificationError(_)
            | AppError::SerializationError(_)
            | AppError::IoError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::DatabaseError("connection reset".into()).is_retryable());
        assert!(AppError::Timeout("slow".into()).is_retryable());
        assert!(!AppError::PoolNotInitialized.is_retryable());
        assert!(!AppError::NoPreviousDeployment.is_retryable());
    }

    #[test]
    fn test_error_response_status() {
        let response = AppError::NotFound("/api/nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = AppError::PoolNotInitialized.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
