use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infrastructure::database::ConnectionInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseCheck {
    pub status: HealthStatus,
    /// Elapsed milliseconds, reported even when the query failed.
    pub latency: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<ConnectionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryCheck {
    pub status: HealthStatus,
    pub used_mb: u64,
    pub total_mb: u64,
    pub usage_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringCheck {
    pub status: HealthStatus,
    pub client_active: bool,
    pub dsn_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemCheck {
    pub status: HealthStatus,
    pub writable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub database: DatabaseCheck,
    pub memory: MemoryCheck,
    #[serde(rename = "sentry")]
    pub external_monitoring: MonitoringCheck,
    pub filesystem: FilesystemCheck,
}

impl HealthChecks {
    pub fn statuses(&self) -> [(&'static str, HealthStatus); 4] {
        [
            ("database", self.database.status),
            ("memory", self.memory.status),
            ("externalMonitoring", self.external_monitoring.status),
            ("filesystem", self.filesystem.status),
        ]
    }

    /// `healthy` only when every check is healthy, `degraded` otherwise.
    pub fn overall(&self) -> HealthStatus {
        if self
            .statuses()
            .iter()
            .all(|(_, status)| *status == HealthStatus::Healthy)
        {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }
}

/// Result of one health probe invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<HealthChecks>,
    #[serde(rename = "uptime")]
    pub uptime_seconds: u64,
    #[serde(rename = "responseTime")]
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthSnapshot {
    pub fn http_status_code(&self) -> u16 {
        match self.status {
            HealthStatus::Healthy | HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    Ready,
    NotReady,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessCheck {
    pub status: ReadyState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadinessCheck {
    pub fn ready(message: impl Into<String>) -> Self {
        Self {
            status: ReadyState::Ready,
            message: Some(message.into()),
            missing: Vec::new(),
            error: None,
        }
    }

    pub fn not_ready(error: impl Into<String>) -> Self {
        Self {
            status: ReadyState::NotReady,
            message: None,
            missing: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn missing(error: impl Into<String>, missing: Vec<String>) -> Self {
        Self {
            missing,
            ..Self::not_ready(error)
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ReadyState::Ready
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessChecks {
    pub database_connection: ReadinessCheck,
    pub database_migrations: ReadinessCheck,
    pub essential_data: ReadinessCheck,
    pub environment_variables: ReadinessCheck,
    pub sentry_integration: ReadinessCheck,
}

impl ReadinessChecks {
    pub fn all(&self) -> [(&'static str, &ReadinessCheck); 5] {
        [
            ("database_connection", &self.database_connection),
            ("database_migrations", &self.database_migrations),
            ("essential_data", &self.essential_data),
            ("environment_variables", &self.environment_variables),
            ("sentry_integration", &self.sentry_integration),
        ]
    }

    pub fn overall(&self) -> ReadyState {
        if self.all().iter().all(|(_, check)| check.is_ready()) {
            ReadyState::Ready
        } else {
            ReadyState::NotReady
        }
    }

    /// Every sub-check forced to `not_ready` with the same error.
    pub fn all_not_ready(error: &str) -> Self {
        Self {
            database_connection: ReadinessCheck::not_ready(error),
            database_migrations: ReadinessCheck::not_ready(error),
            essential_data: ReadinessCheck::not_ready(error),
            environment_variables: ReadinessCheck::not_ready(error),
            sentry_integration: ReadinessCheck::not_ready(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessSnapshot {
    pub status: ReadyState,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub environment: String,
    pub checks: ReadinessChecks,
    #[serde(rename = "responseTime")]
    pub response_time_ms: u64,
}

impl ReadinessSnapshot {
    pub fn http_status_code(&self) -> u16 {
        match self.status {
            ReadyState::Ready => 200,
            ReadyState::NotReady => 503,
        }
    }
}
