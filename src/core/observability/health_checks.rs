use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::memory::MemorySampler;
use super::types::{
    DatabaseCheck, FilesystemCheck, HealthChecks, HealthSnapshot, HealthStatus, MemoryCheck,
    MonitoringCheck,
};
use crate::config::AppInfo;
use crate::core::error_reporting::{EventLevel, Reporter};
use crate::infrastructure::database::ConnectionPoolManager;

const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(1000);
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Liveness probe behind `GET /api/health`.
///
/// Every sub-check converts its own failures into a status value, so
/// `check_health` always returns a snapshot.
pub struct HealthProbe {
    pool: Arc<ConnectionPoolManager>,
    memory: Arc<dyn MemorySampler>,
    reporter: Arc<dyn Reporter>,
    fs_probe_dir: PathBuf,
    version: String,
    environment: String,
    started_at: Instant,
}

impl HealthProbe {
    pub fn new(
        app: &AppInfo,
        pool: Arc<ConnectionPoolManager>,
        memory: Arc<dyn MemorySampler>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            pool,
            memory,
            reporter,
            fs_probe_dir: app.fs_probe_dir.clone(),
            version: app.version.clone(),
            environment: app.environment.clone(),
            started_at: Instant::now(),
        }
    }

    pub async fn check_health(&self) -> HealthSnapshot {
        let start = Instant::now();

        let (database, filesystem) =
            futures::future::join(self.check_database(), self.check_filesystem()).await;
        let memory = self.check_memory();
        let external_monitoring = self.check_monitoring();

        let checks = HealthChecks {
            database,
            memory,
            external_monitoring,
            filesystem,
        };
        let status = checks.overall();

        let snapshot = HealthSnapshot {
            status,
            timestamp: Utc::now(),
            version: self.version.clone(),
            environment: self.environment.clone(),
            checks: Some(checks),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            response_time_ms: start.elapsed().as_millis() as u64,
            error: None,
        };

        self.report(&snapshot);
        snapshot
    }

    /// Snapshot for a probe that could not finish.
    pub fn failed_snapshot(&self, error: &str, response_time: Duration) -> HealthSnapshot {
        HealthSnapshot {
            status: HealthStatus::Unhealthy,
            timestamp: Utc::now(),
            version: self.version.clone(),
            environment: self.environment.clone(),
            checks: None,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            response_time_ms: response_time.as_millis() as u64,
            error: Some(error.to_string()),
        }
    }

    async fn check_database(&self) -> DatabaseCheck {
        let start = Instant::now();
        let outcome = match self.pool.get_database().await {
            Ok(db) => db.ping().await,
            Err(e) => Err(e),
        };
        let latency = start.elapsed();

        match outcome {
            Ok(()) => DatabaseCheck {
                status: if latency < SLOW_QUERY_THRESHOLD {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded
                },
                latency: latency.as_millis() as u64,
                connections: self.pool.get_connection_info().await,
                error: None,
            },
            Err(e) => DatabaseCheck {
                status: HealthStatus::Unhealthy,
                latency: latency.as_millis() as u64,
                connections: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn check_memory(&self) -> MemoryCheck {
        match self.memory.sample() {
            Ok(usage) => MemoryCheck {
                status: usage.status(),
                used_mb: usage.used_bytes / BYTES_PER_MB,
                total_mb: usage.total_bytes / BYTES_PER_MB,
                usage_percent: (usage.ratio() * 1000.0).round() / 10.0,
                error: None,
            },
            Err(e) => MemoryCheck {
                status: HealthStatus::Unhealthy,
                used_mb: 0,
                total_mb: 0,
                usage_percent: 0.0,
                error: Some(e.to_string()),
            },
        }
    }

    // A missing monitoring client never fails the probe.
    fn check_monitoring(&self) -> MonitoringCheck {
        let client_active = self.reporter.is_active();
        let dsn_configured = self.reporter.dsn_configured();
        MonitoringCheck {
            status: if client_active && dsn_configured {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            client_active,
            dsn_configured,
            error: None,
        }
    }

    async fn check_filesystem(&self) -> FilesystemCheck {
        let marker = self
            .fs_probe_dir
            .join(format!(".health-check-{}", Uuid::new_v4()));

        let outcome = async {
            tokio::fs::write(&marker, b"ok").await?;
            tokio::fs::remove_file(&marker).await
        }
        .await;

        match outcome {
            Ok(()) => FilesystemCheck {
                status: HealthStatus::Healthy,
                writable: true,
                error: None,
            },
            Err(e) => {
                let _ = tokio::fs::remove_file(&marker).await;
                FilesystemCheck {
                    status: HealthStatus::Unhealthy,
                    writable: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn report(&self, snapshot: &HealthSnapshot) {
        let summary = snapshot.checks.as_ref().map(|checks| {
            checks
                .statuses()
                .iter()
                .map(|(name, status)| (name.to_string(), json!(status.as_str())))
                .collect::<serde_json::Map<_, _>>()
        });

        self.reporter.add_breadcrumb(
            "health",
            "Health check completed",
            EventLevel::Info,
            json!({
                "status": snapshot.status.as_str(),
                "responseTime": snapshot.response_time_ms,
                "checks": summary,
            }),
        );

        if snapshot.status == HealthStatus::Healthy {
            debug!(response_time_ms = snapshot.response_time_ms, "Health check passed");
        } else {
            warn!(
                status = snapshot.status.as_str(),
                response_time_ms = snapshot.response_time_ms,
                "Health check reported non-healthy status"
            );
            self.reporter.capture_message(
                &format!("Health check status: {}", snapshot.status.as_str()),
                EventLevel::Warning,
            );
        }
    }
}
