//! Readiness probe behind `GET /api/ready`.
//!
//! Readiness runs on its own short-lived connection (`max = 1`, 10s connect
//! timeout) instead of the shared pool, so pool exhaustion never reads as
//! "not ready". Each database sub-check opens and validates that connection
//! itself; without a database every one of them reports `not_ready` with its
//! own error rather than cascading.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::types::{ReadinessCheck, ReadinessChecks, ReadinessSnapshot, ReadyState};
use crate::config::{AppInfo, ReadinessConfig, SslMode};
use crate::core::error_reporting::{EventLevel, Reporter};
use crate::error::{AppError, Result};
use crate::infrastructure::database::postgres::connect_single;

const READINESS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait ReadinessStore: Send + Sync {
    async fn check_connection(&self) -> Result<()>;
    /// Names from `expected` that do not exist in the public schema.
    async fn missing_tables(&self, expected: &[String]) -> Result<Vec<String>>;
    async fn has_rows(&self, table: &str) -> Result<bool>;
}

pub struct PgReadinessStore {
    url: String,
    ssl_mode: SslMode,
}

impl PgReadinessStore {
    pub fn new(url: impl Into<String>, ssl_mode: SslMode) -> Self {
        Self {
            url: url.into(),
            ssl_mode,
        }
    }
}

fn quote_identifier(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(format!("\"{}\"", name))
    } else {
        Err(AppError::ConfigurationError(format!(
            "`{}` is not a valid table name",
            name
        )))
    }
}

#[async_trait]
impl ReadinessStore for PgReadinessStore {
    async fn check_connection(&self) -> Result<()> {
        let pool = connect_single(&self.url, self.ssl_mode, READINESS_CONNECT_TIMEOUT).await?;
        let outcome = sqlx::query("SELECT 1").execute(&pool).await;
        pool.close().await;
        outcome?;
        Ok(())
    }

    async fn missing_tables(&self, expected: &[String]) -> Result<Vec<String>> {
        let pool = connect_single(&self.url, self.ssl_mode, READINESS_CONNECT_TIMEOUT).await?;
        let outcome: std::result::Result<Vec<(String,)>, sqlx::Error> = sqlx::query_as(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_name = ANY($1)",
        )
        .bind(expected.to_vec())
        .fetch_all(&pool)
        .await;
        pool.close().await;

        let present: Vec<String> = outcome?.into_iter().map(|(name,)| name).collect();
        Ok(expected
            .iter()
            .filter(|table| !present.contains(table))
            .cloned()
            .collect())
    }

    async fn has_rows(&self, table: &str) -> Result<bool> {
        let table = quote_identifier(table)?;
        let pool = connect_single(&self.url, self.ssl_mode, READINESS_CONNECT_TIMEOUT).await?;
        let outcome: std::result::Result<(bool,), sqlx::Error> =
            sqlx::query_as(&format!("SELECT EXISTS (SELECT 1 FROM {} LIMIT 1)", table))
                .fetch_one(&pool)
                .await;
        pool.close().await;
        Ok(outcome?.0)
    }
}

pub trait EnvLookup: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

pub struct ReadinessProbe {
    store: Option<Arc<dyn ReadinessStore>>,
    env: Arc<dyn EnvLookup>,
    reporter: Arc<dyn Reporter>,
    config: ReadinessConfig,
    version: String,
    environment: String,
}

impl ReadinessProbe {
    /// `store` is `None` when no database URL is configured.
    pub fn new(
        app: &AppInfo,
        config: ReadinessConfig,
        store: Option<Arc<dyn ReadinessStore>>,
        env: Arc<dyn EnvLookup>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            store,
            env,
            reporter,
            config,
            version: app.version.clone(),
            environment: app.environment.clone(),
        }
    }

    pub async fn check_readiness(&self) -> ReadinessSnapshot {
        let start = Instant::now();

        let (database_connection, database_migrations, essential_data) = futures::future::join3(
            self.check_database_connection(),
            self.check_migrations(),
            self.check_essential_data(),
        )
        .await;

        let checks = ReadinessChecks {
            database_connection,
            database_migrations,
            essential_data,
            environment_variables: self.check_environment_variables(),
            sentry_integration: self.check_monitoring_integration(),
        };

        let status = checks.overall();
        if status == ReadyState::Ready {
            info!("Readiness check passed");
        } else {
            let failing: Vec<&str> = checks
                .all()
                .iter()
                .filter(|(_, check)| !check.is_ready())
                .map(|(name, _)| *name)
                .collect();
            warn!(failing = ?failing, "Readiness check failed");
        }

        ReadinessSnapshot {
            status,
            timestamp: Utc::now(),
            version: self.version.clone(),
            environment: self.environment.clone(),
            checks,
            response_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Global `not_ready` answer used when the probe itself failed.
    pub fn failed_snapshot(&self, error: &AppError, response_time: Duration) -> ReadinessSnapshot {
        self.reporter.capture_error(error, "readiness.check");
        ReadinessSnapshot {
            status: ReadyState::NotReady,
            timestamp: Utc::now(),
            version: self.version.clone(),
            environment: self.environment.clone(),
            checks: ReadinessChecks::all_not_ready(&error.to_string()),
            response_time_ms: response_time.as_millis() as u64,
        }
    }

    fn store(&self) -> Result<&Arc<dyn ReadinessStore>> {
        self.store.as_ref().ok_or_else(|| {
            AppError::ConfigurationError("DATABASE_URL is not configured".to_string())
        })
    }

    async fn check_database_connection(&self) -> ReadinessCheck {
        let outcome = async { self.store()?.check_connection().await }.await;
        match outcome {
            Ok(()) => ReadinessCheck::ready("Database connection successful"),
            Err(e) => ReadinessCheck::not_ready(e.to_string()),
        }
    }

    async fn check_migrations(&self) -> ReadinessCheck {
        let outcome = async {
            self.store()?
                .missing_tables(&self.config.expected_tables)
                .await
        }
        .await;
        match outcome {
            Ok(missing) if missing.is_empty() => ReadinessCheck::ready(format!(
                "All {} expected tables present",
                self.config.expected_tables.len()
            )),
            Ok(missing) => ReadinessCheck::missing(
                format!("Missing tables: {}", missing.join(", ")),
                missing,
            ),
            Err(e) => ReadinessCheck::not_ready(e.to_string()),
        }
    }

    async fn check_essential_data(&self) -> ReadinessCheck {
        let table = &self.config.essential_table;
        let outcome = async { self.store()?.has_rows(table).await }.await;
        match outcome {
            Ok(true) => ReadinessCheck::ready(format!("Reference data present in {}", table)),
            Ok(false) => ReadinessCheck::not_ready(format!("No rows found in {}", table)),
            Err(e) => ReadinessCheck::not_ready(e.to_string()),
        }
    }

    // Reports names only, never values.
    fn check_environment_variables(&self) -> ReadinessCheck {
        let missing: Vec<String> = self
            .config
            .required_env
            .iter()
            .filter(|entry| {
                !entry.split('|').map(str::trim).any(|key| {
                    self.env
                        .get(key)
                        .is_some_and(|value| !value.trim().is_empty())
                })
            })
            .cloned()
            .collect();

        if missing.is_empty() {
            ReadinessCheck::ready("All required environment variables present")
        } else {
            ReadinessCheck::missing(
                format!("Missing environment variables: {}", missing.join(", ")),
                missing,
            )
        }
    }

    fn check_monitoring_integration(&self) -> ReadinessCheck {
        if !self.reporter.is_active() {
            ReadinessCheck::not_ready("Error monitoring client not initialized")
        } else if !self.reporter.dsn_configured() {
            ReadinessCheck::not_ready("Error monitoring DSN not configured")
        } else {
            self.reporter.add_breadcrumb(
                "readiness",
                "Monitoring integration verified",
                EventLevel::Debug,
                serde_json::Value::Null,
            );
            ReadinessCheck::ready("Error monitoring configured")
        }
    }
}

/// Fixed answers for tests.
pub struct StaticReadinessStore {
    pub connection_error: Option<String>,
    pub missing_tables: Vec<String>,
    pub has_rows: bool,
}

impl StaticReadinessStore {
    pub fn ready() -> Self {
        Self {
            connection_error: None,
            missing_tables: Vec::new(),
            has_rows: true,
        }
    }

    pub fn unreachable(error: &str) -> Self {
        Self {
            connection_error: Some(error.to_string()),
            ..Self::ready()
        }
    }

    fn connected(&self) -> Result<()> {
        match &self.connection_error {
            Some(error) => Err(AppError::DatabaseError(error.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ReadinessStore for StaticReadinessStore {
    async fn check_connection(&self) -> Result<()> {
        self.connected()
    }

    async fn missing_tables(&self, expected: &[String]) -> Result<Vec<String>> {
        self.connected()?;
        Ok(expected
            .iter()
            .filter(|t| self.missing_tables.contains(t))
            .cloned()
            .collect())
    }

    async fn has_rows(&self, _table: &str) -> Result<bool> {
        self.connected()?;
        Ok(self.has_rows)
    }
}
