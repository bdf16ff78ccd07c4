use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::postgres::PgDatabase;
use super::throttle::RateLimitedLog;
use crate::config::DatabaseConfig;
use crate::core::clock::Clock;
use crate::core::error_reporting::{EventLevel, Reporter};
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionCounts {
    pub total: u32,
    pub active: u32,
    pub idle: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub total: u32,
    pub active: u32,
    pub idle: u32,
    pub max: u32,
    pub utilization_percent: f64,
}

/// Query-capable database handle.
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    async fn ping(&self) -> Result<()>;
    /// Connection counts taken from the server's own activity view.
    async fn connection_counts(&self) -> Result<ConnectionCounts>;
    async fn close(&self);
}

/// Checks that a connection URL points at a usable target.
pub fn validate_database_url(raw: &str, production: bool) -> std::result::Result<(), String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("unparsable connection URL: {}", e))?;

    if !matches!(parsed.scheme(), "postgres" | "postgresql") {
        return Err(format!("unsupported scheme `{}`", parsed.scheme()));
    }

    let host = parsed.host_str().unwrap_or_default();
    if host.is_empty() {
        return Err("connection URL has no host".to_string());
    }

    if production && matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]") {
        return Err(format!("`{}` is not reachable from a production deployment", host));
    }

    Ok(())
}

/// Owns the shared connection pool.
///
/// A manager whose URL was missing or invalid stays unavailable for its whole
/// life: `get_database` fails with `PoolNotInitialized` and callers degrade
/// their own status instead of panicking.
pub struct ConnectionPoolManager {
    config: DatabaseConfig,
    handle: RwLock<Option<Arc<dyn DatabaseHandle>>>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    failure_log: RateLimitedLog,
    reporter: Arc<dyn Reporter>,
    clock: Arc<dyn Clock>,
}

impl ConnectionPoolManager {
    /// Reads the connection settings and creates the lazy Postgres pool.
    pub fn initialize(
        config: DatabaseConfig,
        production: bool,
        reporter: Arc<dyn Reporter>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let handle: Option<Arc<dyn DatabaseHandle>> = match config.url.as_deref() {
            None => {
                warn!("DATABASE_URL is not set; database pool left uninitialized");
                None
            }
            Some(url) => match validate_database_url(url, production) {
                Err(reason) => {
                    warn!(
                        reason = %reason,
                        "Invalid DATABASE_URL; database pool left uninitialized"
                    );
                    None
                }
                Ok(()) => match PgDatabase::connect_lazy(url, &config) {
                    Ok(db) => {
                        info!(
                            max_connections = config.max_connections,
                            connect_timeout_secs = config.connect_timeout.as_secs(),
                            idle_timeout_secs = config.idle_timeout.as_secs(),
                            ssl_mode = ?config.ssl_mode,
                            "Database connection pool initialized"
                        );
                        Some(Arc::new(db))
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to build database pool; left uninitialized");
                        None
                    }
                },
            },
        };

        Self::with_handle(config, handle, reporter, clock)
    }

    pub fn with_handle(
        config: DatabaseConfig,
        handle: Option<Arc<dyn DatabaseHandle>>,
        reporter: Arc<dyn Reporter>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let failure_log = RateLimitedLog::new(config.failure_log_interval);
        Arc::new(Self {
            config,
            handle: RwLock::new(handle),
            monitor_task: Mutex::new(None),
            failure_log,
            reporter,
            clock,
        })
    }

    pub async fn is_database_available(&self) -> bool {
        self.handle.read().await.is_some()
    }

    pub async fn get_database(&self) -> Result<Arc<dyn DatabaseHandle>> {
        self.handle
            .read()
            .await
            .clone()
            .ok_or(AppError::PoolNotInitialized)
    }

    /// Spawns the periodic self-check. Replaces any previously running one.
    pub fn start_health_monitor(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.health_check_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                let _ = manager.run_health_check().await;
            }
        });

        let mut slot = self.monitor_task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
        debug!(interval_secs = period.as_secs(), "Database health monitor started");
    }

    /// One self-check round. Failures are logged at most once per
    /// `failure_log_interval`.
    pub async fn run_health_check(&self) -> Result<()> {
        let outcome = match self.get_database().await {
            Ok(db) => db.ping().await,
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            if self.failure_log.allow(self.clock.now()) {
                error!(error = %e, "Database health check failed");
                self.reporter.capture_error(e, "database.periodic_health_check");
            }
        }

        outcome
    }

    /// Returns `None` whenever the numbers cannot be obtained.
    pub async fn get_connection_info(&self) -> Option<ConnectionInfo> {
        let db = self.get_database().await.ok()?;
        match db.connection_counts().await {
            Ok(counts) => {
                let max = self.config.max_connections;
                let utilization_percent = if max == 0 {
                    0.0
                } else {
                    (counts.total as f64 / max as f64 * 1000.0).round() / 10.0
                };
                Some(ConnectionInfo {
                    total: counts.total,
                    active: counts.active,
                    idle: counts.idle,
                    max,
                    utilization_percent,
                })
            }
            Err(e) => {
                debug!(error = %e, "Connection info unavailable");
                None
            }
        }
    }

    /// Runs `operation` against the live handle, retrying with exponential
    /// backoff (`initial_delay * 2^(attempt-1)`). The last error is reported
    /// and returned once `max_retries` attempts have failed.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        mut operation: F,
        max_retries: u32,
        initial_delay: Duration,
    ) -> Result<T>
    where
        F: FnMut(Arc<dyn DatabaseHandle>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = max_retries.max(1);
        let mut attempt = 1;

        loop {
            let db = self.get_database().await?;

            match operation(db).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(attempt, "Database operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt >= max_attempts || !e.is_retryable() => {
                    error!(
                        attempt,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Database operation failed, giving up"
                    );
                    self.reporter.capture_error(&e, "database.execute_with_retry");
                    return Err(e);
                }
                Err(e) => {
                    let delay = initial_delay.saturating_mul(2u32.saturating_pow(attempt - 1));
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Database operation failed, retrying after delay"
                    );
                    self.reporter.add_breadcrumb(
                        "database",
                        "Retrying database operation",
                        EventLevel::Warning,
                        json!({
                            "attempt": attempt,
                            "delay_ms": delay.as_millis() as u64,
                            "error": e.to_string(),
                        }),
                    );
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Stops the periodic check and closes every pooled connection.
    /// Calling it again is a no-op.
    pub async fn graceful_shutdown(&self) {
        let task = self
            .monitor_task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }

        let handle = self.handle.write().await.take();
        match handle {
            Some(db) => {
                info!("Closing database connections");
                db.close().await;
                info!("Database connections closed");
            }
            None => debug!("Database pool already shut down"),
        }
    }

    pub fn is_monitor_running(&self) -> bool {
        self.monitor_task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }
}

/// Scriptable handle for tests.
pub struct FakeDatabase {
    latency: Duration,
    failure: Mutex<Option<String>>,
    counts: Option<ConnectionCounts>,
    pings: AtomicUsize,
    closed: AtomicBool,
}

impl FakeDatabase {
    pub fn healthy() -> Self {
        Self {
            latency: Duration::ZERO,
            failure: Mutex::new(None),
            counts: Some(ConnectionCounts {
                total: 4,
                active: 1,
                idle: 3,
            }),
            pings: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn failing(message: &str) -> Self {
        let db = Self::healthy();
        db.set_failure(Some(message));
        db
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn without_counts(mut self) -> Self {
        self.counts = None;
        self
    }

    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock().unwrap_or_else(|p| p.into_inner()) = message.map(str::to_string);
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseHandle for FakeDatabase {
    async fn ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failure = self.failure.lock().unwrap_or_else(|p| p.into_inner()).clone();
        match failure {
            Some(message) => Err(AppError::DatabaseError(message)),
            None => Ok(()),
        }
    }

    async fn connection_counts(&self) -> Result<ConnectionCounts> {
        self.counts
            .ok_or_else(|| AppError::DatabaseError("pg_stat_activity unavailable".to_string()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
