use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::alerts::{dispatch, Alert, AlertSeverity, Notifier};
use super::http_probe::{is_healthy_response, is_ready_response, HttpProbe};
use super::platform::{select_rollback_target, DeploymentPlatform};
use crate::config::MonitorConfig;
use crate::core::clock::Clock;
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct RollbackSettings {
    pub health_url: String,
    pub readiness_url: String,
    /// Budget for the platform rollback command.
    pub command_timeout: Duration,
    pub verify_interval: Duration,
    /// Budget for the post-rollback health verification, separate from
    /// `command_timeout`.
    pub verify_window: Duration,
}

impl RollbackSettings {
    pub fn from_monitor(config: &MonitorConfig) -> Self {
        Self {
            health_url: config.health_url.clone(),
            readiness_url: config.readiness_url.clone(),
            command_timeout: config.rollback_timeout,
            verify_interval: Duration::from_secs(10),
            verify_window: Duration::from_secs(300),
        }
    }
}

struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Guarded rollback to the previous successful deployment.
///
/// Once started a rollback runs to completion or failure; nothing cancels it.
pub struct RollbackCoordinator {
    platform: Arc<dyn DeploymentPlatform>,
    http: Arc<dyn HttpProbe>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: RollbackSettings,
    environment: String,
    in_progress: AtomicBool,
}

impl RollbackCoordinator {
    pub fn new(
        platform: Arc<dyn DeploymentPlatform>,
        http: Arc<dyn HttpProbe>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: RollbackSettings,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            http,
            notifier,
            clock,
            settings,
            environment: environment.into(),
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Rolls back and verifies the result.
    ///
    /// Returns `Ok(false)` without doing anything when another rollback is
    /// already running.
    pub async fn rollback(&self, reason: &str) -> Result<bool> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(reason, "Rollback already in progress, ignoring trigger");
            return Ok(false);
        }
        let _guard = InProgress(&self.in_progress);

        warn!(reason, "Starting rollback");
        dispatch(
            self.notifier.as_ref(),
            Alert::new(
                "Rollback started",
                format!("Automatic rollback initiated: {}", reason),
                AlertSeverity::Warning,
                &self.environment,
            )
            .field("Reason", reason),
        )
        .await;

        match self.execute(reason).await {
            Ok(target) => {
                info!(target = %target, "Rollback completed and verified");
                dispatch(
                    self.notifier.as_ref(),
                    Alert::new(
                        "Rollback succeeded",
                        format!("Rolled back to deployment {}", target),
                        AlertSeverity::Info,
                        &self.environment,
                    )
                    .field("Target", &target)
                    .field("Reason", reason),
                )
                .await;
                Ok(true)
            }
            Err(e) => {
                error!(error = %e, "Rollback failed, manual intervention required");
                dispatch(
                    self.notifier.as_ref(),
                    Alert::new(
                        "Rollback failed",
                        format!("Rollback failed: {}. Manual intervention required.", e),
                        AlertSeverity::Critical,
                        &self.environment,
                    )
                    .field("Reason", reason),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn execute(&self, reason: &str) -> Result<String> {
        let deployments = self.platform.list_deployments().await?;
        let target = select_rollback_target(&deployments)
            .ok_or(AppError::NoPreviousDeployment)?
            .id
            .clone();

        info!(target = %target, reason, "Rolling back to previous successful deployment");
        self.platform
            .rollback_to(&target, self.settings.command_timeout)
            .await?;

        self.wait_for_rollback_completion().await?;
        Ok(target)
    }

    /// Polls health and readiness until both pass or the window runs out.
    pub async fn wait_for_rollback_completion(&self) -> Result<()> {
        let interval = self.settings.verify_interval.max(Duration::from_millis(1));
        let attempts =
            (self.settings.verify_window.as_millis() / interval.as_millis()).max(1) as u32;

        for attempt in 1..=attempts {
            if self.is_serving().await {
                info!(attempt, "Rolled-back deployment is healthy and ready");
                return Ok(());
            }
            if attempt < attempts {
                self.clock.sleep(interval).await;
            }
        }

        Err(AppError::RollbackVerificationTimeout(
            self.settings.verify_window.as_secs(),
        ))
    }

    async fn is_serving(&self) -> bool {
        let (health, ready) = futures::future::join(
            self.http.get(&self.settings.health_url),
            self.http.get(&self.settings.readiness_url),
        )
        .await;

        matches!(health, Ok(ref r) if is_healthy_response(r))
            && matches!(ready, Ok(ref r) if is_ready_response(r))
    }
}
