//! Post-deployment watch loop.
//!
//! The monitor polls the live health endpoint on a fixed interval for a
//! bounded window and rolls back once the number of consecutive failed
//! polls reaches the threshold. A poll only counts as a success when it is
//! a 200 whose payload says exactly `healthy`; the endpoint answers 200 for
//! `degraded` too, but the monitor does not accept it.
//!
//! ```text
//! Idle -> Monitoring -> (threshold reached) -> RollingBack -> Idle
//!                    -> (window elapsed | cancelled)       -> Idle
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::alerts::{dispatch, Alert, AlertSeverity, Notifier};
use super::http_probe::{is_healthy_response, HttpProbe};
use super::rollback::RollbackCoordinator;
use crate::config::MonitorConfig;
use crate::core::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Idle,
    Monitoring,
    RollingBack,
}

/// Outcome of a single health poll.
#[derive(Debug, Clone, Serialize)]
pub struct HealthPoll {
    pub healthy: bool,
    pub status_code: Option<u16>,
    pub status: Option<String>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RollbackMonitorState {
    pub consecutive_failures: u32,
    pub is_monitoring: bool,
    pub deployment_start_time: Option<Instant>,
    pub last_health_check: Option<HealthPoll>,
    pub rollback_in_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The window ran out without reaching the threshold.
    WindowElapsed,
    RolledBack,
    RollbackFailed,
    Cancelled,
    AlreadyMonitoring,
}

impl MonitorOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MonitorOutcome::WindowElapsed | MonitorOutcome::Cancelled)
    }
}

pub struct AutoRollbackMonitor {
    config: MonitorConfig,
    http: Arc<dyn HttpProbe>,
    coordinator: Arc<RollbackCoordinator>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    environment: String,
    state: Mutex<RollbackMonitorState>,
}

impl AutoRollbackMonitor {
    pub fn new(
        config: MonitorConfig,
        http: Arc<dyn HttpProbe>,
        coordinator: Arc<RollbackCoordinator>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            config,
            http,
            coordinator,
            notifier,
            clock,
            environment: environment.into(),
            state: Mutex::new(RollbackMonitorState::default()),
        }
    }

    pub fn state(&self) -> RollbackMonitorState {
        self.lock().clone()
    }

    pub fn phase(&self) -> MonitorPhase {
        let state = self.lock();
        if state.rollback_in_progress {
            MonitorPhase::RollingBack
        } else if state.is_monitoring {
            MonitorPhase::Monitoring
        } else {
            MonitorPhase::Idle
        }
    }

    /// One poll of the health endpoint under the strict success rule.
    pub async fn check(&self) -> HealthPoll {
        match self.http.get(&self.config.health_url).await {
            Ok(response) => HealthPoll {
                healthy: is_healthy_response(&response),
                status_code: Some(response.status_code),
                status: response.body_status().map(str::to_string),
                error: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthPoll {
                healthy: false,
                status_code: None,
                status: None,
                error: Some(e.to_string()),
                checked_at: Utc::now(),
            },
        }
    }

    /// Watches the deployment until the window elapses, the threshold is
    /// reached or `cancel` fires. Cancellation is observed between polls only.
    pub async fn start_monitoring(&self, cancel: CancellationToken) -> MonitorOutcome {
        let started = {
            let mut state = self.lock();
            if state.is_monitoring || state.rollback_in_progress {
                warn!("Monitoring already active, ignoring start request");
                return MonitorOutcome::AlreadyMonitoring;
            }
            let now = self.clock.now();
            *state = RollbackMonitorState {
                is_monitoring: true,
                deployment_start_time: Some(now),
                ..RollbackMonitorState::default()
            };
            now
        };

        info!(
            health_url = %self.config.health_url,
            interval_ms = self.config.check_interval.as_millis() as u64,
            threshold = self.config.failure_threshold,
            duration_ms = self.config.monitoring_duration.as_millis() as u64,
            "Started post-deployment monitoring"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.stop();
                    info!("Monitoring cancelled");
                    return MonitorOutcome::Cancelled;
                }
                _ = self.clock.sleep(self.config.check_interval) => {}
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= self.config.monitoring_duration {
                self.stop();
                info!(elapsed_s = elapsed.as_secs(), "Monitoring window elapsed without rollback");
                dispatch(
                    self.notifier.as_ref(),
                    Alert::new(
                        "Monitoring completed",
                        format!(
                            "Deployment stayed healthy for {} minutes",
                            self.config.monitoring_duration.as_secs() / 60
                        ),
                        AlertSeverity::Info,
                        &self.environment,
                    ),
                )
                .await;
                return MonitorOutcome::WindowElapsed;
            }

            let poll = self.check().await;
            let failures = self.record(poll);
            if failures < self.config.failure_threshold {
                continue;
            }

            {
                let mut state = self.lock();
                state.is_monitoring = false;
                state.rollback_in_progress = true;
            }
            error!(
                consecutive_failures = failures,
                "Failure threshold reached, triggering rollback"
            );

            let reason = format!("{} consecutive health check failures", failures);
            let result = self.coordinator.rollback(&reason).await;
            self.lock().rollback_in_progress = false;

            return match result {
                Ok(true) => MonitorOutcome::RolledBack,
                Ok(false) => {
                    warn!("Another rollback was already running");
                    MonitorOutcome::RollbackFailed
                }
                Err(e) => {
                    error!(error = %e, "Automatic rollback failed");
                    MonitorOutcome::RollbackFailed
                }
            };
        }
    }

    /// Returns the updated consecutive failure count.
    fn record(&self, poll: HealthPoll) -> u32 {
        let mut state = self.lock();
        if poll.healthy {
            if state.consecutive_failures > 0 {
                info!(
                    previous_failures = state.consecutive_failures,
                    "Health check recovered"
                );
            }
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures += 1;
            warn!(
                consecutive_failures = state.consecutive_failures,
                threshold = self.config.failure_threshold,
                status_code = ?poll.status_code,
                status = ?poll.status,
                error = ?poll.error,
                "Health check failed"
            );
        }
        state.last_health_check = Some(poll);
        state.consecutive_failures
    }

    fn stop(&self) {
        self.lock().is_monitoring = false;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RollbackMonitorState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}
