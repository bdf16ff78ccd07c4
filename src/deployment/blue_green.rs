use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::http_probe::{endpoint, is_healthy_response, is_ready_response, HttpProbe, ProbeResponse};
use super::platform::{CurrentDeployment, DeploymentPlatform, PreviewDeployment};
use super::rollback::RollbackCoordinator;
use crate::core::clock::Clock;
use crate::core::console;
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct BlueGreenSettings {
    pub production_url: String,
    pub health_retries: u32,
    pub readiness_retries: u32,
    pub retry_interval: Duration,
    /// Wait after promotion before the production URL is checked.
    pub propagation_delay: Duration,
    pub final_health_retries: u32,
}

impl BlueGreenSettings {
    pub fn new(production_url: impl Into<String>) -> Self {
        Self {
            production_url: production_url.into(),
            health_retries: 10,
            readiness_retries: 5,
            retry_interval: Duration::from_secs(3),
            propagation_delay: Duration::from_secs(10),
            final_health_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploySummary {
    pub previous: CurrentDeployment,
    pub preview: PreviewDeployment,
    pub production_url: String,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

/// Preview, verify, promote, re-verify. Every step is mandatory and the first
/// failure aborts the deploy.
pub struct BlueGreenDeployer {
    platform: Arc<dyn DeploymentPlatform>,
    http: Arc<dyn HttpProbe>,
    coordinator: Arc<RollbackCoordinator>,
    clock: Arc<dyn Clock>,
    settings: BlueGreenSettings,
}

impl BlueGreenDeployer {
    pub fn new(
        platform: Arc<dyn DeploymentPlatform>,
        http: Arc<dyn HttpProbe>,
        coordinator: Arc<RollbackCoordinator>,
        clock: Arc<dyn Clock>,
        settings: BlueGreenSettings,
    ) -> Self {
        Self {
            platform,
            http,
            coordinator,
            clock,
            settings,
        }
    }

    pub async fn create_preview_deployment(&self) -> Result<PreviewDeployment> {
        console::step("Creating preview deployment...");
        let preview = self.platform.create_preview().await?;
        console::success(&format!("Preview deployment created: {}", preview.url));
        Ok(preview)
    }

    pub async fn wait_for_health_check(&self, base_url: &str, max_retries: u32) -> bool {
        let url = endpoint(base_url, "/api/health");
        console::step(&format!("Waiting for health check at {}", url));
        self.poll_until(&url, max_retries, is_healthy_response).await
    }

    pub async fn wait_for_readiness_check(&self, base_url: &str, max_retries: u32) -> bool {
        let url = endpoint(base_url, "/api/ready");
        console::step(&format!("Waiting for readiness check at {}", url));
        self.poll_until(&url, max_retries, is_ready_response).await
    }

    async fn poll_until(
        &self,
        url: &str,
        max_retries: u32,
        accept: fn(&ProbeResponse) -> bool,
    ) -> bool {
        for attempt in 1..=max_retries {
            match self.http.get(url).await {
                Ok(response) if accept(&response) => {
                    console::success(&format!(
                        "{} passed (attempt {}/{})",
                        url, attempt, max_retries
                    ));
                    return true;
                }
                Ok(response) => warn!(
                    url,
                    attempt,
                    status_code = response.status_code,
                    status = ?response.body_status(),
                    "Check not passing yet"
                ),
                Err(e) => warn!(url, attempt, error = %e, "Check request failed"),
            }
            console::plain(&format!("Attempt {}/{} did not pass", attempt, max_retries));
            if attempt < max_retries {
                self.clock.sleep(self.settings.retry_interval).await;
            }
        }
        console::failure(&format!("{} did not pass after {} attempts", url, max_retries));
        false
    }

    pub async fn promote_preview_to_production(&self, preview: &PreviewDeployment) -> Result<()> {
        console::step("Promoting preview deployment to production...");
        self.platform.promote_to_production(preview).await?;
        console::success("Promotion command completed");
        Ok(())
    }

    pub async fn deploy(&self) -> Result<DeploySummary> {
        let start = Instant::now();
        console::step("Starting blue-green deployment");

        let previous = self.platform.current_deployment().await?;
        info!(current_deployment = ?previous.id, "Current production deployment");

        let preview = self.create_preview_deployment().await?;

        if !self
            .wait_for_health_check(&preview.url, self.settings.health_retries)
            .await
        {
            return Err(AppError::DeploymentFailed(
                "Preview deployment never became healthy".to_string(),
            ));
        }
        if !self
            .wait_for_readiness_check(&preview.url, self.settings.readiness_retries)
            .await
        {
            return Err(AppError::DeploymentFailed(
                "Preview deployment never became ready".to_string(),
            ));
        }

        self.promote_preview_to_production(&preview).await?;

        console::step(&format!(
            "Waiting {}s for the promotion to propagate",
            self.settings.propagation_delay.as_secs()
        ));
        self.clock.sleep(self.settings.propagation_delay).await;

        if !self
            .wait_for_health_check(
                &self.settings.production_url,
                self.settings.final_health_retries,
            )
            .await
        {
            console::failure("Production health check failed after promotion, rolling back");
            let message = match self
                .coordinator
                .rollback("Production health check failed after blue-green promotion")
                .await
            {
                Ok(true) => "Production health check failed; rollback succeeded".to_string(),
                Ok(false) => {
                    "Production health check failed; rollback was already in progress".to_string()
                }
                Err(e) => format!("Production health check failed; rollback failed: {}", e),
            };
            return Err(AppError::DeploymentFailed(message));
        }

        let summary = DeploySummary {
            previous,
            preview,
            production_url: self.settings.production_url.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        console::success("Blue-green deployment completed");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::deployment::alerts::RecordingNotifier;
    use crate::deployment::http_probe::ScriptedHttpProbe;
    use crate::deployment::platform::FakePlatform;
    use crate::deployment::rollback::RollbackSettings;
    use serde_json::json;

    const PREVIEW: &str = "https://preview.example.app";
    const PRODUCTION: &str = "https://app.example.com";

    struct Fixture {
        deployer: BlueGreenDeployer,
        platform: Arc<FakePlatform>,
        http: Arc<ScriptedHttpProbe>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let platform = Arc::new(FakePlatform::with_previous("d3", "d2"));
        let http = Arc::new(ScriptedHttpProbe::new());
        let clock = Arc::new(ManualClock::new());
        let coordinator = Arc::new(RollbackCoordinator::new(
            platform.clone(),
            http.clone(),
            Arc::new(RecordingNotifier::new()),
            clock.clone(),
            RollbackSettings {
                health_url: format!("{}/api/health", PRODUCTION),
                readiness_url: format!("{}/api/ready", PRODUCTION),
                command_timeout: Duration::from_secs(300),
                verify_interval: Duration::from_secs(10),
                verify_window: Duration::from_secs(30),
            },
            "production",
        ));
        let deployer = BlueGreenDeployer::new(
            platform.clone(),
            http.clone(),
            coordinator,
            clock.clone(),
            BlueGreenSettings::new(PRODUCTION),
        );
        Fixture {
            deployer,
            platform,
            http,
            clock,
        }
    }

    fn healthy() -> ProbeResponse {
        ProbeResponse::json(200, json!({"status": "healthy"}))
    }

    fn ready() -> ProbeResponse {
        ProbeResponse::json(200, json!({"status": "ready"}))
    }

    #[tokio::test]
    async fn test_successful_deploy_promotes_preview() {
        let fx = fixture();
        fx.http.push_times(&format!("{}/api/health", PREVIEW), ProbeResponse::status(503), 2);
        fx.http.set_fallback(&format!("{}/api/health", PREVIEW), healthy());
        fx.http.set_fallback(&format!("{}/api/ready", PREVIEW), ready());
        fx.http.set_fallback(&format!("{}/api/health", PRODUCTION), healthy());

        let summary = fx.deployer.deploy().await.unwrap();

        assert_eq!(summary.preview.url, PREVIEW);
        assert_eq!(summary.previous.id.as_deref(), Some("d3"));
        assert_eq!(fx.platform.promotions(), 1);
        assert!(fx.platform.rollbacks().is_empty());
        // Two 3s retries plus the 10s propagation delay.
        assert_eq!(fx.clock.total_slept(), Duration::from_secs(16));
    }

    #[tokio::test]
    async fn test_unhealthy_preview_aborts_before_promotion() {
        let fx = fixture();
        fx.http.set_fallback(
            &format!("{}/api/health", PREVIEW),
            ProbeResponse::json(200, json!({"status": "degraded"})),
        );

        let err = fx.deployer.deploy().await.unwrap_err();

        assert!(matches!(err, AppError::DeploymentFailed(_)));
        assert_eq!(fx.http.requests_to(&format!("{}/api/health", PREVIEW)), 10);
        assert_eq!(fx.platform.promotions(), 0);
        assert!(fx.platform.rollbacks().is_empty());
    }

    #[tokio::test]
    async fn test_not_ready_preview_aborts_before_promotion() {
        let fx = fixture();
        fx.http.set_fallback(&format!("{}/api/health", PREVIEW), healthy());
        fx.http.set_fallback(
            &format!("{}/api/ready", PREVIEW),
            ProbeResponse::json(503, json!({"status": "not_ready"})),
        );

        assert!(fx.deployer.deploy().await.is_err());
        assert_eq!(fx.http.requests_to(&format!("{}/api/ready", PREVIEW)), 5);
        assert_eq!(fx.platform.promotions(), 0);
    }

    #[tokio::test]
    async fn test_missing_preview_url_aborts() {
        let mut platform = FakePlatform::with_previous("d3", "d2");
        platform.preview_url = None;
        let platform = Arc::new(platform);
        let http = Arc::new(ScriptedHttpProbe::new());
        let clock = Arc::new(ManualClock::new());
        let coordinator = Arc::new(RollbackCoordinator::new(
            platform.clone(),
            http.clone(),
            Arc::new(RecordingNotifier::new()),
            clock.clone(),
            RollbackSettings::from_monitor(&Default::default()),
            "production",
        ));
        let deployer = BlueGreenDeployer::new(
            platform.clone(),
            http,
            coordinator,
            clock,
            BlueGreenSettings::new(PRODUCTION),
        );

        let err = deployer.deploy().await.unwrap_err();
        assert!(matches!(err, AppError::DeploymentUrlNotFound));
        assert_eq!(platform.promotions(), 0);
    }

    #[tokio::test]
    async fn test_failed_production_check_rolls_back() {
        let fx = fixture();
        fx.http.set_fallback(&format!("{}/api/health", PREVIEW), healthy());
        fx.http.set_fallback(&format!("{}/api/ready", PREVIEW), ready());
        let prod_health = format!("{}/api/health", PRODUCTION);
        fx.http.push_times(&prod_health, ProbeResponse::status(503), 5);
        fx.http.set_fallback(&prod_health, healthy());
        fx.http.set_fallback(&format!("{}/api/ready", PRODUCTION), ready());

        let err = fx.deployer.deploy().await.unwrap_err();

        assert_eq!(fx.platform.promotions(), 1);
        assert_eq!(fx.platform.rollbacks(), vec!["d2".to_string()]);
        assert!(err.to_string().contains("rollback succeeded"));
    }
}
