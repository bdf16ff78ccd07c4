use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use deploy_sentinel::{
    config::MonitorConfig,
    core::clock::ManualClock,
    deployment::{
        platform::FakePlatform, AutoRollbackMonitor, MonitorOutcome, ReqwestHttpProbe,
        RollbackCoordinator, RollbackSettings, SlackNotifier,
    },
};

struct Harness {
    monitor: AutoRollbackMonitor,
    platform: Arc<FakePlatform>,
    app: MockServer,
    slack: MockServer,
}

async fn harness() -> Harness {
    let app = MockServer::start().await;
    let slack = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/deploys"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&slack)
        .await;

    let config = MonitorConfig {
        health_url: format!("{}/api/health", app.uri()),
        readiness_url: format!("{}/api/ready", app.uri()),
        check_interval: Duration::from_secs(30),
        failure_threshold: 3,
        monitoring_duration: Duration::from_secs(600),
        ..MonitorConfig::default()
    };

    let platform = Arc::new(FakePlatform::with_previous("d3", "d2"));
    let http = Arc::new(ReqwestHttpProbe::new(Duration::from_secs(5)).unwrap());
    let notifier = Arc::new(SlackNotifier::new(format!("{}/hooks/deploys", slack.uri())).unwrap());
    let clock = Arc::new(ManualClock::new());

    let coordinator = Arc::new(RollbackCoordinator::new(
        platform.clone(),
        http.clone(),
        notifier.clone(),
        clock.clone(),
        RollbackSettings::from_monitor(&config),
        "production",
    ));
    let monitor =
        AutoRollbackMonitor::new(config, http, coordinator, notifier, clock, "production");

    Harness {
        monitor,
        platform,
        app,
        slack,
    }
}

async fn serve_health(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

async fn serve_ready(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/ready"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ready"})))
        .mount(server)
        .await;
}

async fn slack_titles(slack: &MockServer) -> Vec<String> {
    slack
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| serde_json::from_slice::<Value>(&request.body).ok())
        .filter_map(|payload| payload["attachments"][0]["title"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_failing_deployment_is_rolled_back_and_announced() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"status": "unhealthy"})))
        .up_to_n_times(3)
        .with_priority(1)
        .mount(&h.app)
        .await;
    serve_health(&h.app, 200, json!({"status": "healthy"})).await;
    serve_ready(&h.app).await;

    let outcome = h.monitor.start_monitoring(CancellationToken::new()).await;

    assert_eq!(outcome, MonitorOutcome::RolledBack);
    assert_eq!(h.platform.rollbacks(), vec!["d2".to_string()]);
    assert!(!h.monitor.state().rollback_in_progress);
    assert_eq!(
        slack_titles(&h.slack).await,
        vec!["Rollback started".to_string(), "Rollback succeeded".to_string()]
    );
}

#[tokio::test]
async fn test_degraded_deployment_counts_as_failing() {
    let h = harness().await;
    serve_health(&h.app, 200, json!({"status": "degraded"})).await;
    serve_ready(&h.app).await;

    let outcome = h.monitor.start_monitoring(CancellationToken::new()).await;

    // The rollback lands but the service keeps reporting degraded.
    assert_eq!(outcome, MonitorOutcome::RollbackFailed);
    assert_eq!(h.platform.rollbacks().len(), 1);
    assert_eq!(
        slack_titles(&h.slack).await.last().map(String::as_str),
        Some("Rollback failed")
    );
}

#[tokio::test]
async fn test_healthy_deployment_finishes_window_quietly() {
    let h = harness().await;
    serve_health(&h.app, 200, json!({"status": "healthy"})).await;

    let outcome = h.monitor.start_monitoring(CancellationToken::new()).await;

    assert_eq!(outcome, MonitorOutcome::WindowElapsed);
    assert!(h.platform.rollbacks().is_empty());
    assert_eq!(slack_titles(&h.slack).await, vec!["Monitoring completed".to_string()]);
}
