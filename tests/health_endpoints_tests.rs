mod common;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use common::TestApp;
use deploy_sentinel::{
    core::observability::{ReadinessStore, StaticReadinessStore},
    infrastructure::database::FakeDatabase,
    Result,
};

#[tokio::test]
async fn test_health_reports_healthy_with_all_checks() {
    let app = TestApp::default().build();

    let response = app.get("/api/health").await;

    assert_eq!(response.status, 200);
    assert_eq!(response.cache_control.as_deref(), Some("no-store"));
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["environment"], "test");
    for check in ["database", "memory", "sentry", "filesystem"] {
        assert_eq!(response.body["checks"][check]["status"], "healthy", "{}", check);
    }
    assert_eq!(response.body["checks"]["database"]["connections"]["total"], 4);
    assert_eq!(response.body["checks"]["filesystem"]["writable"], true);
    assert!(response.body["uptime"].is_u64());
    assert!(response.body["responseTime"].is_u64());
}

#[tokio::test]
async fn test_database_outage_degrades_but_stays_200() {
    let app = TestApp {
        database: Some(FakeDatabase::failing("connection refused")),
        ..TestApp::default()
    }
    .build();

    let response = app.get("/api/health").await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body["status"], "degraded");
    assert_eq!(response.body["checks"]["database"]["status"], "unhealthy");
    assert!(response.body["checks"]["database"]["error"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn test_missing_pool_and_high_memory_degrade() {
    let app = TestApp {
        database: None,
        memory_ratio: 0.97,
        monitoring_active: false,
        ..TestApp::default()
    }
    .build();

    let response = app.get("/api/health").await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body["status"], "degraded");
    assert_eq!(response.body["checks"]["database"]["status"], "unhealthy");
    assert_eq!(response.body["checks"]["memory"]["status"], "unhealthy");
    assert_eq!(response.body["checks"]["sentry"]["status"], "degraded");
    assert_eq!(response.body["checks"]["sentry"]["dsnConfigured"], false);
}

#[tokio::test]
async fn test_health_timeout_answers_503() {
    let app = TestApp {
        database: Some(FakeDatabase::healthy().with_latency(Duration::from_secs(5))),
        handler_timeout: Duration::from_millis(100),
        ..TestApp::default()
    }
    .build();

    let response = app.get("/api/health").await;

    assert_eq!(response.status, 503);
    assert_eq!(response.cache_control.as_deref(), Some("no-store"));
    assert_eq!(response.body["status"], "unhealthy");
    assert!(response.body.get("checks").is_none());
    assert!(response.body["error"].as_str().unwrap().contains("100ms"));
}

#[tokio::test]
async fn test_ready_when_everything_is_in_place() {
    let app = TestApp {
        readiness_store: Some(Arc::new(StaticReadinessStore::ready())),
        ..TestApp::default()
    }
    .build();

    let response = app.get("/api/ready").await;

    assert_eq!(response.status, 200);
    assert_eq!(response.cache_control.as_deref(), Some("no-store"));
    assert_eq!(response.body["status"], "ready");
    for check in [
        "database_connection",
        "database_migrations",
        "essential_data",
        "environment_variables",
        "sentry_integration",
    ] {
        assert_eq!(response.body["checks"][check]["status"], "ready", "{}", check);
    }
}

#[tokio::test]
async fn test_not_ready_lists_missing_tables_and_env() {
    let mut env = TestApp::default().env;
    env.remove("APP_ENV");
    let app = TestApp {
        readiness_store: Some(Arc::new(StaticReadinessStore {
            missing_tables: vec!["user_progress".to_string()],
            ..StaticReadinessStore::ready()
        })),
        env,
        ..TestApp::default()
    }
    .build();

    let response = app.get("/api/ready").await;

    assert_eq!(response.status, 503);
    assert_eq!(response.body["status"], "not_ready");
    let checks = &response.body["checks"];
    assert_eq!(checks["database_connection"]["status"], "ready");
    assert_eq!(checks["database_migrations"]["missing"][0], "user_progress");
    assert_eq!(
        checks["environment_variables"]["missing"][0],
        "APP_ENV|RAILWAY_ENVIRONMENT"
    );
}

#[tokio::test]
async fn test_not_ready_without_database_url() {
    let app = TestApp::default().build();

    let response = app.get("/api/ready").await;

    assert_eq!(response.status, 503);
    assert_eq!(response.body["checks"]["database_connection"]["status"], "not_ready");
    assert_eq!(response.body["checks"]["environment_variables"]["status"], "ready");
}

struct StalledStore;

#[async_trait]
impl ReadinessStore for StalledStore {
    async fn check_connection(&self) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }

    async fn missing_tables(&self, _expected: &[String]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn has_rows(&self, _table: &str) -> Result<bool> {
        Ok(true)
    }
}

#[tokio::test]
async fn test_readiness_timeout_fails_every_check() {
    let app = TestApp {
        readiness_store: Some(Arc::new(StalledStore)),
        handler_timeout: Duration::from_millis(100),
        ..TestApp::default()
    }
    .build();

    let response = app.get("/api/ready").await;

    assert_eq!(response.status, 503);
    assert_eq!(response.body["status"], "not_ready");
    let checks = response.body["checks"].as_object().unwrap();
    assert_eq!(checks.len(), 5);
    assert!(checks.values().all(|c| c["status"] == "not_ready"));
    assert_eq!(app.reporter.captured_errors(), 1);
}

#[tokio::test]
async fn test_unknown_route_is_404_with_error_body() {
    let app = TestApp::default().build();

    let response = app.get("/api/nope").await;

    assert_eq!(response.status, 404);
    assert_eq!(response.body["status"], 404);
    assert_eq!(response.body["error"], "Not found: /api/nope");
    assert!(response.body["timestamp"].is_string());
}
