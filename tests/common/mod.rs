//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use axum::{body::Body, http::Request, Router};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use deploy_sentinel::{
    config::{AppInfo, DatabaseConfig, ReadinessConfig},
    core::{
        clock::ManualClock,
        error_reporting::RecordingReporter,
        observability::{HealthProbe, ReadinessProbe, ReadinessStore, StaticMemorySampler},
    },
    create_app,
    infrastructure::database::{ConnectionPoolManager, DatabaseHandle, FakeDatabase},
    AppState,
};

/// Builder for a probe server wired to in-memory collaborators.
pub struct TestApp {
    pub database: Option<FakeDatabase>,
    pub memory_ratio: f64,
    pub monitoring_active: bool,
    pub readiness_store: Option<Arc<dyn ReadinessStore>>,
    pub env: HashMap<String, String>,
    pub handler_timeout: Duration,
}

impl Default for TestApp {
    fn default() -> Self {
        Self {
            database: Some(FakeDatabase::healthy()),
            memory_ratio: 0.4,
            monitoring_active: true,
            readiness_store: None,
            env: HashMap::from([
                ("DATABASE_URL".to_string(), "postgres://db/app".to_string()),
                ("APP_ENV".to_string(), "test".to_string()),
            ]),
            handler_timeout: Duration::from_secs(5),
        }
    }
}

pub struct RunningApp {
    pub router: Router,
    pub reporter: Arc<RecordingReporter>,
    _dir: TempDir,
}

impl TestApp {
    pub fn build(self) -> RunningApp {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Arc::new(RecordingReporter::new(self.monitoring_active));
        let app = AppInfo {
            environment: "test".to_string(),
            fs_probe_dir: dir.path().to_path_buf(),
            handler_timeout: self.handler_timeout,
            ..AppInfo::default()
        };

        let pool = ConnectionPoolManager::with_handle(
            DatabaseConfig::default(),
            self.database.map(|db| Arc::new(db) as Arc<dyn DatabaseHandle>),
            reporter.clone(),
            Arc::new(ManualClock::new()),
        );

        let state = AppState {
            health: Arc::new(HealthProbe::new(
                &app,
                pool,
                Arc::new(StaticMemorySampler::with_ratio(self.memory_ratio)),
                reporter.clone(),
            )),
            readiness: Arc::new(ReadinessProbe::new(
                &app,
                ReadinessConfig::default(),
                self.readiness_store,
                Arc::new(self.env),
                reporter.clone(),
            )),
            handler_timeout: self.handler_timeout,
        };

        RunningApp {
            router: create_app(state),
            reporter,
            _dir: dir,
        }
    }
}

pub struct JsonResponse {
    pub status: u16,
    pub cache_control: Option<String>,
    pub body: Value,
}

impl RunningApp {
    pub async fn get(&self, path: &str) -> JsonResponse {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status().as_u16();
        let cache_control = response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        JsonResponse {
            status,
            cache_control,
            body,
        }
    }
}
