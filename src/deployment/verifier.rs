//! Post-deploy verification battery.
//!
//! Every check runs regardless of earlier failures and records its own
//! pass/fail and duration. The harness is a report, not a gate: callers
//! decide what to do with `success`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::http_probe::{endpoint, HttpProbe, ProbeResponse};
use crate::error::Result;

const SLOW_RESPONSE: Duration = Duration::from_millis(5000);
const MAX_DATABASE_LATENCY_MS: u64 = 5000;

struct PageCheck {
    name: &'static str,
    path: &'static str,
    accepted: &'static [u16],
}

const PAGES: &[PageCheck] = &[
    PageCheck {
        name: "Home page",
        path: "/",
        accepted: &[200],
    },
    PageCheck {
        name: "Handbook page",
        path: "/handbook",
        accepted: &[200],
    },
    PageCheck {
        name: "Dashboard page",
        path: "/dashboard",
        accepted: &[200, 302, 307, 401],
    },
    PageCheck {
        name: "Search API",
        path: "/api/search?q=airspace",
        accepted: &[200],
    },
];

const AUTH_PATH: &str = "/sign-in";
const TIMED_PATHS: &[&str] = &["/", "/api/health", "/api/ready"];
const SECURITY_HEADERS: &[&str] = &[
    "x-frame-options",
    "x-content-type-options",
    "referrer-policy",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub timestamp: DateTime<Utc>,
    pub base_url: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Percentage, one decimal.
    pub success_rate: f64,
    pub success: bool,
    pub duration_ms: u64,
    pub results: Vec<CheckResult>,
    pub failures: Vec<Failure>,
}

impl VerificationReport {
    fn from_results(base_url: &str, results: Vec<CheckResult>, duration: Duration) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = total - passed;
        let success_rate = if total == 0 {
            0.0
        } else {
            (passed as f64 / total as f64 * 1000.0).round() / 10.0
        };
        let failures = results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| Failure {
                name: r.name.clone(),
                error: r.error.clone().unwrap_or_default(),
            })
            .collect();

        Self {
            timestamp: Utc::now(),
            base_url: base_url.to_string(),
            total,
            passed,
            failed,
            success_rate,
            success: failed == 0,
            duration_ms: duration.as_millis() as u64,
            results,
            failures,
        }
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

type CheckOutcome = std::result::Result<(), String>;

pub struct DeploymentVerifier {
    http: Arc<dyn HttpProbe>,
    base_url: String,
}

impl DeploymentVerifier {
    pub fn new(http: Arc<dyn HttpProbe>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub async fn run(&self) -> VerificationReport {
        let start = Instant::now();
        info!(base_url = %self.base_url, "Starting deployment verification");

        let mut results = Vec::new();
        results.push(self.record("Health endpoint", self.check_health()).await);
        results.push(self.record("Readiness endpoint", self.check_readiness()).await);
        results.push(self.record("Database latency", self.check_database_latency()).await);
        for page in PAGES {
            results.push(self.record(page.name, self.check_page(page.path, page.accepted)).await);
        }
        results.push(
            self.record(
                "Authentication endpoint",
                self.check_page(AUTH_PATH, &[200, 302, 307]),
            )
            .await,
        );
        results.push(self.record("Response times", self.check_response_times()).await);
        results.push(self.record("Environment configuration", self.check_environment()).await);
        results.push(self.record("Security headers", self.check_security_headers()).await);

        let report = VerificationReport::from_results(&self.base_url, results, start.elapsed());
        info!(
            total = report.total,
            passed = report.passed,
            failed = report.failed,
            success_rate = report.success_rate,
            "Deployment verification finished"
        );
        report
    }

    async fn record<F>(&self, name: &str, check: F) -> CheckResult
    where
        F: std::future::Future<Output = CheckOutcome>,
    {
        let start = Instant::now();
        let outcome = check.await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => CheckResult {
                name: name.to_string(),
                passed: true,
                duration_ms,
                error: None,
            },
            Err(error) => {
                warn!(check = name, error = %error, "Verification check failed");
                CheckResult {
                    name: name.to_string(),
                    passed: false,
                    duration_ms,
                    error: Some(error),
                }
            }
        }
    }

    async fn fetch(&self, path: &str) -> std::result::Result<ProbeResponse, String> {
        self.http
            .get(&endpoint(&self.base_url, path))
            .await
            .map_err(|e| e.to_string())
    }

    async fn fetch_json(&self, path: &str) -> std::result::Result<Value, String> {
        let response = self.fetch(path).await?;
        response.body.ok_or_else(|| {
            format!(
                "{} returned a non-JSON body (HTTP {})",
                path, response.status_code
            )
        })
    }

    async fn check_health(&self) -> CheckOutcome {
        let response = self.fetch("/api/health").await?;
        if response.status_code != 200 {
            return Err(format!("HTTP {}", response.status_code));
        }
        if response.body_status() != Some("healthy") {
            return Err(format!("status is {:?}", response.body_status()));
        }

        let unhealthy: Vec<String> = response
            .body
            .as_ref()
            .and_then(|b| b.get("checks"))
            .and_then(Value::as_object)
            .map(|checks| {
                checks
                    .iter()
                    .filter(|(_, check)| {
                        check.get("status").and_then(Value::as_str) != Some("healthy")
                    })
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();

        if unhealthy.is_empty() {
            Ok(())
        } else {
            Err(format!("checks not healthy: {}", unhealthy.join(", ")))
        }
    }

    async fn check_readiness(&self) -> CheckOutcome {
        let response = self.fetch("/api/ready").await?;
        match (response.status_code, response.body_status()) {
            (200, Some("ready")) => Ok(()),
            (code, status) => Err(format!("HTTP {} with status {:?}", code, status)),
        }
    }

    // A payload without a latency figure passes; only a measured value is judged.
    async fn check_database_latency(&self) -> CheckOutcome {
        let body = self.fetch_json("/api/health").await?;
        match body.pointer("/checks/database/latency").and_then(Value::as_u64) {
            Some(latency) if latency > MAX_DATABASE_LATENCY_MS => Err(format!(
                "database latency {}ms exceeds {}ms",
                latency, MAX_DATABASE_LATENCY_MS
            )),
            _ => Ok(()),
        }
    }

    async fn check_page(&self, path: &str, accepted: &[u16]) -> CheckOutcome {
        let response = self.fetch(path).await?;
        if accepted.contains(&response.status_code) {
            Ok(())
        } else {
            Err(format!("{} returned HTTP {}", path, response.status_code))
        }
    }

    async fn check_response_times(&self) -> CheckOutcome {
        let mut slow = Vec::new();
        for path in TIMED_PATHS {
            let response = self.fetch(path).await?;
            if response.elapsed > SLOW_RESPONSE {
                slow.push(format!("{} took {}ms", path, response.elapsed.as_millis()));
            }
        }
        if slow.is_empty() {
            Ok(())
        } else {
            Err(slow.join("; "))
        }
    }

    async fn check_environment(&self) -> CheckOutcome {
        let body = self.fetch_json("/api/ready").await?;
        match body
            .pointer("/checks/environment_variables/status")
            .and_then(Value::as_str)
        {
            Some("ready") => Ok(()),
            Some(other) => {
                let missing = body
                    .pointer("/checks/environment_variables/missing")
                    .and_then(Value::as_array)
                    .map(|names| {
                        names
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                Err(format!("environment_variables is {} (missing: {})", other, missing))
            }
            None => Err("readiness payload has no environment_variables check".to_string()),
        }
    }

    async fn check_security_headers(&self) -> CheckOutcome {
        let response = self.fetch("/").await?;
        let missing: Vec<&str> = SECURITY_HEADERS
            .iter()
            .copied()
            .filter(|name| response.header(name).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing headers: {}", missing.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::http_probe::{ScriptedHttpProbe, ScriptedReply};
    use serde_json::json;

    const BASE: &str = "https://app.example.com";

    fn url(path: &str) -> String {
        endpoint(BASE, path)
    }

    fn serve_everything(http: &ScriptedHttpProbe, health: Value) {
        http.set_fallback(&url("/api/health"), ProbeResponse::json(200, health));
        http.set_fallback(
            &url("/api/ready"),
            ProbeResponse::json(
                200,
                json!({
                    "status": "ready",
                    "checks": {"environment_variables": {"status": "ready"}}
                }),
            ),
        );
        let mut home = ProbeResponse::status(200);
        for header in SECURITY_HEADERS {
            home.headers.insert(header.to_string(), "set".to_string());
        }
        http.set_fallback(&url("/"), home);
        for path in ["/handbook", "/api/search?q=airspace"] {
            http.set_fallback(&url(path), ProbeResponse::status(200));
        }
        http.set_fallback(&url("/dashboard"), ProbeResponse::status(401));
        http.set_fallback(&url("/sign-in"), ProbeResponse::status(200));
    }

    #[tokio::test]
    async fn test_unreachable_host_runs_full_battery() {
        let http = Arc::new(ScriptedHttpProbe::new());
        let report = DeploymentVerifier::new(http, BASE).run().await;

        assert_eq!(report.total, 11);
        assert_eq!(report.failed, 11);
        assert!(!report.success);
        assert_eq!(report.failures.len(), 11);
        assert!(report.failures[0].error.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_dashboard_accepts_auth_redirect() {
        let http = Arc::new(ScriptedHttpProbe::new());
        serve_everything(&http, json!({"status": "healthy", "checks": {}}));
        http.push(&url("/dashboard"), ProbeResponse::status(302));

        let report = DeploymentVerifier::new(http, BASE).run().await;
        assert!(report.success, "failures: {:?}", report.failures);
        assert_eq!(report.success_rate, 100.0);
    }

    #[tokio::test]
    async fn test_missing_env_and_headers_are_reported() {
        let http = Arc::new(ScriptedHttpProbe::new());
        serve_everything(&http, json!({"status": "healthy", "checks": {}}));
        http.set_fallback(
            &url("/api/ready"),
            ProbeResponse::json(
                503,
                json!({
                    "status": "not_ready",
                    "checks": {
                        "environment_variables": {"status": "not_ready", "missing": ["APP_ENV"]}
                    }
                }),
            ),
        );
        http.set_fallback(&url("/"), ScriptedReply::from(ProbeResponse::status(200)));

        let report = DeploymentVerifier::new(http, BASE).run().await;
        let failed: Vec<&str> = report.failures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            failed,
            vec!["Readiness endpoint", "Environment configuration", "Security headers"]
        );
        assert!(report.failures[1].error.contains("APP_ENV"));
    }

    #[tokio::test]
    async fn test_report_written_as_json() {
        let http = Arc::new(ScriptedHttpProbe::new());
        serve_everything(&http, json!({"status": "healthy", "checks": {}}));
        let report = DeploymentVerifier::new(http, BASE).run().await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_to(&path).await.unwrap();

        let written: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["success"], true);
        assert_eq!(written["baseUrl"], BASE);
        assert_eq!(written["results"].as_array().unwrap().len(), 11);
    }
}
