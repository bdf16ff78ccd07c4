//! HTTP access to a deployment's probe endpoints and pages.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status_code: u16,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    /// Parsed body when it was JSON.
    pub body: Option<Value>,
    pub elapsed: Duration,
}

impl ProbeResponse {
    pub fn json(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            headers: HashMap::new(),
            body: Some(body),
            elapsed: Duration::ZERO,
        }
    }

    pub fn status(status_code: u16) -> Self {
        Self {
            status_code,
            headers: HashMap::new(),
            body: None,
            elapsed: Duration::ZERO,
        }
    }

    /// The `status` field of a JSON body.
    pub fn body_status(&self) -> Option<&str> {
        self.body.as_ref()?.get("status")?.as_str()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// A 200 whose payload reports exactly `healthy`; `degraded` does not count.
pub fn is_healthy_response(response: &ProbeResponse) -> bool {
    response.status_code == 200 && response.body_status() == Some("healthy")
}

pub fn is_ready_response(response: &ProbeResponse) -> bool {
    response.status_code == 200 && response.body_status() == Some("ready")
}

pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Issues a GET. Transport failures and timeouts are errors; any HTTP
    /// status, including 5xx, is a response.
    async fn get(&self, url: &str) -> Result<ProbeResponse>;
}

pub struct ReqwestHttpProbe {
    client: reqwest::Client,
}

impl ReqwestHttpProbe {
    /// Redirects are not followed so callers can see 302s.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("deploy-sentinel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                AppError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbe for ReqwestHttpProbe {
    async fn get(&self, url: &str) -> Result<ProbeResponse> {
        let start = Instant::now();
        let response = self.client.get(url).send().await?;

        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes).ok();

        Ok(ProbeResponse {
            status_code,
            headers,
            body,
            elapsed: start.elapsed(),
        })
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Response(ProbeResponse),
    NetworkError(String),
}

impl From<ProbeResponse> for ScriptedReply {
    fn from(response: ProbeResponse) -> Self {
        ScriptedReply::Response(response)
    }
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<ScriptedReply>>,
    fallback: HashMap<String, ScriptedReply>,
    requests: Vec<String>,
}

/// Replays queued replies per URL, then the URL's fallback.
/// Unscripted URLs fail with a network error.
#[derive(Default)]
pub struct ScriptedHttpProbe {
    script: Mutex<Script>,
}

impl ScriptedHttpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, reply: impl Into<ScriptedReply>) {
        self.lock()
            .queued
            .entry(url.to_string())
            .or_default()
            .push_back(reply.into());
    }

    pub fn push_times(&self, url: &str, reply: impl Into<ScriptedReply>, times: usize) {
        let reply = reply.into();
        for _ in 0..times {
            self.push(url, reply.clone());
        }
    }

    pub fn set_fallback(&self, url: &str, reply: impl Into<ScriptedReply>) {
        self.lock().fallback.insert(url.to_string(), reply.into());
    }

    pub fn requests_to(&self, url: &str) -> usize {
        self.lock().requests.iter().filter(|r| *r == url).count()
    }

    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl HttpProbe for ScriptedHttpProbe {
    async fn get(&self, url: &str) -> Result<ProbeResponse> {
        let reply = {
            let mut script = self.lock();
            script.requests.push(url.to_string());
            script
                .queued
                .get_mut(url)
                .and_then(VecDeque::pop_front)
                .or_else(|| script.fallback.get(url).cloned())
        };

        match reply {
            Some(ScriptedReply::Response(response)) => Ok(response),
            Some(ScriptedReply::NetworkError(message)) => Err(AppError::NetworkError(message)),
            None => Err(AppError::NetworkError(format!("connection refused: {}", url))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_exact_healthy_passes() {
        assert!(is_healthy_response(&ProbeResponse::json(200, json!({"status": "healthy"}))));
        assert!(!is_healthy_response(&ProbeResponse::json(200, json!({"status": "degraded"}))));
        assert!(!is_healthy_response(&ProbeResponse::json(503, json!({"status": "healthy"}))));
        assert!(!is_healthy_response(&ProbeResponse::status(200)));
        assert!(is_ready_response(&ProbeResponse::json(200, json!({"status": "ready"}))));
        assert!(!is_ready_response(&ProbeResponse::json(503, json!({"status": "not_ready"}))));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        assert_eq!(
            endpoint("https://app.example.com/", "/api/health"),
            "https://app.example.com/api/health"
        );
        assert_eq!(
            endpoint("https://app.example.com", "/api/ready"),
            "https://app.example.com/api/ready"
        );
    }

    #[tokio::test]
    async fn test_scripted_probe_replays_queue_then_fallback() {
        let probe = ScriptedHttpProbe::new();
        let url = "http://svc/api/health";
        probe.push(url, ProbeResponse::status(503));
        probe.push(url, ScriptedReply::NetworkError("reset".to_string()));
        probe.set_fallback(url, ProbeResponse::json(200, json!({"status": "healthy"})));

        assert_eq!(probe.get(url).await.unwrap().status_code, 503);
        assert!(probe.get(url).await.is_err());
        assert!(is_healthy_response(&probe.get(url).await.unwrap()));
        assert!(probe.get("http://other").await.is_err());
        assert_eq!(probe.requests_to(url), 3);
    }

    #[tokio::test]
    async fn test_reqwest_probe_reads_status_headers_and_json() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(
                ResponseTemplate::new(503)
                    .insert_header("X-Frame-Options", "DENY")
                    .set_body_json(json!({"status": "unhealthy"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dashboard"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/sign-in"))
            .mount(&server)
            .await;

        let probe = ReqwestHttpProbe::new(Duration::from_secs(5)).unwrap();
        let health = probe.get(&endpoint(&server.uri(), "/api/health")).await.unwrap();
        assert_eq!(health.status_code, 503);
        assert_eq!(health.body_status(), Some("unhealthy"));
        assert_eq!(health.header("x-frame-options"), Some("DENY"));

        let dashboard = probe.get(&endpoint(&server.uri(), "/dashboard")).await.unwrap();
        assert_eq!(dashboard.status_code, 302);
        assert!(dashboard.body.is_none());
    }
}
