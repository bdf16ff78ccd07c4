//! Operator alerts for rollback and monitoring events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub environment: String,
    pub fields: Vec<(String, String)>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: AlertSeverity,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            environment: environment.into(),
            fields: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((name.into(), value.to_string()));
        self
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<()>;
}

/// Posts alerts to a Slack incoming webhook.
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    fn payload(alert: &Alert) -> serde_json::Value {
        let color = match alert.severity {
            AlertSeverity::Info => "good",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "danger",
        };

        let mut fields = vec![serde_json::json!({
            "title": "Environment",
            "value": alert.environment,
            "short": true
        })];
        fields.extend(alert.fields.iter().map(|(name, value)| {
            serde_json::json!({ "title": name, "value": value, "short": true })
        }));

        serde_json::json!({
            "username": "Deploy Sentinel",
            "attachments": [{
                "color": color,
                "title": alert.title,
                "text": alert.message,
                "fields": fields,
                "footer": "Auto-rollback",
                "ts": alert.timestamp.timestamp()
            }]
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&Self::payload(alert))
            .send()
            .await
            .map_err(|e| {
                AppError::NotificationError(format!("Failed to send Slack alert: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::NotificationError(format!(
                "Slack webhook returned status: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, alert: &Alert) -> Result<()> {
        let fields = alert
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        let environment = alert.environment.as_str();
        let text = format!("{}: {}", alert.title, alert.message);
        match alert.severity {
            AlertSeverity::Info => info!(environment, fields = %fields, "[ALERT] {}", text),
            AlertSeverity::Warning => warn!(environment, fields = %fields, "[ALERT] {}", text),
            AlertSeverity::Critical => error!(environment, fields = %fields, "[ALERT] {}", text),
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.alerts().into_iter().map(|a| a.title).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, alert: &Alert) -> Result<()> {
        self.alerts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(alert.clone());
        Ok(())
    }
}

/// Sends an alert; delivery failures are logged and never propagate.
pub async fn dispatch(notifier: &dyn Notifier, alert: Alert) {
    if let Err(e) = notifier.send(&alert).await {
        warn!(title = %alert.title, error = %e, "Failed to deliver alert");
    }
}
