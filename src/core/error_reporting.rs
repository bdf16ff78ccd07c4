//! Error-monitoring collaborator.
//!
//! Probes and the pool manager report breadcrumbs, warning events and
//! captured errors through [`Reporter`]. The production implementation turns
//! them into structured `tracing` events tagged with the environment; the
//! monitoring client counts as active once a DSN is configured.

use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
}

pub trait Reporter: Send + Sync {
    fn add_breadcrumb(&self, category: &str, message: &str, level: EventLevel, data: Value);
    fn capture_message(&self, message: &str, level: EventLevel);
    fn capture_error(&self, error: &AppError, context: &str);
    /// Whether a monitoring client is running in this process.
    fn is_active(&self) -> bool;
    fn dsn_configured(&self) -> bool;
}

pub struct TracingReporter {
    dsn: Option<String>,
    environment: String,
}

impl TracingReporter {
    pub fn new(dsn: Option<String>, environment: impl Into<String>) -> Self {
        let environment = environment.into();
        if dsn.is_none() {
            info!(environment = %environment, "Error monitoring DSN not configured");
        }
        Self { dsn, environment }
    }
}

impl Reporter for TracingReporter {
    fn add_breadcrumb(&self, category: &str, message: &str, level: EventLevel, data: Value) {
        match level {
            EventLevel::Debug | EventLevel::Info => debug!(
                environment = %self.environment,
                category,
                data = %data,
                "{}", message
            ),
            EventLevel::Warning => warn!(
                environment = %self.environment,
                category,
                data = %data,
                "{}", message
            ),
            EventLevel::Error => error!(
                environment = %self.environment,
                category,
                data = %data,
                "{}", message
            ),
        }
    }

    fn capture_message(&self, message: &str, level: EventLevel) {
        match level {
            EventLevel::Debug | EventLevel::Info => {
                info!(environment = %self.environment, captured = true, "{}", message)
            }
            EventLevel::Warning => {
                warn!(environment = %self.environment, captured = true, "{}", message)
            }
            EventLevel::Error => {
                error!(environment = %self.environment, captured = true, "{}", message)
            }
        }
    }

    fn capture_error(&self, error: &AppError, context: &str) {
        error!(
            environment = %self.environment,
            captured = true,
            context,
            error = %error,
            "Captured exception"
        );
    }

    fn is_active(&self) -> bool {
        self.dsn.is_some()
    }

    fn dsn_configured(&self) -> bool {
        self.dsn.as_deref().map_or(false, |dsn| !dsn.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportedEvent {
    Breadcrumb {
        category: String,
        message: String,
        level: EventLevel,
    },
    Message {
        message: String,
        level: EventLevel,
    },
    Error {
        error: String,
        context: String,
    },
}

/// In-memory reporter used by tests.
pub struct RecordingReporter {
    active: bool,
    events: Mutex<Vec<ReportedEvent>>,
}

impl RecordingReporter {
    pub fn new(active: bool) -> Self {
        Self {
            active,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<ReportedEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn captured_errors(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ReportedEvent::Error { .. }))
            .count()
    }

    pub fn breadcrumbs_at(&self, wanted: EventLevel) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ReportedEvent::Breadcrumb { level, .. } if *level == wanted))
            .count()
    }

    fn push(&self, event: ReportedEvent) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}

impl Reporter for RecordingReporter {
    fn add_breadcrumb(&self, category: &str, message: &str, level: EventLevel, _data: Value) {
        self.push(ReportedEvent::Breadcrumb {
            category: category.to_string(),
            message: message.to_string(),
            level,
        });
    }

    fn capture_message(&self, message: &str, level: EventLevel) {
        self.push(ReportedEvent::Message {
            message: message.to_string(),
            level,
        });
    }

    fn capture_error(&self, error: &AppError, context: &str) {
        self.push(ReportedEvent::Error {
            error: error.to_string(),
            context: context.to_string(),
        });
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn dsn_configured(&self) -> bool {
        self.active
    }
}
