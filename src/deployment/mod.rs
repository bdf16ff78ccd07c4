//! Deployment safety orchestration
//!
//! Everything the deployment CLIs need: HTTP access to a deployment's
//! probes, the platform adapter, operator alerts, guarded rollback, the
//! post-deploy monitor, blue-green promotion and the verification battery.

pub mod alerts;
pub mod blue_green;
pub mod http_probe;
pub mod monitor;
pub mod platform;
pub mod rollback;
pub mod verifier;

pub use alerts::{Alert, AlertSeverity, LogNotifier, Notifier, RecordingNotifier, SlackNotifier};
pub use blue_green::{BlueGreenDeployer, BlueGreenSettings, DeploySummary};
pub use http_probe::{HttpProbe, ProbeResponse, ReqwestHttpProbe, ScriptedHttpProbe};
pub use monitor::{AutoRollbackMonitor, MonitorOutcome, MonitorPhase, RollbackMonitorState};
pub use platform::{CliPlatform, DeploymentPlatform, DeploymentRecord, TokioCommandRunner};
pub use rollback::{RollbackCoordinator, RollbackSettings};
pub use verifier::{DeploymentVerifier, VerificationReport};

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;

/// Slack when a webhook is configured, log lines otherwise.
pub fn notifier_from_config(config: &Config) -> Result<Arc<dyn Notifier>> {
    Ok(match config.alerts.slack_webhook_url.as_deref() {
        Some(url) => Arc::new(SlackNotifier::new(url)?),
        None => Arc::new(LogNotifier),
    })
}
