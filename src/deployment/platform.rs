//! Deployment platform access.
//!
//! Orchestration code talks to [`DeploymentPlatform`] and only sees
//! structured records. [`CliPlatform`] is the adapter that drives the
//! platform's command-line tool and parses its output; the free-form text
//! parsing lives here and nowhere else.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::PlatformConfig;
use crate::error::{AppError, Result};

const SUCCESS_STATUS: &str = "SUCCESS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub status: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
    #[serde(default, alias = "staticUrl")]
    pub url: Option<String>,
}

impl DeploymentRecord {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case(SUCCESS_STATUS)
    }
}

/// Most recent successful deployment other than the current one.
///
/// `records` is ordered most recent first and index 0 is the live
/// deployment, so it is never a candidate.
pub fn select_rollback_target(records: &[DeploymentRecord]) -> Option<&DeploymentRecord> {
    records.iter().skip(1).find(|record| record.is_success())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentDeployment {
    pub id: Option<String>,
    pub status: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewDeployment {
    pub id: Option<String>,
    pub url: String,
}

#[async_trait]
pub trait DeploymentPlatform: Send + Sync {
    async fn current_deployment(&self) -> Result<CurrentDeployment>;
    /// Deployment history, most recent first.
    async fn list_deployments(&self) -> Result<Vec<DeploymentRecord>>;
    async fn rollback_to(&self, deployment_id: &str, timeout: Duration) -> Result<()>;
    async fn create_preview(&self) -> Result<PreviewDeployment>;
    async fn promote_to_production(&self, preview: &PreviewDeployment) -> Result<()>;
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program args..` and returns stdout. A non-zero exit is
    /// `CommandFailed`; overrunning `timeout` kills the child and is `Timeout`.
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<String>;
}

pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> Result<String> {
        let command_line = format!("{} {}", program, args.join(" "));
        debug!(command = %command_line, "Running platform command");

        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "`{}` did not finish within {}s",
                    command_line,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::CommandFailed {
                command: command_line.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr.trim().to_string()
            };
            Err(AppError::CommandFailed {
                command: command_line,
                message,
            })
        }
    }
}

fn url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).ok())
        .as_ref()
}

fn deployment_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)deployment[ _-]?id[:= ]+([A-Za-z0-9-]+)").ok())
        .as_ref()
}

/// Dashboard hosts print build-log and project links that never serve the app.
const DASHBOARD_HOSTS: &[&str] = &[
    "railway.app",
    "www.railway.app",
    "railway.com",
    "www.railway.com",
];

fn is_dashboard_link(candidate: &str) -> bool {
    url::Url::parse(candidate)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| DASHBOARD_HOSTS.contains(&host.as_str()))
}

/// First deployment URL in free-form CLI output, skipping dashboard links.
pub fn extract_url(output: &str) -> Option<String> {
    url_pattern()?
        .find_iter(output)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')', ';']).to_string())
        .find(|candidate| !is_dashboard_link(candidate))
}

fn extract_deployment_id(output: &str) -> Option<String> {
    deployment_id_pattern()?
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn string_at(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .find_map(|p| value.pointer(p).and_then(Value::as_str))
        .map(str::to_string)
}

/// Railway-style CLI adapter.
pub struct CliPlatform {
    config: PlatformConfig,
    runner: Arc<dyn CommandRunner>,
    command_timeout: Duration,
}

impl CliPlatform {
    pub fn new(
        config: PlatformConfig,
        runner: Arc<dyn CommandRunner>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            config,
            runner,
            command_timeout,
        }
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> Result<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(&self.config.cli, &args, timeout).await
    }
}

#[async_trait]
impl DeploymentPlatform for CliPlatform {
    async fn current_deployment(&self) -> Result<CurrentDeployment> {
        let output = self.run(&["status", "--json"], self.command_timeout).await?;
        let value: Value = serde_json::from_str(&output)?;

        Ok(CurrentDeployment {
            id: string_at(&value, &["/deployment/id", "/latestDeployment/id", "/id"])
                .or_else(|| self.config.deployment_id.clone()),
            status: string_at(
                &value,
                &["/deployment/status", "/latestDeployment/status", "/status"],
            ),
            url: string_at(&value, &["/deployment/url", "/url"]).or_else(|| extract_url(&output)),
        })
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentRecord>> {
        let output = self
            .run(&["deployment", "list", "--json"], self.command_timeout)
            .await?;
        Ok(serde_json::from_str(&output)?)
    }

    async fn rollback_to(&self, deployment_id: &str, timeout: Duration) -> Result<()> {
        info!(deployment_id, "Rolling back through platform CLI");
        self.run(&["rollback", deployment_id, "--yes"], timeout).await?;
        Ok(())
    }

    async fn create_preview(&self) -> Result<PreviewDeployment> {
        let output = self
            .run(
                &["up", "--detach", "--environment", self.config.preview_environment.as_str()],
                self.command_timeout,
            )
            .await?;

        let url = extract_url(&output).ok_or(AppError::DeploymentUrlNotFound)?;
        Ok(PreviewDeployment {
            id: extract_deployment_id(&output),
            url,
        })
    }

    async fn promote_to_production(&self, preview: &PreviewDeployment) -> Result<()> {
        let mut args = vec!["redeploy", "--yes"];
        if let Some(service) = self.config.service_name.as_deref() {
            args.extend(["--service", service]);
        }
        info!(preview_url = %preview.url, "Promoting preview to production");
        self.run(&args, self.command_timeout).await?;
        Ok(())
    }
}

type ScriptedResult = std::result::Result<String, String>;

/// Canned command output keyed by argument prefix, for tests.
#[derive(Default)]
pub struct ScriptedCommandRunner {
    replies: Mutex<Vec<(String, ScriptedResult)>>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies to any invocation whose joined args start with `prefix`.
    pub fn reply(self, prefix: &str, result: ScriptedResult) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((prefix.to_string(), result));
        self
    }

    pub fn invocations(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, program: &str, args: &[String], _timeout: Duration) -> Result<String> {
        let joined = args.join(" ");
        self.invocations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(joined.clone());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .find(|(prefix, _)| joined.starts_with(prefix.as_str()))
            .map(|(_, result)| result.clone());

        match reply {
            Some(Ok(stdout)) => Ok(stdout),
            Some(Err(message)) => Err(AppError::CommandFailed {
                command: format!("{} {}", program, joined),
                message,
            }),
            None => Err(AppError::CommandFailed {
                command: format!("{} {}", program, joined),
                message: "no scripted reply".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct FakePlatformState {
    rollbacks: Vec<String>,
    previews_created: usize,
    promotions: Vec<PreviewDeployment>,
}

/// In-memory platform with fixed history, for tests.
pub struct FakePlatform {
    pub deployments: Vec<DeploymentRecord>,
    pub preview_url: Option<String>,
    pub rollback_error: Option<String>,
    pub promote_error: Option<String>,
    state: Mutex<FakePlatformState>,
}

impl FakePlatform {
    pub fn new(deployments: Vec<DeploymentRecord>) -> Self {
        Self {
            deployments,
            preview_url: Some("https://preview.example.app".to_string()),
            rollback_error: None,
            promote_error: None,
            state: Mutex::new(FakePlatformState::default()),
        }
    }

    /// Live deployment `current` followed by a successful `previous` one.
    pub fn with_previous(current: &str, previous: &str) -> Self {
        Self::new(vec![
            DeploymentRecord {
                id: current.to_string(),
                status: SUCCESS_STATUS.to_string(),
                created_at: None,
                url: None,
            },
            DeploymentRecord {
                id: previous.to_string(),
                status: SUCCESS_STATUS.to_string(),
                created_at: None,
                url: None,
            },
        ])
    }

    pub fn rollbacks(&self) -> Vec<String> {
        self.lock().rollbacks.clone()
    }

    pub fn previews_created(&self) -> usize {
        self.lock().previews_created
    }

    pub fn promotions(&self) -> usize {
        self.lock().promotions.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakePlatformState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl DeploymentPlatform for FakePlatform {
    async fn current_deployment(&self) -> Result<CurrentDeployment> {
        Ok(self
            .deployments
            .first()
            .map(|record| CurrentDeployment {
                id: Some(record.id.clone()),
                status: Some(record.status.clone()),
                url: record.url.clone(),
            })
            .unwrap_or(CurrentDeployment {
                id: None,
                status: None,
                url: None,
            }))
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentRecord>> {
        Ok(self.deployments.clone())
    }

    async fn rollback_to(&self, deployment_id: &str, _timeout: Duration) -> Result<()> {
        self.lock().rollbacks.push(deployment_id.to_string());
        match &self.rollback_error {
            Some(message) => Err(AppError::CommandFailed {
                command: format!("rollback {}", deployment_id),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn create_preview(&self) -> Result<PreviewDeployment> {
        self.lock().previews_created += 1;
        let url = self.preview_url.clone().ok_or(AppError::DeploymentUrlNotFound)?;
        Ok(PreviewDeployment {
            id: Some("preview-1".to_string()),
            url,
        })
    }

    async fn promote_to_production(&self, preview: &PreviewDeployment) -> Result<()> {
        self.lock().promotions.push(preview.clone());
        match &self.promote_error {
            Some(message) => Err(AppError::CommandFailed {
                command: "redeploy".to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, status: &str) -> DeploymentRecord {
        DeploymentRecord {
            id: id.to_string(),
            status: status.to_string(),
            created_at: None,
            url: None,
        }
    }

    #[test]
    fn test_rollback_target_skips_current_deployment() {
        let records = vec![
            record("A", "FAILED"),
            record("B", "SUCCESS"),
            record("C", "SUCCESS"),
        ];
        assert_eq!(select_rollback_target(&records).unwrap().id, "B");
    }

    #[test]
    fn test_rollback_target_ignores_successful_current() {
        let records = vec![record("A", "SUCCESS"), record("B", "CRASHED")];
        assert!(select_rollback_target(&records).is_none());
        assert!(select_rollback_target(&[]).is_none());
    }

    #[test]
    fn test_extract_url_prefers_service_over_build_logs() {
        let output = "Indexing...\nUploading...\n\
                      Build Logs: https://railway.app/project/abc/service/def?id=9\n\
                      Deployment live at https://web-preview.up.railway.app.\n";
        assert_eq!(extract_url(output).unwrap(), "https://web-preview.up.railway.app");
        assert!(extract_url("Build Logs: https://railway.com/project/abc/service/def").is_none());
        assert_eq!(
            extract_url("live at https://web-preview.up.railway.app.").unwrap(),
            "https://web-preview.up.railway.app"
        );
        assert!(extract_url("Deployment queued").is_none());
    }

    #[tokio::test]
    async fn test_create_preview_without_url_fails() {
        let runner =
            ScriptedCommandRunner::new().reply("up", Ok("Deployment queued\n".to_string()));
        let platform = CliPlatform::new(
            PlatformConfig::default(),
            Arc::new(runner),
            Duration::from_secs(30),
        );

        let err = platform.create_preview().await.unwrap_err();
        assert!(matches!(err, AppError::DeploymentUrlNotFound));
    }

    #[tokio::test]
    async fn test_cli_platform_parses_preview_and_history() {
        let runner = Arc::new(
            ScriptedCommandRunner::new()
                .reply(
                    "up --detach --environment preview",
                    Ok("Build Logs: https://railway.app/project/abc/service/def?id=9\n\
                        Deployment ID: 7f3a-11\nhttps://web-preview.up.railway.app\n"
                        .to_string()),
                )
                .reply(
                    "deployment list --json",
                    Ok(r#"[{"id":"d3","status":"FAILED","createdAt":"2026-10-01T10:00:00Z"},
                           {"id":"d2","status":"SUCCESS","staticUrl":"web.up.railway.app"}]"#
                        .to_string()),
                ),
        );
        let platform = CliPlatform::new(
            PlatformConfig::default(),
            runner.clone(),
            Duration::from_secs(30),
        );

        let preview = platform.create_preview().await.unwrap();
        assert_eq!(preview.url, "https://web-preview.up.railway.app");
        assert_eq!(preview.id.as_deref(), Some("7f3a-11"));

        let history = platform.list_deployments().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].created_at.as_deref(), Some("2026-10-01T10:00:00Z"));
        assert!(history[1].is_success());
        assert_eq!(runner.invocations().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_command_surfaces_command_failed() {
        let runner =
            ScriptedCommandRunner::new().reply("rollback", Err("unauthorized".to_string()));
        let platform = CliPlatform::new(
            PlatformConfig::default(),
            Arc::new(runner),
            Duration::from_secs(30),
        );

        let err = platform
            .rollback_to("d2", Duration::from_secs(300))
            .await
            .unwrap_err();
        match err {
            AppError::CommandFailed { command, message } => {
                assert_eq!(command, "railway rollback d2 --yes");
                assert_eq!(message, "unauthorized");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_tokio_runner_reports_exit_status() {
        let runner = TokioCommandRunner;
        let ok = runner
            .run("sh", &["-c".to_string(), "echo ready".to_string()], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(ok.trim(), "ready");

        let err = runner
            .run(
                "sh",
                &["-c".to_string(), "echo nope >&2; exit 3".to_string()],
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CommandFailed { ref message, .. } if message == "nope"));
    }
}
