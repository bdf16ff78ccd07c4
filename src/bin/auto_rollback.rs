//! Post-deployment auto-rollback CLI
//!
//! `monitor` watches the live deployment for the configured window and rolls
//! back once consecutive health failures reach the threshold. `check` runs a
//! single strict health poll. `rollback` triggers the guarded rollback by hand.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use deploy_sentinel::{
    config::Config,
    core::{clock::TokioClock, console, logging::init_cli_logging, shutdown_signal},
    deployment::{
        notifier_from_config, AutoRollbackMonitor, CliPlatform, MonitorOutcome,
        ReqwestHttpProbe, RollbackCoordinator, RollbackSettings, TokioCommandRunner,
    },
};
use dotenv::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Automatic rollback for unhealthy deployments
#[derive(Parser)]
#[command(name = "auto-rollback")]
#[command(about = "Watch a deployment and roll back when it stays unhealthy")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor the live deployment for the configured window
    Monitor,

    /// Run one health check; exit 0 only when the deployment is healthy
    Check,

    /// Roll back to the previous successful deployment now
    Rollback {
        /// Reason recorded in logs and alerts
        #[arg(short, long, default_value = "Manual rollback")]
        reason: String,
    },
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            console::failure(&format!("{:#}", e));
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_cli_logging(&config.logging).context("Failed to initialize logging")?;

    let clock = Arc::new(TokioClock);
    let http = Arc::new(ReqwestHttpProbe::new(config.monitor.http_timeout)?);
    let notifier = notifier_from_config(&config)?;
    let platform = Arc::new(CliPlatform::new(
        config.platform.clone(),
        Arc::new(TokioCommandRunner),
        config.monitor.rollback_timeout,
    ));
    let coordinator = Arc::new(RollbackCoordinator::new(
        platform,
        http.clone(),
        notifier.clone(),
        clock.clone(),
        RollbackSettings::from_monitor(&config.monitor),
        config.app.environment.clone(),
    ));
    let monitor = AutoRollbackMonitor::new(
        config.monitor.clone(),
        http,
        coordinator.clone(),
        notifier,
        clock,
        config.app.environment.clone(),
    );

    match cli.command {
        Commands::Check => {
            console::step(&format!("Checking {}", config.monitor.health_url));
            let poll = monitor.check().await;
            let summary = format!(
                "HTTP {} status={} {}",
                poll.status_code.map_or("-".to_string(), |c| c.to_string()),
                poll.status.as_deref().unwrap_or("-"),
                poll.error.as_deref().unwrap_or("")
            );
            if poll.healthy {
                console::success(&format!("Deployment is healthy ({})", summary.trim()));
                Ok(0)
            } else {
                console::failure(&format!("Deployment is not healthy ({})", summary.trim()));
                Ok(1)
            }
        }
        Commands::Rollback { reason } => {
            console::step(&format!("Rolling back: {}", reason));
            if coordinator.rollback(&reason).await? {
                console::success("Rollback completed and verified");
                Ok(0)
            } else {
                console::warning("A rollback is already in progress");
                Ok(1)
            }
        }
        Commands::Monitor => {
            console::step(&format!(
                "Monitoring {} every {}s for {} minutes (threshold {})",
                config.monitor.health_url,
                config.monitor.check_interval.as_secs(),
                config.monitor.monitoring_duration.as_secs() / 60,
                config.monitor.failure_threshold
            ));

            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                signal_cancel.cancel();
            });

            let outcome = monitor.start_monitoring(cancel).await;
            match outcome {
                MonitorOutcome::WindowElapsed => {
                    console::success("Monitoring window completed, deployment is stable")
                }
                MonitorOutcome::Cancelled => console::warning("Monitoring stopped by signal"),
                MonitorOutcome::RolledBack => {
                    console::warning("Deployment was rolled back to the previous version")
                }
                MonitorOutcome::RollbackFailed => console::failure(&format!(
                    "{}",
                    "Automatic rollback failed, manual intervention required".bold()
                )),
                MonitorOutcome::AlreadyMonitoring => {
                    console::warning("Monitoring is already running")
                }
            }
            Ok(if outcome.is_success() { 0 } else { 1 })
        }
    }
}
