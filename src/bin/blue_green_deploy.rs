//! Blue-green deployment CLI
//!
//! Creates a preview deployment, waits for it to report healthy and ready,
//! promotes it, then re-checks production and rolls back if that fails.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use deploy_sentinel::{
    config::Config,
    core::{clock::TokioClock, console, logging::init_cli_logging},
    deployment::{
        notifier_from_config, BlueGreenDeployer, BlueGreenSettings, CliPlatform,
        ReqwestHttpProbe, RollbackCoordinator, RollbackSettings, TokioCommandRunner,
    },
};
use dotenv::dotenv;
use std::sync::Arc;

/// Blue-green deployment with automatic verification
#[derive(Parser)]
#[command(name = "blue-green-deploy")]
#[command(about = "Deploy a preview, verify it and promote it to production")]
#[command(version)]
struct Cli {
    /// Production base URL checked after promotion
    #[arg(long, env = "PRODUCTION_URL")]
    production_url: String,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        console::failure(&format!("Deployment failed: {:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_cli_logging(&config.logging).context("Failed to initialize logging")?;

    let clock = Arc::new(TokioClock);
    let http = Arc::new(ReqwestHttpProbe::new(config.monitor.http_timeout)?);
    let platform = Arc::new(CliPlatform::new(
        config.platform.clone(),
        Arc::new(TokioCommandRunner),
        config.monitor.rollback_timeout,
    ));

    let production = cli.production_url.trim_end_matches('/').to_string();
    let rollback_settings = RollbackSettings {
        health_url: format!("{}/api/health", production),
        readiness_url: format!("{}/api/ready", production),
        ..RollbackSettings::from_monitor(&config.monitor)
    };
    let coordinator = Arc::new(RollbackCoordinator::new(
        platform.clone(),
        http.clone(),
        notifier_from_config(&config)?,
        clock.clone(),
        rollback_settings,
        config.app.environment.clone(),
    ));

    let deployer = BlueGreenDeployer::new(
        platform,
        http,
        coordinator,
        clock,
        BlueGreenSettings::new(production),
    );

    let summary = deployer.deploy().await?;

    println!();
    println!("{}", "Deployment summary".bold());
    println!(
        "  Previous deployment: {}",
        summary.previous.id.as_deref().unwrap_or("unknown")
    );
    println!("  Preview URL:         {}", summary.preview.url);
    println!(
        "  Promoted deployment: {}",
        summary.preview.id.as_deref().unwrap_or("unknown")
    );
    println!("  Production URL:      {}", summary.production_url);
    println!(
        "  Total duration:      {:.1}s",
        summary.duration_ms as f64 / 1000.0
    );
    Ok(())
}
