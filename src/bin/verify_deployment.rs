//! Post-deploy verification CLI
//!
//! Runs the full verification battery against a deployed base URL and exits
//! 0 only when every check passed.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use deploy_sentinel::{
    config::Config,
    core::{console, logging::init_cli_logging},
    deployment::{DeploymentVerifier, ReqwestHttpProbe},
};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;

/// Deployment verification harness
#[derive(Parser)]
#[command(name = "verify-deployment")]
#[command(about = "Verify a deployed instance end to end")]
#[command(version)]
struct Cli {
    /// Base URL of the deployment (defaults to PRODUCTION_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Write the JSON report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            console::failure(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_cli_logging(&config.logging).context("Failed to initialize logging")?;

    let base_url = cli
        .base_url
        .or_else(|| config.platform.production_url.clone())
        .context("No base URL: pass --base-url or set PRODUCTION_URL")?;

    console::step(&format!("Verifying deployment at {}", base_url));
    let http = Arc::new(ReqwestHttpProbe::new(config.monitor.http_timeout)?);
    let report = DeploymentVerifier::new(http, base_url).run().await;

    for result in &report.results {
        let line = format!("{} ({}ms)", result.name, result.duration_ms);
        match &result.error {
            None => console::success(&line),
            Some(error) => console::failure(&format!("{}: {}", line, error)),
        }
    }

    println!();
    println!("{}", "Verification summary".bold());
    println!("  Total:        {}", report.total);
    println!("  Passed:       {}", report.passed.to_string().green());
    println!("  Failed:       {}", report.failed.to_string().red());
    println!("  Success rate: {:.1}%", report.success_rate);

    if let Some(path) = cli.report {
        report
            .write_to(&path)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        console::plain(&format!("Report written to {}", path.display()));
    }

    Ok(report.success)
}
