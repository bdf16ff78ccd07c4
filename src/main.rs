use anyhow::Context;
use deploy_sentinel::{
    config::Config,
    core::{
        clock::TokioClock,
        error_reporting::{Reporter, TracingReporter},
        logging::init_logging,
        observability::{
            HealthProbe, PgReadinessStore, ProcessEnv, ReadinessProbe, ReadinessStore,
            SystemMemorySampler,
        },
        shutdown_signal,
    },
    create_app,
    infrastructure::database::ConnectionPoolManager,
    AppState,
};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_logging(&config.logging).context("Failed to initialize logging")?;

    let reporter: Arc<dyn Reporter> = Arc::new(TracingReporter::new(
        config.observability.dsn.clone(),
        config.app.environment.clone(),
    ));

    let pool = ConnectionPoolManager::initialize(
        config.database.clone(),
        config.app.is_production(),
        reporter.clone(),
        Arc::new(TokioClock),
    );
    if pool.is_database_available().await {
        pool.start_health_monitor();
        let warm_up = pool
            .execute_with_retry(|db| async move { db.ping().await }, 3, Duration::from_secs(1))
            .await;
        if let Err(e) = warm_up {
            warn!(error = %e, "Database not reachable at startup; serving degraded");
        }
    }

    let readiness_store = config.database.url.as_ref().map(|url| {
        Arc::new(PgReadinessStore::new(url.clone(), config.database.ssl_mode))
            as Arc<dyn ReadinessStore>
    });

    let state = AppState {
        health: Arc::new(HealthProbe::new(
            &config.app,
            pool.clone(),
            Arc::new(SystemMemorySampler::new(config.app.memory_limit_bytes)),
            reporter.clone(),
        )),
        readiness: Arc::new(ReadinessProbe::new(
            &config.app,
            config.readiness.clone(),
            readiness_store,
            Arc::new(ProcessEnv),
            reporter.clone(),
        )),
        handler_timeout: config.app.handler_timeout,
    };

    let addr = format!("0.0.0.0:{}", config.app.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        address = %addr,
        environment = %config.app.environment,
        version = %config.app.version,
        "Sentinel server listening (GET /api/health, GET /api/ready)"
    );

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    pool.graceful_shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
