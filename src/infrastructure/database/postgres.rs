use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::ConnectOptions;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::pool::{ConnectionCounts, DatabaseHandle};
use crate::config::{DatabaseConfig, SslMode};
use crate::error::Result;

const CONNECTION_COUNTS_SQL: &str = r#"
    SELECT
        count(*)::bigint AS total,
        count(*) FILTER (WHERE state = 'active')::bigint AS active,
        count(*) FILTER (WHERE state = 'idle')::bigint AS idle
    FROM pg_stat_activity
    WHERE datname = current_database()
"#;

pub(crate) fn connect_options(
    url: &str,
    ssl_mode: SslMode,
    debug: bool,
) -> Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(url)?.ssl_mode(match ssl_mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
    });

    Ok(if debug {
        options
    } else {
        options.disable_statement_logging()
    })
}

/// Pooled Postgres connection shared by request handlers.
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Builds the pool without opening a connection; connections are
    /// established on first use.
    pub fn connect_lazy(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let options = connect_options(url, config.ssl_mode, config.debug)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect_lazy_with(options);

        debug!(
            max_connections = config.max_connections,
            "Created lazy Postgres connection pool"
        );
        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabaseHandle for PgDatabase {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn connection_counts(&self) -> Result<ConnectionCounts> {
        let (total, active, idle): (i64, i64, i64) = sqlx::query_as(CONNECTION_COUNTS_SQL)
            .fetch_one(&self.pool)
            .await?;

        Ok(ConnectionCounts {
            total: total.max(0) as u32,
            active: active.max(0) as u32,
            idle: idle.max(0) as u32,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Opens a dedicated single-connection pool, independent of the shared one.
pub(crate) async fn connect_single(
    url: &str,
    ssl_mode: SslMode,
    connect_timeout: Duration,
) -> Result<PgPool> {
    let options = connect_options(url, ssl_mode, false)?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(connect_timeout)
        .connect_with(options)
        .await?;
    Ok(pool)
}
