use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

const DEFAULT_EXPECTED_TABLES: &[&str] = &["users", "user_progress", "handbook_sections"];
const DEFAULT_ESSENTIAL_TABLE: &str = "handbook_sections";
// `A|B` is satisfied by either variable; the environment name falls back the same way.
const DEFAULT_REQUIRED_ENV: &[&str] = &["DATABASE_URL", "APP_ENV|RAILWAY_ENVIRONMENT"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    Disable,
    Prefer,
    Require,
}

impl FromStr for SslMode {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "disable" | "false" | "off" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" | "true" | "on" => Ok(SslMode::Require),
            other => Err(AppError::ConfigurationError(format!(
                "DATABASE_SSL must be one of disable, prefer, require (got `{}`)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub ssl_mode: SslMode,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub debug: bool,
    pub health_check_interval: Duration,
    pub failure_log_interval: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            ssl_mode: SslMode::Prefer,
            max_connections: 10,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(20),
            max_lifetime: Duration::from_secs(1800),
            debug: false,
            health_check_interval: Duration::from_secs(30),
            failure_log_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppInfo {
    pub version: String,
    pub environment: String,
    pub port: u16,
    pub fs_probe_dir: PathBuf,
    pub handler_timeout: Duration,
    /// Memory budget for the health check; host total memory when unset.
    pub memory_limit_bytes: Option<u64>,
}

impl AppInfo {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            port: 3000,
            fs_probe_dir: std::env::temp_dir(),
            handler_timeout: Duration::from_secs(15),
            memory_limit_bytes: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObservabilityConfig {
    pub dsn: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub format: String,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub health_url: String,
    pub readiness_url: String,
    pub check_interval: Duration,
    pub failure_threshold: u32,
    pub rollback_timeout: Duration,
    pub monitoring_duration: Duration,
    pub http_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_url: "http://localhost:3000/api/health".to_string(),
            readiness_url: "http://localhost:3000/api/ready".to_string(),
            check_interval: Duration::from_secs(30),
            failure_threshold: 3,
            rollback_timeout: Duration::from_secs(300),
            monitoring_duration: Duration::from_secs(600),
            http_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertConfig {
    pub slack_webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub cli: String,
    pub environment: Option<String>,
    pub service_name: Option<String>,
    pub deployment_id: Option<String>,
    pub preview_environment: String,
    pub production_url: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            cli: "railway".to_string(),
            environment: None,
            service_name: None,
            deployment_id: None,
            preview_environment: "preview".to_string(),
            production_url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    pub expected_tables: Vec<String>,
    pub essential_table: String,
    pub required_env: Vec<String>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            expected_tables: DEFAULT_EXPECTED_TABLES.iter().map(|t| t.to_string()).collect(),
            essential_table: DEFAULT_ESSENTIAL_TABLE.to_string(),
            required_env: DEFAULT_REQUIRED_ENV.iter().map(|v| v.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub app: AppInfo,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
    pub logging: LoggingConfig,
    pub monitor: MonitorConfig,
    pub alerts: AlertConfig,
    pub platform: PlatformConfig,
    pub readiness: ReadinessConfig,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Config> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through an arbitrary key lookup.
    pub fn from_source<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = Config::default();

        let environment = get("APP_ENV")
            .or_else(|| get("RAILWAY_ENVIRONMENT"))
            .unwrap_or(defaults.app.environment);

        let app = AppInfo {
            version: get("APP_VERSION").unwrap_or(defaults.app.version),
            environment,
            port: parse_or(get("SERVER_PORT"), "SERVER_PORT", defaults.app.port)?,
            fs_probe_dir: get("HEALTH_FS_PROBE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.app.fs_probe_dir),
            handler_timeout: millis_or(
                get("HEALTH_HANDLER_TIMEOUT"),
                "HEALTH_HANDLER_TIMEOUT",
                defaults.app.handler_timeout,
            )?,
            memory_limit_bytes: get("MEMORY_LIMIT_MB")
                .map(|raw| parse_or::<u64>(Some(raw), "MEMORY_LIMIT_MB", 0))
                .transpose()?
                .map(|mb| mb * 1024 * 1024),
        };

        let database = DatabaseConfig {
            url: get("DATABASE_URL"),
            ssl_mode: match get("DATABASE_SSL") {
                Some(raw) => raw.parse()?,
                None => defaults.database.ssl_mode,
            },
            max_connections: parse_or(
                get("DATABASE_CONNECTION_POOL_SIZE"),
                "DATABASE_CONNECTION_POOL_SIZE",
                defaults.database.max_connections,
            )?,
            connect_timeout: secs_or(
                get("DATABASE_CONNECTION_TIMEOUT"),
                "DATABASE_CONNECTION_TIMEOUT",
                defaults.database.connect_timeout,
            )?,
            idle_timeout: secs_or(
                get("DATABASE_IDLE_TIMEOUT"),
                "DATABASE_IDLE_TIMEOUT",
                defaults.database.idle_timeout,
            )?,
            max_lifetime: secs_or(
                get("DATABASE_MAX_LIFETIME"),
                "DATABASE_MAX_LIFETIME",
                defaults.database.max_lifetime,
            )?,
            debug: parse_or(get("DATABASE_DEBUG"), "DATABASE_DEBUG", false)?,
            ..defaults.database
        };

        let production_url = get("PRODUCTION_URL");
        let base = production_url
            .clone()
            .unwrap_or_else(|| "http://localhost:3000".to_string());
        let base = base.trim_end_matches('/');

        let monitor = MonitorConfig {
            health_url: get("HEALTH_CHECK_URL").unwrap_or_else(|| format!("{}/api/health", base)),
            readiness_url: get("READINESS_CHECK_URL")
                .unwrap_or_else(|| format!("{}/api/ready", base)),
            check_interval: millis_or(
                get("ROLLBACK_CHECK_INTERVAL"),
                "ROLLBACK_CHECK_INTERVAL",
                defaults.monitor.check_interval,
            )?,
            failure_threshold: parse_or(
                get("ROLLBACK_FAILURE_THRESHOLD"),
                "ROLLBACK_FAILURE_THRESHOLD",
                defaults.monitor.failure_threshold,
            )?,
            rollback_timeout: millis_or(
                get("ROLLBACK_TIMEOUT"),
                "ROLLBACK_TIMEOUT",
                defaults.monitor.rollback_timeout,
            )?,
            monitoring_duration: millis_or(
                get("MONITORING_DURATION"),
                "MONITORING_DURATION",
                defaults.monitor.monitoring_duration,
            )?,
            http_timeout: millis_or(
                get("HTTP_TIMEOUT"),
                "HTTP_TIMEOUT",
                defaults.monitor.http_timeout,
            )?,
        };

        if monitor.failure_threshold == 0 {
            return Err(AppError::ConfigurationError(
                "ROLLBACK_FAILURE_THRESHOLD must be at least 1".to_string(),
            ));
        }

        let platform = PlatformConfig {
            cli: get("PLATFORM_CLI").unwrap_or(defaults.platform.cli),
            environment: get("RAILWAY_ENVIRONMENT"),
            service_name: get("RAILWAY_SERVICE_NAME"),
            deployment_id: get("RAILWAY_DEPLOYMENT_ID"),
            preview_environment: get("PREVIEW_ENVIRONMENT")
                .unwrap_or(defaults.platform.preview_environment),
            production_url,
        };

        let readiness = ReadinessConfig {
            expected_tables: get("READINESS_EXPECTED_TABLES")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.readiness.expected_tables),
            essential_table: get("READINESS_ESSENTIAL_TABLE")
                .unwrap_or(defaults.readiness.essential_table),
            required_env: get("READINESS_REQUIRED_ENV")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.readiness.required_env),
        };

        Ok(Config {
            app,
            database,
            observability: ObservabilityConfig {
                dsn: get("SENTRY_DSN"),
            },
            logging: LoggingConfig {
                format: get("LOG_FORMAT").unwrap_or_else(|| "compact".to_string()),
            },
            monitor,
            alerts: AlertConfig {
                slack_webhook_url: get("SLACK_WEBHOOK_URL"),
            },
            platform,
            readiness,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(value) => value.trim().parse::<T>().map_err(|_| {
            AppError::ConfigurationError(format!("{} has an invalid value `{}`", key, value))
        }),
        None => Ok(default),
    }
}

fn secs_or(raw: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    parse_or(raw, key, default.as_secs()).map(Duration::from_secs)
}

fn millis_or(raw: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    parse_or(raw, key, default.as_millis() as u64).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_source(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = config_from(&[]).unwrap();
        assert!(config.database.url.is_none());
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.monitor.failure_threshold, 3);
        assert_eq!(config.monitor.check_interval, Duration::from_secs(30));
        assert_eq!(config.monitor.monitoring_duration, Duration::from_secs(600));
        assert_eq!(config.monitor.health_url, "http://localhost:3000/api/health");
        assert_eq!(config.app.environment, "development");
        assert!(config.app.memory_limit_bytes.is_none());
    }

    #[test]
    fn test_monitor_urls_follow_production_url() {
        let config = config_from(&[("PRODUCTION_URL", "https://fly.example.com/")]).unwrap();
        assert_eq!(config.monitor.health_url, "https://fly.example.com/api/health");
        assert_eq!(config.monitor.readiness_url, "https://fly.example.com/api/ready");
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://db.internal/app"),
            ("DATABASE_SSL", "require"),
            ("DATABASE_CONNECTION_POOL_SIZE", "25"),
            ("ROLLBACK_CHECK_INTERVAL", "5000"),
            ("ROLLBACK_FAILURE_THRESHOLD", "5"),
            ("READINESS_REQUIRED_ENV", "DATABASE_URL, CLERK_SECRET_KEY ,"),
            ("MEMORY_LIMIT_MB", "512"),
        ])
        .unwrap();

        assert_eq!(config.database.ssl_mode, SslMode::Require);
        assert_eq!(config.database.max_connections, 25);
        assert_eq!(config.monitor.check_interval, Duration::from_millis(5000));
        assert_eq!(config.monitor.failure_threshold, 5);
        assert_eq!(config.app.memory_limit_bytes, Some(512 * 1024 * 1024));
        assert_eq!(
            config.readiness.required_env,
            vec!["DATABASE_URL".to_string(), "CLERK_SECRET_KEY".to_string()]
        );
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = config_from(&[("ROLLBACK_FAILURE_THRESHOLD", "three")]).unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(_)));

        let err = config_from(&[("ROLLBACK_FAILURE_THRESHOLD", "0")]).unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(_)));
    }
}
