use std::sync::Mutex;
use sysinfo::{get_current_pid, ProcessesToUpdate, System};

use super::types::HealthStatus;
use crate::error::{AppError, Result};

const DEGRADED_RATIO: f64 = 0.85;
const UNHEALTHY_RATIO: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl MemoryUsage {
    pub fn ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.total_bytes as f64
        }
    }

    pub fn status(&self) -> HealthStatus {
        classify_usage(self.ratio())
    }
}

/// < 85% healthy, 85–95% degraded, >= 95% unhealthy.
pub fn classify_usage(ratio: f64) -> HealthStatus {
    if ratio < DEGRADED_RATIO {
        HealthStatus::Healthy
    } else if ratio < UNHEALTHY_RATIO {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

pub trait MemorySampler: Send + Sync {
    fn sample(&self) -> Result<MemoryUsage>;
}

/// Resident memory of this process against `limit_bytes`, or against the
/// host's total memory when no limit is configured.
pub struct SystemMemorySampler {
    system: Mutex<System>,
    limit_bytes: Option<u64>,
}

impl SystemMemorySampler {
    pub fn new(limit_bytes: Option<u64>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            limit_bytes: limit_bytes.filter(|limit| *limit > 0),
        }
    }
}

impl MemorySampler for SystemMemorySampler {
    fn sample(&self) -> Result<MemoryUsage> {
        let pid = get_current_pid().map_err(|e| {
            AppError::InternalServerError(format!("Cannot resolve current pid: {}", e))
        })?;

        let mut system = self.system.lock().unwrap_or_else(|p| p.into_inner());
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let used_bytes = system
            .process(pid)
            .map(|process| process.memory())
            .ok_or_else(|| {
                AppError::InternalServerError("Current process not found".to_string())
            })?;

        let total_bytes = match self.limit_bytes {
            Some(limit) => limit,
            None => {
                system.refresh_memory();
                system.total_memory()
            }
        };
        if total_bytes == 0 {
            return Err(AppError::InternalServerError(
                "Total memory reported as zero".to_string(),
            ));
        }

        Ok(MemoryUsage {
            used_bytes,
            total_bytes,
        })
    }
}

pub struct StaticMemorySampler {
    usage: Option<MemoryUsage>,
}

impl StaticMemorySampler {
    pub fn with_ratio(ratio: f64) -> Self {
        let total_bytes = 1024 * 1024 * 1024;
        Self {
            usage: Some(MemoryUsage {
                used_bytes: (total_bytes as f64 * ratio) as u64,
                total_bytes,
            }),
        }
    }

    pub fn unavailable() -> Self {
        Self { usage: None }
    }
}

impl MemorySampler for StaticMemorySampler {
    fn sample(&self) -> Result<MemoryUsage> {
        self.usage
            .ok_or_else(|| {
                AppError::InternalServerError("Memory statistics unavailable".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_thresholds() {
        assert_eq!(classify_usage(0.10), HealthStatus::Healthy);
        assert_eq!(classify_usage(0.849), HealthStatus::Healthy);
        assert_eq!(classify_usage(0.85), HealthStatus::Degraded);
        assert_eq!(classify_usage(0.94), HealthStatus::Degraded);
        assert_eq!(classify_usage(0.95), HealthStatus::Unhealthy);
        assert_eq!(classify_usage(1.0), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_sampler_measures_this_process_not_the_host() {
        let usage = SystemMemorySampler::new(None).sample().unwrap();
        assert!(usage.used_bytes > 0);

        let mut system = System::new();
        system.refresh_memory();
        assert_eq!(usage.total_bytes, system.total_memory());
        assert!(usage.used_bytes <= system.used_memory());
    }

    #[test]
    fn test_sampler_judges_against_configured_limit() {
        let usage = SystemMemorySampler::new(Some(64 * 1024)).sample().unwrap();
        assert_eq!(usage.total_bytes, 64 * 1024);
        assert_eq!(usage.status(), HealthStatus::Unhealthy);

        let roomy = SystemMemorySampler::new(Some(1 << 40)).sample().unwrap();
        assert_eq!(roomy.status(), HealthStatus::Healthy);
    }
}
