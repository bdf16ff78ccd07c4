//! Health and readiness probes
//!
//! The liveness probe reports per-subsystem status for `GET /api/health`;
//! the readiness probe answers whether the process is safe to receive
//! traffic for `GET /api/ready`.

pub mod health_checks;
pub mod memory;
pub mod readiness;
pub mod types;

pub use health_checks::HealthProbe;
pub use memory::{MemorySampler, StaticMemorySampler, SystemMemorySampler};
pub use readiness::{
    EnvLookup, PgReadinessStore, ProcessEnv, ReadinessProbe, ReadinessStore, StaticReadinessStore,
};
pub use types::{HealthSnapshot, HealthStatus, ReadinessSnapshot, ReadyState};
