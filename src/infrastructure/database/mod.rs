pub mod pool;
pub mod postgres;
pub mod throttle;

pub use pool::{
    validate_database_url, ConnectionCounts, ConnectionInfo, ConnectionPoolManager,
    DatabaseHandle, FakeDatabase,
};
pub use postgres::PgDatabase;
pub use throttle::RateLimitedLog;
