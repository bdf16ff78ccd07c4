//! Cross-cutting building blocks
//!
//! Time, logging, error reporting, signal handling and the probes that
//! the server and the deployment tooling share.

pub mod clock;
pub mod console;
pub mod error_reporting;
pub mod logging;
pub mod observability;
pub mod shutdown;

pub use clock::{Clock, ManualClock, TokioClock};
pub use error_reporting::{EventLevel, RecordingReporter, Reporter, TracingReporter};
pub use shutdown::shutdown_signal;
