pub mod config;
pub mod logging;
#[cfg(feature = "async")]
pub mod shutdown;
pub mod telemetry;

pub use config::{Environment, env_or};
pub use logging::setup_logging;
#[cfg(feature = "async")]
pub use shutdown::shutdown_signal;
pub use telemetry::TelemetryGuard;
