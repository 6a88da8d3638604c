//! Logging setup
//!
//! Diagnostics go to stderr through `tracing`. `TASKR_LOG` takes a full
//! filter directive (e.g. `taskr=debug`) and overrides the configured level.

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

/// Environment variable holding a filter directive
pub const LOG_ENV: &str = "TASKR_LOG";

/// Filter used when `TASKR_LOG` is unset
pub fn default_directive(level: LogLevel) -> String {
    format!("taskr={}", level.as_str())
}

/// Initialize logging with the specified level
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
