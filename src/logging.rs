//! Tracing subscriber setup
//!
//! Installs a global subscriber combining:
//! - **EnvFilter**: log levels from `RUST_LOG`, falling back to the given level
//! - **Fmt layer**: human-readable or JSON console output
//!
//! # Example
//!
//! ```no_run
//! use signed_uploadr::logging::init_subscriber;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! init_subscriber("info", false)?;
//! tracing::info!("Subscriber is now active");
//! # Ok(())
//! # }
//! ```

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Errors that can occur while installing the subscriber
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{0}'")]
    InvalidFilter(String),

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Build the filter: `RUST_LOG` wins over `default_level`
pub fn env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level)
            .map_err(|_| LoggingError::InvalidFilter(default_level.to_string())),
    }
}

/// Initialize the global tracing subscriber
///
/// # Arguments
///
/// * `default_level` - Filter directive used when `RUST_LOG` is not set
/// * `json` - Emit JSON lines instead of human-readable output
pub fn init_subscriber(default_level: &str, json: bool) -> Result<(), LoggingError> {
    let env_filter = env_filter(default_level)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(registry.with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(registry.with(fmt_layer))
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
