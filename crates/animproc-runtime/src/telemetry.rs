//! Tracing setup for the binary

use tracing_subscriber::EnvFilter;

use animproc_core::{AnimError, AnimResult};

use crate::config::LogConfig;

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// filter.
pub fn init_tracing(config: &LogConfig) -> AnimResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| AnimError::Config(e.to_string()))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.with_target(true).try_init()
    };
    installed.map_err(|e| AnimError::Config(format!("tracing already initialized: {}", e)))
}

