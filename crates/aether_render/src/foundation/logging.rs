//! Logging utilities

pub use log::{debug, error, info, trace, warn};

use crate::core::config::LoggingConfig;

/// Initialize the logging system from configuration.
///
/// `RUST_LOG` takes precedence over the configured filter. Calling this more
/// than once is harmless; later calls keep the first logger.
pub fn init(config: &LoggingConfig) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&config.filter);
    if let Ok(filter) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filter);
    }
    if config.timestamps {
        builder.format_timestamp_millis();
    } else {
        builder.format_timestamp(None);
    }

    if builder.try_init().is_err() {
        log::debug!("Logger already initialized, keeping existing configuration");
    }
}

/// Initialize with the default filter (`info`).
pub fn init_default() {
    init(&LoggingConfig::default());
}
