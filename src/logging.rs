//! `tracing` subscriber setup.
//!
//! `RUST_LOG` wins over `logging.level` when set. Events go to stderr so
//! command output on stdout stays clean.

use crate::config::{LogFormat, LoggingConfig};
use std::error::Error;
use tracing_subscriber::EnvFilter;

/// Build the event filter: `RUST_LOG` if set and valid, else the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, Box<dyn Error>> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&config.level)?),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn setup_logging(config: &LoggingConfig) -> Result<(), Box<dyn Error>> {
    let filter = env_filter(config)?;

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .compact()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    installed.map_err(|e| -> Box<dyn Error> { e })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_must_parse() {
        let config = LoggingConfig {
            level: "resize_worker=debug,info".into(),
            format: LogFormat::Json,
        };
        assert!(EnvFilter::try_new(&config.level).is_ok());
        assert!(env_filter(&config).is_ok());

        let bad = LoggingConfig {
            level: "resize_worker=loud".into(),
            format: LogFormat::Pretty,
        };
        assert!(EnvFilter::try_new(&bad.level).is_err());
    }

    fn init(config: &LoggingConfig) -> Result<(), Box<dyn Error>> {
        setup_logging(config)?;
        Ok(())
    }

    #[test]
    fn second_install_fails_through_boxed_error() {
        let config = LoggingConfig {
            level: "warn".into(),
            format: LogFormat::Pretty,
        };
        // Only the first install in this process can win.
        let _ = init(&config);
        let err = init(&config).unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
