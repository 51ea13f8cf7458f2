//! Tracing subscriber bootstrap

use crate::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),

    #[error("unknown log format '{0}' (expected text or json)")]
    InvalidFormat(String),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Build the level filter. `RUST_LOG`, when set and valid, wins over the config.
pub fn filter_for(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(&config.level)
            .map_err(|e| LoggingError::InvalidFilter(config.level.clone(), e.to_string()))
    })
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer(config: &LoggingConfig) -> Result<BoxedLayer, LoggingError> {
    let base = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let layer = match (config.format.as_str(), config.timestamps) {
        ("json", true) => base.json().boxed(),
        ("json", false) => base.json().without_time().boxed(),
        ("text", true) => base.boxed(),
        ("text", false) => base.without_time().boxed(),
        (other, _) => return Err(LoggingError::InvalidFormat(other.to_string())),
    };
    Ok(layer)
}

/// Install the global subscriber described by `config`.
///
/// A second call leaves the first subscriber in place and reports
/// [`LoggingError::AlreadyInitialized`].
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let layer = fmt_layer(config)?;
    let filter = filter_for(config)?;
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
