//! Runtime error types

use thiserror::Error;

/// Errors raised while building or running an operator pipeline.
///
/// Usage errors (`WindowRequired`, `EventTypeListTooShort`,
/// `InvalidArgument`, `UnexpectedWindow`) are raised by the engine itself;
/// `Source` carries a failure signalled by an upstream producer and is
/// forwarded unchanged through every stage.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CepError {
    #[error("{operator} requires preceding window operator")]
    WindowRequired { operator: &'static str },

    #[error("{operator}: the event type list must have more than one element")]
    EventTypeListTooShort { operator: &'static str },

    #[error("{operator}: invalid argument: {message}")]
    InvalidArgument {
        operator: &'static str,
        message: String,
    },

    #[error("{operator} expects single events, found a window")]
    UnexpectedWindow { operator: &'static str },

    #[error("source error: {0}")]
    Source(String),
}

impl CepError {
    pub fn invalid(operator: &'static str, message: impl Into<String>) -> Self {
        CepError::InvalidArgument {
            operator,
            message: message.into(),
        }
    }

    pub fn source(message: impl Into<String>) -> Self {
        CepError::Source(message.into())
    }

    /// Whether the error was raised by the engine rather than a producer.
    pub fn is_usage_error(&self) -> bool {
        !matches!(self, CepError::Source(_))
    }
}

pub type CepResult<T> = Result<T, CepError>;
