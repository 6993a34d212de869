//! Error types for Callgate.
//!
//! Admission rejections live in [`crate::admission::Rejection`]; this module
//! holds the crate-level error and the error type collaborators report.

use thiserror::Error;

/// Main error type for Callgate setup and configuration.
#[derive(Error, Debug)]
pub enum CallgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rules file could not be parsed
    #[error("Rules error: {0}")]
    Rules(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for CallgateError {
    fn from(err: ::config::ConfigError) -> Self {
        CallgateError::Config(err.to_string())
    }
}

/// Failure raised while resolving the key or options for a call.
///
/// These mean rate limiting could not be evaluated at all, as opposed to a
/// [`Rejection`](crate::admission::Rejection) where it was evaluated and said no.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// A key template referenced an argument the call does not carry.
    #[error("key template references unknown argument `{name}`")]
    MissingArgument { name: String },

    /// A key template could not be parsed.
    #[error("invalid key template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// Resolved options violate their constraints.
    #[error("invalid limit options for key `{key}`: {reason}")]
    InvalidOptions { key: String, reason: String },

    /// A custom resolver failed with its own error, kept as-is.
    #[error(transparent)]
    Collaborator(#[from] BoxError),
}

/// Boxed error type custom resolvers fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

impl ResolveError {
    /// Wrap a custom resolver's error without altering it.
    pub fn collaborator(err: impl Into<BoxError>) -> Self {
        ResolveError::Collaborator(err.into())
    }

    /// The custom resolver's own error, if that is what failed.
    ///
    /// Downcast it to recover the concrete type.
    pub fn collaborator_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            ResolveError::Collaborator(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}


/// Result type alias for Callgate operations.
pub type Result<T> = std::result::Result<T, CallgateError>;
