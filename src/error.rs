//! Error types for signal collection.
//!
//! Errors never leave a signal source: providers return [`ProbeError`], and
//! every source turns it into a [`Placeholder`](crate::signal::Placeholder)
//! before reporting. [`ConfigError`] is the only error a caller can see, and
//! only when building a [`SessionConfig`](crate::config::SessionConfig) from
//! the environment.

use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy shared by every probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The capability does not exist on this host.
    Unavailable,
    /// The user or the platform blocked access.
    PermissionDenied,
    /// The declared bound elapsed without a result.
    Timeout,
    /// Network or parse failure.
    Transient,
}

/// Errors raised by opaque data providers and host capabilities.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The capability is not present on the host.
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// Access to the capability was refused.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No result arrived within the bound.
    #[error("no result within {0:?}")]
    Timeout(Duration),

    /// Network, protocol or parse error.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl ProbeError {
    /// Classify this error into the shared taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            ProbeError::Unavailable(_) => FailureKind::Unavailable,
            ProbeError::PermissionDenied(_) => FailureKind::PermissionDenied,
            ProbeError::Timeout(_) => FailureKind::Timeout,
            ProbeError::Transient(_) => FailureKind::Transient,
        }
    }

    /// Shorthand for a transient failure with a message.
    pub fn transient(message: impl Into<String>) -> Self {
        ProbeError::Transient(message.into())
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ProbeError::Transient(format!("request timed out: {err}"));
        }
        ProbeError::Transient(err.to_string())
    }
}

impl From<std::io::Error> for ProbeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => ProbeError::PermissionDenied(err.to_string()),
            std::io::ErrorKind::Unsupported => ProbeError::Unavailable(err.to_string()),
            _ => ProbeError::Transient(err.to_string()),
        }
    }
}

/// Errors raised while reading session configuration overrides.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },

    /// The configured values contradict each other.
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}
