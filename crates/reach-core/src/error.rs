//! Error types for the reachability system
//!
//! This module defines all error types used throughout the crate.

use crate::monitor::MonitorId;
use thiserror::Error;

/// Result type alias for reachability operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the reachability system
#[derive(Error, Debug)]
pub enum Error {
    /// A textual address did not parse as IPv4 or IPv6
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A host name target was empty
    #[error("Invalid host name: {0:?}")]
    InvalidHostName(String),

    /// The flag source could not establish a watch
    #[error("Subscription failed ({source_name}): {reason}")]
    SubscriptionFailed {
        /// Flag source name
        source_name: String,
        /// Failure description
        reason: String,
    },

    /// A one-shot flag read failed
    #[error("Flag fetch failed ({source_name}): {reason}")]
    FetchFailed {
        /// Flag source name
        source_name: String,
        /// Failure description
        reason: String,
    },

    /// `start` was called on a monitor that is already watching
    #[error("{0} is already watching")]
    AlreadyWatching(MonitorId),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from platform sources
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid address error
    pub fn invalid_address(text: impl Into<String>) -> Self {
        Self::InvalidAddress(text.into())
    }

    /// Create an invalid host name error
    pub fn invalid_host_name(name: impl Into<String>) -> Self {
        Self::InvalidHostName(name.into())
    }

    /// Create a subscription failure for the named source
    pub fn subscription_failed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubscriptionFailed {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a fetch failure for the named source
    pub fn fetch_failed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Re-tag an arbitrary source error as a subscription failure
    ///
    /// Errors that already are `SubscriptionFailed` pass through unchanged.
    pub(crate) fn into_subscription_failed(self, source_name: &str) -> Self {
        match self {
            err @ Self::SubscriptionFailed { .. } => err,
            other => Self::subscription_failed(source_name, other.to_string()),
        }
    }

    /// Re-tag an arbitrary source error as a fetch failure
    pub(crate) fn into_fetch_failed(self, source_name: &str) -> Self {
        match self {
            err @ Self::FetchFailed { .. } => err,
            other => Self::fetch_failed(source_name, other.to_string()),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
