//! Upstream failure classification.

use std::error::Error;

/// Boxed error kept as the source of an [`UpstreamError`].
type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// A failed fetch, classified by whether retrying can help.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum UpstreamError {
    /// Timeout, connection failure, 5xx or 429. Worth retrying.
    #[error("transient upstream failure: {message}")]
    Transient {
        /// What was being attempted.
        message: String,
        /// Underlying error, if any.
        #[source]
        source: Option<BoxError>,
    },
    /// Malformed request, other 4xx, or an undecodable response.
    #[error("permanent upstream failure: {message}")]
    Permanent {
        /// What was being attempted.
        message: String,
        /// Underlying error, if any.
        #[source]
        source: Option<BoxError>,
    },
}

impl UpstreamError {
    /// Creates a transient error.
    pub fn transient(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::Transient {
            message: message.into(),
            source,
        }
    }

    /// Creates a permanent error.
    pub fn permanent(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Self::Permanent {
            message: message.into(),
            source,
        }
    }

    /// Returns `true` for failures that may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
