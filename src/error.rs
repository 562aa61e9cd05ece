//! Error types for the decision cache.

use std::fmt;

/// Result type for decision cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the decision cache.
///
/// Normal cache state transitions (hit, miss, invalidation) never produce an
/// error. Only a failed prediction fetch, or a bad construction parameter,
/// reaches the caller.
#[derive(Debug, Clone)]
pub enum Error {
    /// The prediction request failed.
    ///
    /// Raised when:
    /// - The transport could not deliver the request (connection refused, DNS, TLS)
    /// - The service answered with a status outside `200..300`
    /// - All retry attempts were exhausted; the message then wraps the last
    ///   attempt's error
    ///
    /// **Recovery:** Treat as "no decision available" for this call.
    FetchError(String),

    /// The prediction service answered, but the body was unusable.
    ///
    /// Raised when:
    /// - The body is not valid JSON
    /// - `predictions` is missing or empty
    /// - `predictions[0].variationId` is missing or not a string
    InvalidResponse(String),

    /// A single attempt exceeded the configured request timeout.
    ///
    /// The timeout bounds one attempt, not the whole retry sequence.
    Timeout(String),

    /// The request body could not be encoded.
    SerializationError(String),

    /// Configuration error during construction.
    ///
    /// Common causes:
    /// - Zero lock stripes
    /// - Non-finite or sub-1.0 backoff multiplier
    /// - Maximum backoff smaller than the initial backoff
    ///
    /// **Recovery:** Fix configuration and restart.
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::FetchError(msg) => write!(f, "Fetch error: {}", msg),
            Error::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::FetchError(e.to_string())
        } else if e.is_syntax() || e.is_eof() || e.is_data() {
            Error::InvalidResponse(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::FetchError(format!("HTTP transport error: {}", e))
        }
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
