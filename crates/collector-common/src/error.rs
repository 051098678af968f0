//! Error types for the collector

use thiserror::Error;

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Main error type for the collector
///
/// Every variant except [`CollectorError::Config`] is recoverable at the
/// cycle level: the failing cycle is logged and the next scheduled cycle
/// starts from a clean state.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// The API call failed on every attempt of the retry budget
    #[error("Fetch from {url} failed after {attempts} attempt(s): {message}")]
    TransientFetch {
        url: String,
        attempts: u32,
        message: String,
    },

    /// The API answered with a body that is not valid JSON
    #[error("Malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    /// The broker rejected or could not accept a message
    #[error("Publish failed after {published} message(s): {message}")]
    Publish { published: usize, message: String },

    /// The broker connection or channel is not usable
    #[error("Broker connection lost: {0}")]
    BrokerConnectionLost(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CollectorError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a broker connection error
    pub fn connection_lost(msg: impl Into<String>) -> Self {
        Self::BrokerConnectionLost(msg.into())
    }

    /// Whether the error is fatal for the whole process rather than one cycle
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(CollectorError::config("API_URL is required").is_fatal());
        assert!(!CollectorError::connection_lost("socket closed").is_fatal());
        assert!(!CollectorError::Publish {
            published: 1,
            message: "nack".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_transient_fetch_message_carries_context() {
        let err = CollectorError::TransientFetch {
            url: "http://api.test/items".to_string(),
            attempts: 3,
            message: "HTTP 503".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "Fetch from http://api.test/items failed after 3 attempt(s): HTTP 503"
        );
    }
}
