//! Publisher Error Types
//!
//! Error definitions for leasing, dispatch and finality tracking.

use lob_core::LobError;
use thiserror::Error;

/// Publisher Error
#[derive(Error, Debug)]
pub enum PublisherError {
    /// Chain tip could not be read
    #[error("Chain tip unavailable: {0}")]
    ChainTip(String),

    /// Payload building error
    #[error("Transaction build failed: {0}")]
    Build(String),

    /// Submission API or network error
    #[error("Transaction submission failed: {0}")]
    Submission(String),

    /// Chain reader lookup error
    #[error("Chain reader failed: {0}")]
    ChainReader(String),

    /// External call exceeded its bound
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Accounting core error
    #[error(transparent)]
    Core(#[from] LobError),
}

impl PublisherError {
    /// Whether the next tick may succeed without intervention
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ChainTip(_) | Self::Submission(_) | Self::ChainReader(_) | Self::Timeout { .. } | Self::Storage(_)
        )
    }
}

/// Publisher Result type
pub type PublisherResult<T> = Result<T, PublisherError>;

impl From<serde_json::Error> for PublisherError {
    fn from(e: serde_json::Error) -> Self {
        PublisherError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(PublisherError::Submission("503".into()).is_retriable());
        assert!(PublisherError::Timeout { operation: "submit", secs: 60 }.is_retriable());
        assert!(!PublisherError::Build("payload too large".into()).is_retriable());
        assert!(!PublisherError::Configuration("missing storage".into()).is_retriable());
    }

    #[test]
    fn test_timeout_display() {
        let err = PublisherError::Timeout { operation: "submit", secs: 60 };
        assert_eq!(err.to_string(), "submit timed out after 60s");
    }
}
