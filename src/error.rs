//! Error types for the bridge.
//!

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::engine::EngineError;
use crate::messaging::MessagingError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
    #[error("Process engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Whether the consumption loop must tear down the broker session.
    ///
    /// Everything except validation problems is handled as a reconnect.
    pub fn requires_reconnect(&self) -> bool {
        !matches!(self, BridgeError::ValidationError(_))
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(error: serde_json::Error) -> Self {
        BridgeError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messaging_errors_require_reconnect() {
        let err: BridgeError = MessagingError::connection("refused").into();
        assert!(err.requires_reconnect());
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_validation_errors_do_not_require_reconnect() {
        let err = BridgeError::ValidationError("missing header".to_string());
        assert!(!err.requires_reconnect());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        let err: BridgeError = json_err.into();
        assert!(matches!(err, BridgeError::ValidationError(_)));
    }
}
