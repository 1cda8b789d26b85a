//! # Messaging Error Types
//!
//! Structured error handling for the broker layer using thiserror
//! instead of `Box<dyn Error>` patterns.

use thiserror::Error;

/// Broker-side error types
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Channel setup failed: {operation}: {message}")]
    Channel { operation: String, message: String },

    #[error("Consumer error on queue {queue_name}: {message}")]
    Consume { queue_name: String, message: String },

    #[error("Acknowledgement failed for delivery {delivery_tag}: {message}")]
    Ack { delivery_tag: u64, message: String },

    #[error("Publish to {routing_key} failed: {message}")]
    Publish { routing_key: String, message: String },

    #[error("Operation {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },
}

impl MessagingError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a channel setup error
    pub fn channel(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Channel {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a consumer error
    pub fn consume(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consume {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    /// Create an acknowledgement error
    pub fn ack(delivery_tag: u64, message: impl Into<String>) -> Self {
        Self::Ack {
            delivery_tag,
            message: message.into(),
        }
    }

    /// Create a publish error
    pub fn publish(routing_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            routing_key: routing_key.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a message serialization error
    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    /// Create a message deserialization error
    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            MessagingError::message_deserialization(err.to_string())
        } else {
            MessagingError::message_serialization(err.to_string())
        }
    }
}

/// Conversion from lapin::Error; anything not mapped more precisely at the call
/// site is a connection-level failure
impl From<lapin::Error> for MessagingError {
    fn from(err: lapin::Error) -> Self {
        MessagingError::connection(err.to_string())
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
