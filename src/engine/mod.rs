//! # Process Engine
//!
//! The narrow contract the bridge needs from the external process engine:
//! read a process instance's variables and correlate a message with it.
//! [`CamundaClient`] implements it against the Camunda REST API.

pub mod client;
pub mod types;

pub use client::CamundaClient;
pub use types::{
    CorrelationOutcome, CorrelationRequest, EngineResponse, ProcessVariables, TypedValue,
    UpdatedVariables,
};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Invalid engine configuration: {0}")]
    Configuration(String),
}

impl EngineError {
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Request/response contract of the process engine
///
/// Implementations return the raw status and body for every HTTP answer and
/// reserve `Err` for calls that never produced one.
#[async_trait]
pub trait ProcessEngine: Send + Sync {
    /// `GET /process-instance/{id}/variables`
    async fn get_variable_list(
        &self,
        process_instance_id: &str,
        deserialize_values: bool,
    ) -> EngineResult<EngineResponse>;

    /// `POST /message`
    async fn correlate(&self, request: &CorrelationRequest) -> EngineResult<EngineResponse>;
}
