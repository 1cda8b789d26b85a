//! # Camunda REST Client
//!
//! HTTP client for the process engine's variable and message endpoints.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::types::{CorrelationRequest, EngineResponse};
use super::{EngineError, EngineResult, ProcessEngine};
use crate::config::EngineConfig;

#[derive(Clone)]
pub struct CamundaClient {
    client: Client,
    base_url: Url,
    login: String,
    password: String,
}

impl std::fmt::Debug for CamundaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CamundaClient")
            .field("base_url", &self.base_url.as_str())
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

impl CamundaClient {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| EngineError::Configuration(format!("Invalid base URL: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(format!("bpm-bridge/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                EngineError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        info!(
            base_url = %base_url,
            timeout_ms = config.request_timeout_ms,
            auth_enabled = !config.login.is_empty(),
            "Created process engine client"
        );

        Ok(Self {
            client,
            base_url,
            login: config.login.clone(),
            password: config.password.clone(),
        })
    }

    /// Append `segments` to the base path, each percent-encoded as one segment
    fn endpoint(&self, segments: &[&str]) -> EngineResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                EngineError::Configuration(format!("Base URL cannot carry a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.login.is_empty() {
            request
        } else {
            request.basic_auth(&self.login, Some(&self.password))
        }
    }

    async fn into_engine_response(
        endpoint: &Url,
        response: reqwest::Response,
    ) -> EngineResult<EngineResponse> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| EngineError::transport(endpoint.as_str(), e.to_string()))?;

        // Empty or non-JSON bodies are kept as Null; callers only read `message`
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::Null)
        };

        Ok(EngineResponse::new(status, body))
    }
}

#[async_trait]
impl ProcessEngine for CamundaClient {
    async fn get_variable_list(
        &self,
        process_instance_id: &str,
        deserialize_values: bool,
    ) -> EngineResult<EngineResponse> {
        let mut url = self.endpoint(&["process-instance", process_instance_id, "variables"])?;
        url.query_pairs_mut()
            .append_pair("deserializeValues", &deserialize_values.to_string());

        debug!(url = %url, "Fetching process variables");

        let response = self
            .authorize(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|e| EngineError::transport(url.as_str(), e.to_string()))?;

        Self::into_engine_response(&url, response).await
    }

    async fn correlate(&self, request: &CorrelationRequest) -> EngineResult<EngineResponse> {
        let url = self.endpoint(&["message"])?;

        debug!(
            url = %url,
            message_name = %request.message_name,
            process_instance_id = %request.process_instance_id,
            "Correlating message"
        );

        let response = self
            .authorize(self.client.post(url.clone()).json(request))
            .send()
            .await
            .map_err(|e| EngineError::transport(url.as_str(), e.to_string()))?;

        Self::into_engine_response(&url, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = CamundaClient::new(&EngineConfig {
            base_url: "http://camunda:8080/engine-rest".to_string(),
            ..EngineConfig::default()
        })
        .unwrap();

        let url = client
            .endpoint(&["process-instance", "abc", "variables"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://camunda:8080/engine-rest/process-instance/abc/variables"
        );
    }

    #[test]
    fn test_endpoint_encodes_ids_as_single_segment() {
        let client = CamundaClient::new(&EngineConfig {
            base_url: "http://camunda:8080/engine-rest/".to_string(),
            ..EngineConfig::default()
        })
        .unwrap();

        let url = client
            .endpoint(&["process-instance", "a/../b?x#y", "variables"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://camunda:8080/engine-rest/process-instance/a%2F..%2Fb%3Fx%23y/variables"
        );
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_base_url_without_path() {
        let client = CamundaClient::new(&EngineConfig {
            base_url: "http://camunda:8080".to_string(),
            ..EngineConfig::default()
        })
        .unwrap();

        let url = client.endpoint(&["message"]).unwrap();
        assert_eq!(url.as_str(), "http://camunda:8080/message");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = CamundaClient::new(&EngineConfig {
            base_url: "::not-a-url".to_string(),
            ..EngineConfig::default()
        });
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }
}
