//! # Configuration
//!
//! Typed configuration for the broker connection, the consumption loop, the
//! process engine client, the handler profile and the event-log publisher.
//! Loading and layering live in [`loader`].

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::bridge::profile::{
    HandlerProfile, MergeStrategy, MissingFieldPolicy, ProfileKind,
};

/// Top-level bridge configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BridgeConfig {
    pub broker: BrokerConfig,
    pub consumer: ConsumerConfig,
    pub engine: EngineConfig,
    pub handler: HandlerConfig,
    pub logging: LoggingConfig,
}

/// RabbitMQ connection settings for the input queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    /// Input queue the bridge consumes from
    pub queue: String,
    /// Consumer tag; empty lets the broker generate one
    pub consumer_tag: String,
    pub heartbeat_seconds: u16,
    pub connection_timeout_seconds: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            user: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            queue: "bpm_listener".to_string(),
            consumer_tag: String::new(),
            heartbeat_seconds: 60,
            connection_timeout_seconds: 3,
        }
    }
}

impl BrokerConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }
}

/// Consumption loop timing and acknowledgement policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ConsumerConfig {
    /// Bounded wait between housekeeping cycles
    pub tick_interval_ms: u64,
    /// Sleep between a failure and the next connection attempt
    pub reconnect_delay_ms: u64,
    /// Acknowledge on receipt (at-most-once) instead of after handling
    pub ack_before_process: bool,
    /// Also reply to synchronous requests whose correlation succeeded
    pub reply_on_success: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            reconnect_delay_ms: 3000,
            ack_before_process: true,
            reply_on_success: false,
        }
    }
}

impl ConsumerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Process engine REST endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    /// Base URL of the REST API, e.g. `http://camunda:8080/engine-rest`
    pub base_url: String,
    pub login: String,
    pub password: String,
    pub request_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/engine-rest".to_string(),
            login: String::new(),
            password: String::new(),
            request_timeout_ms: 30_000,
        }
    }
}

/// Handler profile selection with optional per-field overrides
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct HandlerConfig {
    pub profile: ProfileKind,
    pub owner_tag: Option<String>,
    pub required_headers: Option<Vec<String>>,
    pub message_name_header: Option<String>,
    pub instance_id_header: Option<String>,
    pub merge_strategy: Option<MergeStrategy>,
    pub on_missing_field: MissingFieldPolicy,
}

impl HandlerConfig {
    /// Resolve the profile defaults and apply overrides
    pub fn profile(&self) -> HandlerProfile {
        let mut profile =
            HandlerProfile::for_kind(self.profile).with_missing_field_policy(self.on_missing_field);

        if let Some(owner_tag) = &self.owner_tag {
            profile.owner_tag = owner_tag.clone();
        }
        if let Some(required_headers) = &self.required_headers {
            profile.required_headers = required_headers.clone();
        }
        if let Some(header) = &self.message_name_header {
            profile.message_name_header = header.clone();
        }
        if let Some(header) = &self.instance_id_header {
            profile.instance_id_header = header.clone();
        }
        if let Some(strategy) = self.merge_strategy {
            profile.merge_strategy = strategy;
        }

        profile
    }
}

/// Event-log queue publisher; shares host and port with the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LoggingConfig {
    pub enabled: bool,
    pub queue: String,
    pub vhost: String,
    /// Falls back to the broker user when unset
    pub user: Option<String>,
    /// Falls back to the broker password when unset
    pub password: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue: "bpm_logs".to_string(),
            vhost: "/".to_string(),
            user: None,
            password: None,
        }
    }
}

impl LoggingConfig {
    /// Broker settings for the log vhost
    pub fn broker_config(&self, broker: &BrokerConfig) -> BrokerConfig {
        BrokerConfig {
            user: self.user.clone().unwrap_or_else(|| broker.user.clone()),
            password: self
                .password
                .clone()
                .unwrap_or_else(|| broker.password.clone()),
            vhost: self.vhost.clone(),
            queue: self.queue.clone(),
            ..broker.clone()
        }
    }
}

impl BridgeConfig {
    /// Check cross-field constraints after loading
    pub fn validate(&self) -> ConfigResult<()> {
        if self.broker.host.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("host", "broker"));
        }
        if self.broker.port == 0 {
            return Err(ConfigurationError::invalid_value(
                "broker.port",
                "0",
                "port must be greater than zero",
            ));
        }
        if self.broker.queue.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("queue", "broker"));
        }
        if self.consumer.tick_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "consumer.tick_interval_ms",
                "0",
                "tick interval must be at least 1ms",
            ));
        }
        if self.engine.request_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.request_timeout_ms",
                "0",
                "request timeout must be at least 1ms",
            ));
        }
        if let Err(e) = reqwest::Url::parse(&self.engine.base_url) {
            return Err(ConfigurationError::invalid_value(
                "engine.base_url",
                self.engine.base_url.clone(),
                e.to_string(),
            ));
        }
        if self.logging.enabled && self.logging.queue.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "queue",
                "logging (enabled)",
            ));
        }

        let profile = self.handler.profile();
        if profile.message_name_header.is_empty() || profile.instance_id_header.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "handler",
                format!(
                    "{}/{}",
                    profile.message_name_header, profile.instance_id_header
                ),
                "message name and instance id headers must be named",
            ));
        }
        if let Some(empty) = profile.required_headers.iter().find(|h| h.trim().is_empty()) {
            return Err(ConfigurationError::invalid_value(
                "handler.required_headers",
                empty.clone(),
                "header names cannot be empty",
            ));
        }

        Ok(())
    }
}
