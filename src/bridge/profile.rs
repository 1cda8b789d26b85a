//! # Handler Profiles
//!
//! A profile is the strategy object selected at startup that decides which
//! headers a deployment requires, where the message name and process
//! instance id live, how engine state is merged, and what happens when a
//! required field is missing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying the engine message name in listener deployments
pub const LISTENER_MESSAGE_NAME_HEADER: &str = "camundaListenerMessageName";
/// Header carrying the engine process instance id
pub const PROCESS_INSTANCE_ID_HEADER: &str = "camundaProcessInstanceId";
/// Header carrying the external task worker id in task deployments
pub const WORKER_ID_HEADER: &str = "camundaWorkerId";
/// Header carrying the external task id in task deployments
pub const EXTERNAL_TASK_ID_HEADER: &str = "camundaExternalTaskId";

/// Deployment flavour of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    #[default]
    Listener,
    Task,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileKind::Listener => write!(f, "listener"),
            ProfileKind::Task => write!(f, "task"),
        }
    }
}

/// How engine-held variables are combined with the inbound payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Union existing `data.parameters` and `headers` with the inbound ones
    #[default]
    MergeExisting,
    /// Ignore engine state and send the inbound payload as-is
    Replace,
}

/// What to do with a message whose required headers are missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// Report and stop processing the message
    #[default]
    Abort,
    /// Report and keep going with absent fields read as empty strings
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerProfile {
    pub kind: ProfileKind,
    /// Owner tag attached to every event-log entry
    pub owner_tag: String,
    pub required_headers: Vec<String>,
    pub message_name_header: String,
    pub instance_id_header: String,
    pub merge_strategy: MergeStrategy,
    pub on_missing_field: MissingFieldPolicy,
}

impl HandlerProfile {
    /// Listener flavour: correlates engine messages by name and instance id
    pub fn listener() -> Self {
        Self {
            kind: ProfileKind::Listener,
            owner_tag: "bpm-listener".to_string(),
            required_headers: vec![
                LISTENER_MESSAGE_NAME_HEADER.to_string(),
                PROCESS_INSTANCE_ID_HEADER.to_string(),
            ],
            message_name_header: LISTENER_MESSAGE_NAME_HEADER.to_string(),
            instance_id_header: PROCESS_INSTANCE_ID_HEADER.to_string(),
            merge_strategy: MergeStrategy::MergeExisting,
            on_missing_field: MissingFieldPolicy::Abort,
        }
    }

    /// Task flavour: requires the external task identity headers on top of
    /// the correlation headers
    pub fn task() -> Self {
        Self {
            kind: ProfileKind::Task,
            owner_tag: "bpm-task".to_string(),
            required_headers: vec![
                WORKER_ID_HEADER.to_string(),
                EXTERNAL_TASK_ID_HEADER.to_string(),
                LISTENER_MESSAGE_NAME_HEADER.to_string(),
                PROCESS_INSTANCE_ID_HEADER.to_string(),
            ],
            message_name_header: LISTENER_MESSAGE_NAME_HEADER.to_string(),
            instance_id_header: PROCESS_INSTANCE_ID_HEADER.to_string(),
            merge_strategy: MergeStrategy::MergeExisting,
            on_missing_field: MissingFieldPolicy::Abort,
        }
    }

    pub fn for_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Listener => Self::listener(),
            ProfileKind::Task => Self::task(),
        }
    }

    pub fn with_missing_field_policy(mut self, policy: MissingFieldPolicy) -> Self {
        self.on_missing_field = policy;
        self
    }

    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    /// Required headers plus the two headers correlation reads, in order and
    /// without duplicates
    pub fn checked_headers(&self) -> Vec<String> {
        let mut headers = self.required_headers.clone();
        for header in [&self.message_name_header, &self.instance_id_header] {
            if !headers.contains(header) {
                headers.push(header.clone());
            }
        }
        headers
    }
}

impl Default for HandlerProfile {
    fn default() -> Self {
        Self::listener()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_profile_requirements() {
        let profile = HandlerProfile::listener();
        assert_eq!(
            profile.required_headers,
            vec![LISTENER_MESSAGE_NAME_HEADER, PROCESS_INSTANCE_ID_HEADER]
        );
        assert_eq!(profile.owner_tag, "bpm-listener");
        assert_eq!(profile.on_missing_field, MissingFieldPolicy::Abort);
    }

    #[test]
    fn test_task_profile_requirements() {
        let profile = HandlerProfile::for_kind(ProfileKind::Task);
        assert_eq!(
            profile.required_headers,
            vec![
                WORKER_ID_HEADER,
                EXTERNAL_TASK_ID_HEADER,
                LISTENER_MESSAGE_NAME_HEADER,
                PROCESS_INSTANCE_ID_HEADER
            ]
        );
        assert_eq!(profile.kind, ProfileKind::Task);
        assert_eq!(profile.checked_headers(), profile.required_headers);
    }

    #[test]
    fn test_checked_headers_include_correlation_headers() {
        let mut profile = HandlerProfile::task();
        profile.required_headers = vec![WORKER_ID_HEADER.to_string()];
        profile.instance_id_header = "instanceId".to_string();

        assert_eq!(
            profile.checked_headers(),
            vec![WORKER_ID_HEADER, LISTENER_MESSAGE_NAME_HEADER, "instanceId"]
        );
        assert_eq!(
            HandlerProfile::listener().checked_headers(),
            vec![LISTENER_MESSAGE_NAME_HEADER, PROCESS_INSTANCE_ID_HEADER]
        );
    }

    #[test]
    fn test_policy_deserialization() {
        let policy: MissingFieldPolicy = serde_json::from_str("\"continue\"").unwrap();
        assert_eq!(policy, MissingFieldPolicy::Continue);
        let strategy: MergeStrategy = serde_json::from_str("\"merge_existing\"").unwrap();
        assert_eq!(strategy, MergeStrategy::MergeExisting);
    }
}
