//! # Message Validator
//!
//! Structural checks on an inbound envelope, run before any engine call.

use std::fmt;

use super::profile::MissingFieldPolicy;
use crate::messaging::InboundEnvelope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingHeaders,
    MissingHeader(String),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingHeaders => {
                write!(f, "`headers` is not set in incoming message")
            }
            ValidationIssue::MissingHeader(name) => {
                write!(f, "`{name}` param is not set in incoming message")
            }
        }
    }
}

/// What the handler does after validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationDecision {
    Proceed,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn decision(&self, policy: MissingFieldPolicy) -> ValidationDecision {
        match (self.is_valid(), policy) {
            (true, _) | (false, MissingFieldPolicy::Continue) => ValidationDecision::Proceed,
            (false, MissingFieldPolicy::Abort) => ValidationDecision::Abort,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageValidator {
    required_headers: Vec<String>,
}

impl MessageValidator {
    pub fn new(required_headers: Vec<String>) -> Self {
        Self { required_headers }
    }

    /// Report a missing `headers` object and every absent required header
    pub fn validate(&self, envelope: &InboundEnvelope) -> ValidationResult {
        let mut issues = Vec::new();

        if envelope.headers().is_none() {
            issues.push(ValidationIssue::MissingHeaders);
        }

        issues.extend(
            self.required_headers
                .iter()
                .filter(|name| !envelope.has_header(name))
                .map(|name| ValidationIssue::MissingHeader(name.clone())),
        );

        ValidationResult { issues }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::profile::HandlerProfile;
    use crate::messaging::Delivery;
    use serde_json::json;

    fn envelope(body: serde_json::Value) -> InboundEnvelope {
        InboundEnvelope::from_delivery(&Delivery::new(1, serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn listener_validator() -> MessageValidator {
        MessageValidator::new(HandlerProfile::listener().required_headers)
    }

    #[test]
    fn test_complete_message_is_valid() {
        let result = listener_validator().validate(&envelope(json!({
            "headers": {"camundaListenerMessageName": "m", "camundaProcessInstanceId": "i"}
        })));
        assert!(result.is_valid());
        assert_eq!(
            result.decision(MissingFieldPolicy::Abort),
            ValidationDecision::Proceed
        );
    }

    #[test]
    fn test_missing_headers_reports_every_field() {
        let result = listener_validator().validate(&envelope(json!({"data": {}})));
        assert_eq!(
            result.issues,
            vec![
                ValidationIssue::MissingHeaders,
                ValidationIssue::MissingHeader("camundaListenerMessageName".to_string()),
                ValidationIssue::MissingHeader("camundaProcessInstanceId".to_string()),
            ]
        );
    }

    #[test]
    fn test_decision_follows_policy() {
        let result = listener_validator().validate(&envelope(json!({
            "headers": {"camundaListenerMessageName": "m"}
        })));
        assert_eq!(result.issues.len(), 1);
        assert_eq!(
            result.decision(MissingFieldPolicy::Abort),
            ValidationDecision::Abort
        );
        assert_eq!(
            result.decision(MissingFieldPolicy::Continue),
            ValidationDecision::Proceed
        );
    }

    #[test]
    fn test_task_profile_checks_task_headers() {
        let validator = MessageValidator::new(HandlerProfile::task().required_headers);
        let result = validator.validate(&envelope(json!({
            "headers": {"camundaWorkerId": "w-1"}
        })));
        assert_eq!(
            result.issues,
            vec![ValidationIssue::MissingHeader(
                "camundaExternalTaskId".to_string()
            )]
        );
        assert_eq!(
            result.issues[0].to_string(),
            "`camundaExternalTaskId` param is not set in incoming message"
        );
    }
}
