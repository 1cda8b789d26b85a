//! Wire types of the process engine REST contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the process variable holding the serialised event message
pub const MESSAGE_VARIABLE: &str = "message";
/// Process variable carrying the RPC correlation id of a synchronous request
pub const CORRELATION_ID_VARIABLE: &str = "rabbitCorrelationId";
/// Process variable carrying the reply queue of a synchronous request
pub const REPLY_TO_VARIABLE: &str = "rabbitCorrelationReplyTo";

/// Engine type tag for JSON-typed variables
pub const JSON_TYPE: &str = "Json";
/// Engine type tag for string variables
pub const STRING_TYPE: &str = "String";

/// Fallback reason when the engine gives no usable `message`
pub const REQUEST_ERROR_MESSAGE: &str = "Request error";

/// A single engine variable as returned with `deserializeValues=false`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedValue {
    pub value: Value,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_info: Option<Value>,
}

impl TypedValue {
    pub fn json(encoded: String) -> Self {
        Self {
            value: Value::String(encoded),
            value_type: Some(JSON_TYPE.to_string()),
            value_info: None,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value: Value::String(value.into()),
            value_type: Some(STRING_TYPE.to_string()),
            value_info: None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// Snapshot of a process instance's variables, fetched fresh per message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessVariables(pub BTreeMap<String, TypedValue>);

impl ProcessVariables {
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.0.get(name)
    }

    /// Decoded document of the `message` variable, if it holds a JSON object
    ///
    /// The engine returns JSON variables as an encoded string when values are
    /// not deserialized; an already-structured object is accepted as well.
    pub fn message_document(&self) -> Option<serde_json::Map<String, Value>> {
        let message = self.get(MESSAGE_VARIABLE)?;
        let decoded = match &message.value {
            Value::String(encoded) => serde_json::from_str::<Value>(encoded).ok()?,
            other => other.clone(),
        };
        match decoded {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

/// Outbound variable set submitted with a correlation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdatedVariables(pub BTreeMap<String, TypedValue>);

impl UpdatedVariables {
    pub fn insert(&mut self, name: impl Into<String>, value: TypedValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.0.get(name)
    }

    /// Encoded merged payload carried by the `message` variable
    pub fn message_value(&self) -> Option<&str> {
        self.get(MESSAGE_VARIABLE).and_then(TypedValue::as_str)
    }
}

/// Body of `POST /message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationRequest {
    pub message_name: String,
    pub process_instance_id: String,
    pub process_variables: UpdatedVariables,
    pub result_enabled: bool,
}

/// Raw status and body of an engine call; only these two are interpreted
#[derive(Debug, Clone, PartialEq)]
pub struct EngineResponse {
    pub status: u16,
    pub body: Value,
}

impl EngineResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// The body's `message` field, or the generic fallback
    pub fn error_message(&self) -> String {
        self.body
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(REQUEST_ERROR_MESSAGE)
            .to_string()
    }
}

/// Result of a correlation attempt as seen by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelationOutcome {
    /// Engine answered 200; carries the correlation result body
    Success(Value),
    Failure(String),
}

impl CorrelationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CorrelationOutcome::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_process_variables_from_engine_body() {
        let body = json!({
            "message": {
                "type": "Json",
                "value": "{\"data\":{\"parameters\":{\"x\":1}},\"headers\":{\"y\":2}}",
                "valueInfo": {}
            },
            "amount": {"type": "Integer", "value": 10, "valueInfo": {}}
        });

        let variables: ProcessVariables = serde_json::from_value(body).unwrap();
        let document = variables.message_document().expect("message document");
        assert_eq!(document["data"]["parameters"]["x"], 1);
        assert_eq!(document["headers"]["y"], 2);
        assert_eq!(variables.get("amount").unwrap().value, 10);
    }

    #[test]
    fn test_message_document_rejects_non_object() {
        let mut variables = ProcessVariables::default();
        variables
            .0
            .insert(MESSAGE_VARIABLE.to_string(), TypedValue::json("[1,2]".to_string()));
        assert!(variables.message_document().is_none());

        variables
            .0
            .insert(MESSAGE_VARIABLE.to_string(), TypedValue::json("{oops".to_string()));
        assert!(variables.message_document().is_none());
    }

    #[test]
    fn test_correlation_request_wire_shape() {
        let mut vars = UpdatedVariables::default();
        vars.insert(MESSAGE_VARIABLE, TypedValue::json("{}".to_string()));
        let request = CorrelationRequest {
            message_name: "listener-otp".to_string(),
            process_instance_id: "abc".to_string(),
            process_variables: vars,
            result_enabled: true,
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(
            wire,
            json!({
                "messageName": "listener-otp",
                "processInstanceId": "abc",
                "processVariables": {"message": {"value": "{}", "type": "Json"}},
                "resultEnabled": true
            })
        );
    }

    #[test]
    fn test_error_message_fallback() {
        let response = EngineResponse::new(500, json!({"type": "RestException"}));
        assert_eq!(response.error_message(), REQUEST_ERROR_MESSAGE);

        let response = EngineResponse::new(400, json!({"message": "No process definition"}));
        assert_eq!(response.error_message(), "No process definition");

        let response = EngineResponse::new(502, Value::Null);
        assert_eq!(response.error_message(), REQUEST_ERROR_MESSAGE);
    }
}
