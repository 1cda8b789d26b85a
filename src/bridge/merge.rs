//! # Variable Merge Engine
//!
//! Reconciles the engine-held `message` variable of a process instance with
//! the inbound event so earlier process data survives while the new event
//! wins on key collisions.
//!
//! ## Merge rule
//!
//! - existing `message` decodes to an object: `data.parameters` and `headers`
//!   become shallow key-unions with the inbound `data` / `headers` (inbound
//!   wins); every other field of the existing document is kept
//! - otherwise the inbound payload is forwarded verbatim
//!
//! Keys keep first-insertion order, so equal inputs always encode to the same
//! bytes.

use serde_json::{Map, Value};
use std::sync::Arc;

use super::profile::MergeStrategy;
use crate::engine::types::{
    CORRELATION_ID_VARIABLE, MESSAGE_VARIABLE, REPLY_TO_VARIABLE,
};
use crate::engine::{ProcessEngine, ProcessVariables, TypedValue, UpdatedVariables};
use crate::event_log::{EventLogger, LogDirection};
use crate::messaging::InboundEnvelope;

pub struct VariableMerger {
    engine: Arc<dyn ProcessEngine>,
    logger: EventLogger,
    strategy: MergeStrategy,
}

impl VariableMerger {
    pub fn new(engine: Arc<dyn ProcessEngine>, logger: EventLogger, strategy: MergeStrategy) -> Self {
        Self {
            engine,
            logger,
            strategy,
        }
    }

    /// Fetch the instance's variables with value deserialization disabled
    ///
    /// Any failure is reported and read as "no existing variables".
    pub async fn fetch_process_variables(&self, process_instance_id: &str) -> Option<ProcessVariables> {
        let reason = match self
            .engine
            .get_variable_list(process_instance_id, false)
            .await
        {
            Ok(response) if response.is_ok() => {
                match serde_json::from_value::<ProcessVariables>(response.body) {
                    Ok(variables) => return Some(variables),
                    Err(e) => format!("unexpected variables payload: {e}"),
                }
            }
            Ok(response) => response.error_message(),
            Err(e) => e.to_string(),
        };

        self.logger
            .error(
                LogDirection::Input,
                format!(
                    "Process variables from process instance <{process_instance_id}> not received, because `{reason}`"
                ),
            )
            .await;
        None
    }

    /// Fetch (per strategy), merge and attach RPC correlation variables
    pub async fn updated_variables(
        &self,
        process_instance_id: &str,
        envelope: &InboundEnvelope,
    ) -> UpdatedVariables {
        let existing = match self.strategy {
            MergeStrategy::MergeExisting => self.fetch_process_variables(process_instance_id).await,
            MergeStrategy::Replace => None,
        };

        with_rpc_correlation(merge(existing.as_ref(), envelope), envelope)
    }
}

/// Merge engine state with an inbound envelope into the outbound `message` variable
pub fn merge(existing: Option<&ProcessVariables>, inbound: &InboundEnvelope) -> UpdatedVariables {
    let document = match existing.and_then(ProcessVariables::message_document) {
        Some(mut document) => {
            merge_parameters(&mut document, inbound.data());
            union_into(object_entry(&mut document, "headers"), inbound.headers());
            Value::Object(document)
        }
        None => inbound.payload().clone(),
    };

    let mut updated = UpdatedVariables::default();
    updated.insert(MESSAGE_VARIABLE, TypedValue::json(document.to_string()));
    updated
}

/// Add the RPC correlation pair for synchronous requests
pub fn with_rpc_correlation(
    mut updated: UpdatedVariables,
    envelope: &InboundEnvelope,
) -> UpdatedVariables {
    if let Some(rpc) = envelope.rpc() {
        updated.insert(
            CORRELATION_ID_VARIABLE,
            TypedValue::string(rpc.correlation_id.clone()),
        );
        updated.insert(REPLY_TO_VARIABLE, TypedValue::string(rpc.reply_to.clone()));
    }
    updated
}

fn merge_parameters(document: &mut Map<String, Value>, inbound_data: &Map<String, Value>) {
    let data = object_entry(document, "data");
    union_into(object_entry(data, "parameters"), Some(inbound_data));
}

/// `map[key]` as an object, replacing a missing or non-object value
fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot was just made an object"),
    }
}

fn union_into(target: &mut Map<String, Value>, overrides: Option<&Map<String, Value>>) {
    for (key, value) in overrides.into_iter().flatten() {
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::Delivery;
    use serde_json::json;

    fn envelope(body: Value) -> InboundEnvelope {
        InboundEnvelope::from_delivery(&Delivery::new(1, serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn existing(message: Value) -> ProcessVariables {
        let mut vars = ProcessVariables::default();
        vars.0
            .insert(MESSAGE_VARIABLE.to_string(), TypedValue::json(message.to_string()));
        vars
    }

    fn decoded(updated: &UpdatedVariables) -> Value {
        serde_json::from_str(updated.message_value().unwrap()).unwrap()
    }

    #[test]
    fn test_merge_with_existing_variables() {
        let inbound = envelope(json!({
            "headers": {"name": "listener-otp", "instanceId": "abc"},
            "data": {"otp": "123"}
        }));
        let vars = existing(json!({"data": {"parameters": {"x": 1}}, "headers": {"y": 2}}));

        let updated = merge(Some(&vars), &inbound);
        let message = updated.get(MESSAGE_VARIABLE).unwrap();
        assert_eq!(message.value_type.as_deref(), Some("Json"));
        assert_eq!(
            updated.message_value().unwrap(),
            r#"{"data":{"parameters":{"x":1,"otp":"123"}},"headers":{"y":2,"name":"listener-otp","instanceId":"abc"}}"#
        );
    }

    #[test]
    fn test_inbound_wins_on_conflict_and_other_fields_survive() {
        let inbound = envelope(json!({"headers": {"h": "new"}, "data": {"x": 2}}));
        let vars = existing(json!({
            "data": {"parameters": {"x": 1, "keep": true}, "source": "crm"},
            "headers": {"h": "old"},
            "time": 42
        }));

        let merged = decoded(&merge(Some(&vars), &inbound));
        assert_eq!(merged["data"]["parameters"], json!({"x": 2, "keep": true}));
        assert_eq!(merged["data"]["source"], "crm");
        assert_eq!(merged["headers"], json!({"h": "new"}));
        assert_eq!(merged["time"], 42);
    }

    #[test]
    fn test_without_existing_variables_forwards_inbound() {
        let body = json!({
            "headers": {"camundaProcessInstanceId": "abc"},
            "data": {"otp": "1"},
            "time": 1_700_000_000
        });
        let updated = merge(None, &envelope(body.clone()));
        assert_eq!(decoded(&updated), body);
    }

    #[test]
    fn test_undecodable_existing_message_is_treated_as_absent() {
        let mut vars = ProcessVariables::default();
        vars.0.insert(
            MESSAGE_VARIABLE.to_string(),
            TypedValue::json("not json".to_string()),
        );
        let body = json!({"headers": {}, "data": {"a": 1}});
        assert_eq!(decoded(&merge(Some(&vars), &envelope(body.clone()))), body);

        // variables without a `message` entry behave the same way
        let empty = ProcessVariables::default();
        assert_eq!(decoded(&merge(Some(&empty), &envelope(body.clone()))), body);
    }

    #[test]
    fn test_existing_message_without_parameters_or_headers() {
        let vars = existing(json!({"data": "scalar"}));
        let inbound = envelope(json!({"headers": {"k": "v"}, "data": {"a": 1}}));

        let merged = decoded(&merge(Some(&vars), &inbound));
        assert_eq!(merged["data"], json!({"parameters": {"a": 1}}));
        assert_eq!(merged["headers"], json!({"k": "v"}));
    }

    #[test]
    fn test_missing_inbound_headers_keep_existing() {
        let vars = existing(json!({"data": {"parameters": {}}, "headers": {"y": 2}}));
        let inbound = envelope(json!({"data": {"a": 1}}));
        let merged = decoded(&merge(Some(&vars), &inbound));
        assert_eq!(merged["headers"], json!({"y": 2}));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let inbound = envelope(json!({"headers": {"b": "1", "a": "2"}, "data": {"z": 1, "m": 2}}));
        let vars = existing(json!({"data": {"parameters": {"q": 0}}, "headers": {"c": 3}}));
        let first = merge(Some(&vars), &inbound);
        let second = merge(Some(&vars), &inbound);
        assert_eq!(first.message_value(), second.message_value());
    }

    #[test]
    fn test_rpc_correlation_variables() {
        let d = Delivery::new(1, br#"{"headers":{}}"#.to_vec()).with_rpc("c1", "q1");
        let inbound = InboundEnvelope::from_delivery(&d).unwrap();

        let updated = with_rpc_correlation(merge(None, &inbound), &inbound);
        assert_eq!(updated.get(CORRELATION_ID_VARIABLE).unwrap().as_str(), Some("c1"));
        assert_eq!(updated.get(REPLY_TO_VARIABLE).unwrap().as_str(), Some("q1"));
        assert_eq!(
            updated.get(REPLY_TO_VARIABLE).unwrap().value_type.as_deref(),
            Some("String")
        );

        let plain = envelope(json!({"headers": {}}));
        let updated = with_rpc_correlation(merge(None, &plain), &plain);
        assert!(updated.get(CORRELATION_ID_VARIABLE).is_none());
        assert_eq!(updated.0.len(), 1);
    }
}
