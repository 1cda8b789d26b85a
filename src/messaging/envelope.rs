//! # Inbound Envelopes
//!
//! A [`Delivery`] is what the broker hands the loop; an [`InboundEnvelope`]
//! is its decoded, immutable body plus the RPC metadata needed to answer a
//! synchronous request.

use serde_json::{Map, Value};

use super::errors::{MessagingError, MessagingResult};

/// Broker-agnostic view of one delivered message
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    /// `correlation_id` message property
    pub correlation_id: Option<String>,
    /// `reply_to` message property
    pub reply_to: Option<String>,
    pub redelivered: bool,
}

impl Delivery {
    pub fn new(delivery_tag: u64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery_tag,
            body: body.into(),
            correlation_id: None,
            reply_to: None,
            redelivered: false,
        }
    }

    pub fn with_rpc(mut self, correlation_id: impl Into<String>, reply_to: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Correlation pair of an RPC-over-queue request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcMetadata {
    pub correlation_id: String,
    pub reply_to: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEnvelope {
    headers: Option<Map<String, Value>>,
    data: Map<String, Value>,
    time: Option<i64>,
    rpc: Option<RpcMetadata>,
    payload: Value,
}

impl InboundEnvelope {
    /// Decode a delivery body; the body must be a JSON object
    ///
    /// RPC metadata comes from the message properties, falling back to the
    /// body's `correlation_id` / `reply_to` fields. Both halves must be present
    /// and non-empty.
    pub fn from_delivery(delivery: &Delivery) -> MessagingResult<Self> {
        let payload: Value = serde_json::from_slice(&delivery.body)?;
        let Value::Object(body) = &payload else {
            return Err(MessagingError::message_deserialization(
                "message body is not a JSON object",
            ));
        };

        let headers = match body.get("headers") {
            Some(Value::Object(headers)) => Some(headers.clone()),
            _ => None,
        };
        let data = match body.get("data") {
            Some(Value::Object(data)) => data.clone(),
            _ => Map::new(),
        };
        let time = body.get("time").and_then(Value::as_i64);

        let body_field = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_string);
        let correlation_id = non_empty(delivery.correlation_id.clone())
            .or_else(|| non_empty(body_field("correlation_id")));
        let reply_to =
            non_empty(delivery.reply_to.clone()).or_else(|| non_empty(body_field("reply_to")));

        let rpc = match (correlation_id, reply_to) {
            (Some(correlation_id), Some(reply_to)) => Some(RpcMetadata {
                correlation_id,
                reply_to,
            }),
            _ => None,
        };

        Ok(Self {
            headers,
            data,
            time,
            rpc,
            payload,
        })
    }

    pub fn headers(&self) -> Option<&Map<String, Value>> {
        self.headers.as_ref()
    }

    /// Header value as text; non-string scalars are rendered as JSON
    pub fn header(&self, name: &str) -> Option<String> {
        match self.headers.as_ref()?.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn time(&self) -> Option<i64> {
        self.time
    }

    pub fn rpc(&self) -> Option<&RpcMetadata> {
        self.rpc.as_ref()
    }

    pub fn is_synchronous(&self) -> bool {
        self.rpc.is_some()
    }

    /// The decoded body exactly as received
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delivery(body: Value) -> Delivery {
        Delivery::new(1, serde_json::to_vec(&body).unwrap())
    }

    #[test]
    fn test_decodes_listener_message() {
        let env = InboundEnvelope::from_delivery(&delivery(json!({
            "headers": {"camundaListenerMessageName": "listener-otp", "camundaProcessInstanceId": "abc"},
            "data": {"otp": "68853"},
            "time": 1_700_000_000
        })))
        .unwrap();

        assert_eq!(env.header("camundaListenerMessageName").as_deref(), Some("listener-otp"));
        assert_eq!(env.data()["otp"], "68853");
        assert_eq!(env.time(), Some(1_700_000_000));
        assert!(!env.is_synchronous());
    }

    #[test]
    fn test_rpc_metadata_prefers_properties() {
        let d = delivery(json!({"headers": {}, "correlation_id": "body-id", "reply_to": "body-q"}))
            .with_rpc("prop-id", "prop-q");
        let env = InboundEnvelope::from_delivery(&d).unwrap();
        let rpc = env.rpc().unwrap();
        assert_eq!(rpc.correlation_id, "prop-id");
        assert_eq!(rpc.reply_to, "prop-q");
    }

    #[test]
    fn test_rpc_metadata_from_body_fields() {
        let env = InboundEnvelope::from_delivery(&delivery(
            json!({"headers": {}, "correlation_id": "c1", "reply_to": "q1"}),
        ))
        .unwrap();
        assert_eq!(
            env.rpc(),
            Some(&RpcMetadata {
                correlation_id: "c1".to_string(),
                reply_to: "q1".to_string()
            })
        );
    }

    #[test]
    fn test_rpc_requires_both_halves() {
        let mut d = delivery(json!({"headers": {}}));
        d.correlation_id = Some("c1".to_string());
        assert!(InboundEnvelope::from_delivery(&d).unwrap().rpc().is_none());

        let d = delivery(json!({"headers": {}})).with_rpc("c1", "");
        assert!(InboundEnvelope::from_delivery(&d).unwrap().rpc().is_none());
    }

    #[test]
    fn test_missing_headers_and_data() {
        let env = InboundEnvelope::from_delivery(&delivery(json!({"time": 5}))).unwrap();
        assert!(env.headers().is_none());
        assert!(env.data().is_empty());
        assert!(!env.has_header("anything"));
    }

    #[test]
    fn test_rejects_non_object_and_garbage() {
        assert!(InboundEnvelope::from_delivery(&delivery(json!([1, 2]))).is_err());
        let garbage = Delivery::new(2, b"not json".to_vec());
        assert!(matches!(
            InboundEnvelope::from_delivery(&garbage),
            Err(MessagingError::MessageDeserialization { .. })
        ));
    }
}
