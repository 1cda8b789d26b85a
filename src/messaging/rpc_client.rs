//! # RPC Request Client
//!
//! The sending side of the RPC-over-queue protocol: publish a request with a
//! fresh correlation id and an exclusive reply queue, then wait for the
//! matching answer. The bridge answers failures only (unless configured
//! otherwise), so silence until the deadline is a normal result.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::connection::{AmqpSession, BrokerSession};
use super::errors::MessagingResult;
use crate::bridge::profile::{LISTENER_MESSAGE_NAME_HEADER, PROCESS_INSTANCE_ID_HEADER};
use crate::config::BrokerConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum RpcReply {
    Received(Value),
    /// Nothing arrived before the deadline
    NoReply,
}

/// Body of a listener event for `message_name` on `process_instance_id`
pub fn listener_request(
    message_name: &str,
    process_instance_id: &str,
    data: Map<String, Value>,
) -> Value {
    json!({
        "headers": {
            LISTENER_MESSAGE_NAME_HEADER: message_name,
            PROCESS_INSTANCE_ID_HEADER: process_instance_id,
        },
        "data": data,
        "time": Utc::now().timestamp(),
    })
}

pub struct RpcClient {
    session: AmqpSession,
    reply_queue: String,
}

impl RpcClient {
    /// Connect and start consuming from a new exclusive reply queue
    pub async fn connect(config: &BrokerConfig) -> MessagingResult<Self> {
        let mut session = AmqpSession::open(config, "bpm-request").await?;
        let reply_queue = session.declare_reply_queue().await?;
        session.start_consuming(&reply_queue, "").await?;
        debug!(reply_queue = %reply_queue, "Reply queue ready");
        Ok(Self {
            session,
            reply_queue,
        })
    }

    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// Publish `body` to `queue` and wait up to `timeout` for its reply
    pub async fn call(
        &mut self,
        queue: &str,
        body: &Value,
        timeout: Duration,
    ) -> MessagingResult<RpcReply> {
        let correlation_id = Uuid::new_v4().to_string();
        let bytes = serde_json::to_vec(body)?;

        self.session
            .publish_json(queue, Some(&correlation_id), Some(&self.reply_queue), &bytes)
            .await?;
        info!(queue = %queue, correlation_id = %correlation_id, "Request sent");

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let delivery =
                match tokio::time::timeout_at(deadline, self.session.next_delivery()).await {
                    Err(_) => return Ok(RpcReply::NoReply),
                    Ok(Ok(Some(delivery))) => delivery,
                    Ok(Ok(None)) => return Ok(RpcReply::NoReply),
                    Ok(Err(e)) => return Err(e),
                };
            self.session.ack(delivery.delivery_tag).await?;

            if delivery.correlation_id.as_deref() == Some(correlation_id.as_str()) {
                let reply = serde_json::from_slice(&delivery.body)?;
                return Ok(RpcReply::Received(reply));
            }
            debug!(
                correlation_id = ?delivery.correlation_id,
                "Ignoring reply for another request"
            );
        }
    }

    pub async fn close(mut self) {
        self.session.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_request_shape() {
        let mut data = Map::new();
        data.insert("otp".to_string(), Value::from("68853"));

        let body = listener_request("listener-otp", "abc", data);
        assert_eq!(body["headers"]["camundaListenerMessageName"], "listener-otp");
        assert_eq!(body["headers"]["camundaProcessInstanceId"], "abc");
        assert_eq!(body["data"]["otp"], "68853");
        assert!(body["time"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    #[ignore = "requires RabbitMQ running"]
    async fn test_call_without_listener_times_out() {
        let mut client = RpcClient::connect(&BrokerConfig::default()).await.unwrap();
        let reply = client
            .call(
                "bpm_bridge_rpc_test",
                &listener_request("m", "i", Map::new()),
                Duration::from_millis(200),
            )
            .await
            .unwrap();
        assert_eq!(reply, RpcReply::NoReply);
        client.close().await;
    }
}
