//! # Synchronous Reply Responder
//!
//! Answers RPC-over-queue requests on their reply queue, stamped with the
//! request's correlation id. Failures are always answered; successes only
//! when `reply_on_success` is set.

use serde::Serialize;
use serde_json::Value;

use crate::engine::CorrelationOutcome;
use crate::error::BridgeResult;
use crate::event_log::{EventLogger, LogDirection};
use crate::messaging::{ReplyPublisher, RpcMetadata};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyError {
    pub message: String,
}

/// Body published to the reply queue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReplyBody {
    Failure {
        success: bool,
        error: Vec<ReplyError>,
    },
    Success {
        success: bool,
        data: Value,
    },
}

impl ReplyBody {
    pub fn failure(message: impl Into<String>) -> Self {
        ReplyBody::Failure {
            success: false,
            error: vec![ReplyError {
                message: message.into(),
            }],
        }
    }

    pub fn success(data: Value) -> Self {
        ReplyBody::Success {
            success: true,
            data,
        }
    }
}

pub struct ReplyResponder {
    logger: EventLogger,
    reply_on_success: bool,
}

impl ReplyResponder {
    pub fn new(logger: EventLogger, reply_on_success: bool) -> Self {
        Self {
            logger,
            reply_on_success,
        }
    }

    /// Publish the reply for `outcome`, if one is due
    ///
    /// Returns whether a reply was published. A publish failure is a broker
    /// error and propagates.
    pub async fn respond(
        &self,
        publisher: &dyn ReplyPublisher,
        rpc: &RpcMetadata,
        outcome: &CorrelationOutcome,
    ) -> BridgeResult<bool> {
        let body = match outcome {
            CorrelationOutcome::Failure(reason) => ReplyBody::failure(reason.clone()),
            CorrelationOutcome::Success(result) if self.reply_on_success => {
                ReplyBody::success(result.clone())
            }
            CorrelationOutcome::Success(_) => return Ok(false),
        };

        let bytes = serde_json::to_vec(&body)?;
        publisher
            .publish_reply(&rpc.reply_to, &rpc.correlation_id, &bytes)
            .await?;

        self.logger
            .info(
                LogDirection::Output,
                format!(
                    "Sent synchronous response to <{}> with correlation id <{}>: {}",
                    rpc.reply_to,
                    rpc.correlation_id,
                    String::from_utf8_lossy(&bytes)
                ),
            )
            .await;

        Ok(true)
    }
}
