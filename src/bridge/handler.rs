//! # Message Handler
//!
//! Processes one delivery end to end: decode, validate, merge with engine
//! state, correlate, and answer synchronous requests. All per-message state
//! lives in a [`MessageContext`] built for that invocation.

use std::sync::Arc;

use super::dispatcher::CorrelationDispatcher;
use super::merge::VariableMerger;
use super::profile::HandlerProfile;
use super::responder::ReplyResponder;
use super::validator::{MessageValidator, ValidationDecision, ValidationIssue};
use crate::engine::{CorrelationOutcome, ProcessEngine};
use crate::error::BridgeResult;
use crate::event_log::{EventLogger, LogDirection};
use crate::messaging::{Delivery, InboundEnvelope, ReplyPublisher};

/// Per-invocation view of the message being handled
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContext {
    pub envelope: InboundEnvelope,
    pub message_name: String,
    pub process_instance_id: String,
}

impl MessageContext {
    /// Resolve the message name and instance id through the profile's header
    /// names; absent values read as empty strings
    pub fn new(envelope: InboundEnvelope, profile: &HandlerProfile) -> Self {
        let message_name = envelope
            .header(&profile.message_name_header)
            .unwrap_or_default();
        let process_instance_id = envelope
            .header(&profile.instance_id_header)
            .unwrap_or_default();
        Self {
            envelope,
            message_name,
            process_instance_id,
        }
    }
}

/// How a delivery ended, for statistics and tests
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Body was not a JSON object; dropped
    Malformed,
    /// Required fields missing under the `abort` policy
    Rejected { issues: Vec<ValidationIssue> },
    Correlated { replied: bool },
    CorrelationFailed { reason: String, replied: bool },
}

pub struct MessageHandler {
    profile: HandlerProfile,
    validator: MessageValidator,
    merger: VariableMerger,
    dispatcher: CorrelationDispatcher,
    responder: ReplyResponder,
    logger: EventLogger,
}

impl MessageHandler {
    pub fn new(
        profile: HandlerProfile,
        engine: Arc<dyn ProcessEngine>,
        logger: EventLogger,
        reply_on_success: bool,
    ) -> Self {
        Self {
            validator: MessageValidator::new(profile.checked_headers()),
            merger: VariableMerger::new(
                Arc::clone(&engine),
                logger.clone(),
                profile.merge_strategy,
            ),
            dispatcher: CorrelationDispatcher::new(engine, logger.clone()),
            responder: ReplyResponder::new(logger.clone(), reply_on_success),
            logger,
            profile,
        }
    }

    pub fn profile(&self) -> &HandlerProfile {
        &self.profile
    }

    /// Handle one delivery
    ///
    /// Only broker failures while replying are returned as errors; engine and
    /// validation problems are logged and reported through the outcome.
    pub async fn handle(
        &self,
        delivery: &Delivery,
        publisher: &dyn ReplyPublisher,
    ) -> BridgeResult<HandlerOutcome> {
        self.logger
            .info(
                LogDirection::Input,
                format!("Received {}", delivery.body_lossy()),
            )
            .await;

        let envelope = match InboundEnvelope::from_delivery(delivery) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.logger
                    .error(
                        LogDirection::Input,
                        format!("Incoming message is dropped, because `{e}`"),
                    )
                    .await;
                return Ok(HandlerOutcome::Malformed);
            }
        };

        let validation = self.validator.validate(&envelope);
        for issue in &validation.issues {
            self.logger
                .error(LogDirection::Input, issue.to_string())
                .await;
        }
        if validation.decision(self.profile.on_missing_field) == ValidationDecision::Abort {
            return Ok(HandlerOutcome::Rejected {
                issues: validation.issues,
            });
        }

        let context = MessageContext::new(envelope, &self.profile);
        self.process(context, publisher).await
    }

    async fn process(
        &self,
        context: MessageContext,
        publisher: &dyn ReplyPublisher,
    ) -> BridgeResult<HandlerOutcome> {
        let updated = self
            .merger
            .updated_variables(&context.process_instance_id, &context.envelope)
            .await;

        let outcome = self
            .dispatcher
            .correlate(updated, &context.message_name, &context.process_instance_id)
            .await;

        let replied = match context.envelope.rpc() {
            Some(rpc) => self.responder.respond(publisher, rpc, &outcome).await?,
            None => false,
        };

        Ok(match outcome {
            CorrelationOutcome::Success(_) => HandlerOutcome::Correlated { replied },
            CorrelationOutcome::Failure(reason) => {
                HandlerOutcome::CorrelationFailed { reason, replied }
            }
        })
    }
}
