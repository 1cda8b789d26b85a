//! # Correlation Dispatcher
//!
//! Submits merged variables to the engine to advance the named process
//! instance. Failures are a value, not an error: the caller decides whether
//! a synchronous reply has to carry them.

use std::sync::Arc;

use crate::engine::{CorrelationOutcome, CorrelationRequest, ProcessEngine, UpdatedVariables};
use crate::event_log::{EventLogger, LogDirection};

pub struct CorrelationDispatcher {
    engine: Arc<dyn ProcessEngine>,
    logger: EventLogger,
}

impl CorrelationDispatcher {
    pub fn new(engine: Arc<dyn ProcessEngine>, logger: EventLogger) -> Self {
        Self { engine, logger }
    }

    pub async fn correlate(
        &self,
        updated_variables: UpdatedVariables,
        message_name: &str,
        process_instance_id: &str,
    ) -> CorrelationOutcome {
        let request = CorrelationRequest {
            message_name: message_name.to_string(),
            process_instance_id: process_instance_id.to_string(),
            process_variables: updated_variables,
            result_enabled: true,
        };

        let outcome = match self.engine.correlate(&request).await {
            Ok(response) if response.is_ok() => CorrelationOutcome::Success(response.body),
            Ok(response) => CorrelationOutcome::Failure(response.error_message()),
            Err(e) => CorrelationOutcome::Failure(e.to_string()),
        };

        match &outcome {
            CorrelationOutcome::Success(_) => {
                self.logger
                    .info(
                        LogDirection::Input,
                        format!("Correlate a Message <{message_name}> received"),
                    )
                    .await;
            }
            CorrelationOutcome::Failure(reason) => {
                self.logger
                    .error(
                        LogDirection::Input,
                        format!(
                            "Correlate a Message <{message_name}> not received, because `{reason}`"
                        ),
                    )
                    .await;
            }
        }

        outcome
    }
}
