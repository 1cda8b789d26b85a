use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;

use crate::engine::{
    CorrelationRequest, EngineError, EngineResponse, EngineResult, ProcessEngine,
};

#[derive(Debug)]
enum Scripted {
    Respond(EngineResponse),
    Fail(String),
}

impl Scripted {
    fn into_result(self, endpoint: &str) -> EngineResult<EngineResponse> {
        match self {
            Scripted::Respond(response) => Ok(response),
            Scripted::Fail(message) => Err(EngineError::transport(endpoint, message)),
        }
    }
}

/// Process engine double with per-endpoint response queues
///
/// With an empty queue the variable endpoint answers 404 and the
/// correlation endpoint answers 200 with an empty result list.
#[derive(Debug, Default)]
pub struct MockProcessEngine {
    variable_responses: Mutex<VecDeque<Scripted>>,
    correlate_responses: Mutex<VecDeque<Scripted>>,
    variable_requests: Mutex<Vec<(String, bool)>>,
    correlate_requests: Mutex<Vec<CorrelationRequest>>,
}

impl MockProcessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_variables_response(&self, response: EngineResponse) {
        self.variable_responses
            .lock()
            .push_back(Scripted::Respond(response));
    }

    pub fn fail_variables_with(&self, message: &str) {
        self.variable_responses
            .lock()
            .push_back(Scripted::Fail(message.to_string()));
    }

    pub fn push_correlate_response(&self, response: EngineResponse) {
        self.correlate_responses
            .lock()
            .push_back(Scripted::Respond(response));
    }

    pub fn fail_correlate_with(&self, message: &str) {
        self.correlate_responses
            .lock()
            .push_back(Scripted::Fail(message.to_string()));
    }

    /// `(process_instance_id, deserialize_values)` of every variable fetch
    pub fn variable_requests(&self) -> Vec<(String, bool)> {
        self.variable_requests.lock().clone()
    }

    pub fn correlate_requests(&self) -> Vec<CorrelationRequest> {
        self.correlate_requests.lock().clone()
    }
}

#[async_trait]
impl ProcessEngine for MockProcessEngine {
    async fn get_variable_list(
        &self,
        process_instance_id: &str,
        deserialize_values: bool,
    ) -> EngineResult<EngineResponse> {
        self.variable_requests
            .lock()
            .push((process_instance_id.to_string(), deserialize_values));

        match self.variable_responses.lock().pop_front() {
            Some(scripted) => scripted.into_result("process-instance/variables"),
            None => Ok(EngineResponse::new(
                404,
                json!({
                    "type": "InvalidRequestException",
                    "message": format!("Process instance with id {process_instance_id} does not exist")
                }),
            )),
        }
    }

    async fn correlate(&self, request: &CorrelationRequest) -> EngineResult<EngineResponse> {
        self.correlate_requests.lock().push(request.clone());

        match self.correlate_responses.lock().pop_front() {
            Some(scripted) => scripted.into_result("message"),
            None => Ok(EngineResponse::new(200, json!([]))),
        }
    }
}
