//! Camunda REST contract of the engine client, against a mock HTTP server.

use bpm_bridge::config::EngineConfig;
use bpm_bridge::engine::{
    CamundaClient, CorrelationRequest, ProcessEngine, ProcessVariables, TypedValue,
    UpdatedVariables,
};
use serde_json::json;
use wiremock::matchers::{basic_auth, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, login: &str) -> CamundaClient {
    CamundaClient::new(&EngineConfig {
        base_url: format!("{}/engine-rest", server.uri()),
        login: login.to_string(),
        password: "demo-pass".to_string(),
        request_timeout_ms: 2_000,
    })
    .unwrap()
}

#[tokio::test]
async fn test_variable_list_uses_raw_values_and_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/engine-rest/process-instance/abc/variables"))
        .and(query_param("deserializeValues", "false"))
        .and(basic_auth("demo", "demo-pass"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {
                "type": "Json",
                "value": "{\"data\":{\"parameters\":{\"x\":1}},\"headers\":{\"y\":2}}",
                "valueInfo": {}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server, "demo")
        .get_variable_list("abc", false)
        .await
        .unwrap();

    assert!(response.is_ok());
    let variables: ProcessVariables = serde_json::from_value(response.body).unwrap();
    let document = variables.message_document().unwrap();
    assert_eq!(document["headers"], json!({"y": 2}));
}

#[tokio::test]
async fn test_engine_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/engine-rest/process-instance/missing/variables"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "type": "InvalidRequestException",
            "message": "Process instance with id missing does not exist"
        })))
        .mount(&server)
        .await;

    let response = client(&server, "")
        .get_variable_list("missing", false)
        .await
        .unwrap();

    assert_eq!(response.status, 404);
    assert_eq!(
        response.error_message(),
        "Process instance with id missing does not exist"
    );
}

#[tokio::test]
async fn test_non_json_error_body_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/engine-rest/message"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let request = CorrelationRequest {
        message_name: "m".to_string(),
        process_instance_id: "i".to_string(),
        process_variables: UpdatedVariables::default(),
        result_enabled: true,
    };
    let response = client(&server, "").correlate(&request).await.unwrap();

    assert!(!response.is_ok());
    assert_eq!(response.error_message(), "Request error");
}

#[tokio::test]
async fn test_correlate_posts_camel_case_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/engine-rest/message"))
        .and(basic_auth("demo", "demo-pass"))
        .and(body_partial_json(json!({
            "messageName": "listener-otp",
            "processInstanceId": "abc",
            "resultEnabled": true,
            "processVariables": {
                "message": {"type": "Json", "value": "{\"a\":1}"},
                "rabbitCorrelationId": {"type": "String", "value": "c1"}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"resultType": "Execution"}])))
        .expect(1)
        .mount(&server)
        .await;

    let mut variables = UpdatedVariables::default();
    variables.insert("message", TypedValue::json("{\"a\":1}".to_string()));
    variables.insert("rabbitCorrelationId", TypedValue::string("c1"));

    let response = client(&server, "demo")
        .correlate(&CorrelationRequest {
            message_name: "listener-otp".to_string(),
            process_instance_id: "abc".to_string(),
            process_variables: variables,
            result_enabled: true,
        })
        .await
        .unwrap();

    assert!(response.is_ok());
    assert_eq!(response.body, json!([{"resultType": "Execution"}]));
}

#[tokio::test]
async fn test_unreachable_engine_is_a_transport_error() {
    let engine = CamundaClient::new(&EngineConfig {
        base_url: "http://127.0.0.1:1/engine-rest".to_string(),
        request_timeout_ms: 2_000,
        ..EngineConfig::default()
    })
    .unwrap();

    let result = engine.get_variable_list("abc", false).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_instance_id_stays_inside_its_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/engine-rest/process-instance/a%2F..%2Fb%3Fx/variables"))
        .and(query_param("deserializeValues", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server, "demo")
        .get_variable_list("a/../b?x", false)
        .await
        .unwrap();
    assert!(response.is_ok());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.query(), Some("deserializeValues=false"));
}
