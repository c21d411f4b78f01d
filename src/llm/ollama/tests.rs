use super::*;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_clients(server_uri: &str) -> OllamaChatClient {
    let url = Url::parse(server_uri).expect("mock server URI should parse");
    let connection = OllamaConfig {
        protocol: url.scheme().to_string(),
        host: url.host_str().expect("mock server should have a host").to_string(),
        port: url.port().expect("mock server should have a port"),
        ..OllamaConfig::default()
    };
    let llm = LlmConfig {
        model: "test-llm".to_string(),
        retry_attempts: 2,
        ..LlmConfig::default()
    };
    OllamaChatClient::new(&connection, &llm).expect("Failed to create chat client")
}

fn request(prompt: &str) -> CompletionRequest {
    CompletionRequest {
        system: "You are a triage assistant.".to_string(),
        prompt: prompt.to_string(),
        temperature: 0.1,
        max_tokens: 512,
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn completes_chat_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "test-llm",
            "stream": false
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "message": {
                    "role": "assistant",
                    "content": "{\"severity\": \"critical\"}"
                }
            })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_clients(&server.uri());
    let req = request("classify this alert");

    let response = tokio::task::spawn_blocking(move || client.complete(&req))
        .await
        .expect("task should not panic")
        .expect("completion should succeed");

    assert_eq!(response, "{\"severity\": \"critical\"}");
}

#[tokio::test(flavor = "multi_thread")]
async fn retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "message": { "role": "assistant", "content": "ok" }
            })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_clients(&server.uri());
    let req = request("classify this alert");

    let response = tokio::task::spawn_blocking(move || client.complete(&req))
        .await
        .expect("task should not panic")
        .expect("completion should succeed after retry");

    assert_eq!(response, "ok");
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_body_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("garbage"))
        .mount(&server)
        .await;

    let client = test_clients(&server.uri());
    let req = request("classify this alert");

    let result = tokio::task::spawn_blocking(move || client.complete(&req))
        .await
        .expect("task should not panic");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn timeout_is_reported_as_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "message": { "role": "assistant", "content": "slow" }
                }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = test_clients(&server.uri()).with_retry_attempts(1);
    let mut req = request("classify this alert");
    req.timeout = Duration::from_millis(200);

    let result = tokio::task::spawn_blocking(move || client.complete(&req))
        .await
        .expect("task should not panic");

    assert!(result.is_err());
}
