//! HTTP-level tests for the Ollama chat backend.

#![cfg(feature = "ollama")]

use chaincv_inference::{GenerationBackend, OllamaBackend, SamplingOptions};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_chat_requests_json_format_without_thinking() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama-test",
            "format": "json",
            "think": false,
            "stream": false,
            "options": {"top_k": 1, "num_predict": 2048}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama-test",
            "message": {"role": "assistant", "content": "{\"ok\": true}"},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OllamaBackend::with_config(server.uri(), "llama-test".to_string(), 5).unwrap();
    let text = backend
        .generate("Analyze", &SamplingOptions::deterministic())
        .await
        .unwrap();
    assert_eq!(text, "{\"ok\": true}");
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;

    let backend = OllamaBackend::with_config(server.uri(), "llama-test".to_string(), 5).unwrap();
    assert!(backend.health_check().await.unwrap());
}
