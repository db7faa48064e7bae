//! Primary Classifier Contract Tests
//!
//! These tests pin the HTTP contract between the primary intent classifier
//! and an OpenAI-compatible chat completions endpoint:
//! - request shape (model, messages, JSON response format, bearer auth)
//! - reply recovery (plain JSON, fenced JSON, prose around JSON)
//! - error mapping (HTTP status, timeouts, malformed replies)
//! - chain fall-through to the offline pattern tier

#![allow(clippy::unwrap_used, clippy::expect_used)]

use lara::intent::{
    ClassifierChain, ClassifyError, Intent, IntentClassifier, IntentSource, PrimaryClassifier,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

fn classifier(server: &MockServer) -> PrimaryClassifier {
    PrimaryClassifier::new(server.uri(), "gpt-4o-mini").with_api_key("test-key")
}

fn primary_tier(server: &MockServer) -> Arc<dyn IntentClassifier> {
    Arc::new(classifier(server))
}

// ────────────────────────────────────────────────────────────────────────────
// Request Format
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_carries_model_transcript_and_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"intent":"show_tasks","confidence":0.95}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let result = classifier(&server).classify("show my tasks").await.unwrap();
    assert_eq!(result.intent, Intent::ShowTasks);
    assert_eq!(result.source, IntentSource::Primary);
}

#[tokio::test]
async fn test_request_sends_transcript_as_user_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"intent":"general_query","text":"what is the weather","confidence":0.7}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    classifier(&server).classify("what is the weather").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages.last().unwrap()["role"], "user");
    assert_eq!(messages.last().unwrap()["content"], "what is the weather");
}

// ────────────────────────────────────────────────────────────────────────────
// Reply Parsing
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reply_with_nullable_fields_parses() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"intent":"add_reminder","text":"call mom","time":"tomorrow at 6","query":null,"target":null,"confidence":0.88}"#,
        )))
        .mount(&server)
        .await;

    let result = classifier(&server)
        .classify("remind me to call mom tomorrow at 6")
        .await
        .unwrap();
    assert_eq!(
        result.intent,
        Intent::AddReminder {
            text: "call mom".to_owned(),
            time: Some("tomorrow at 6".to_owned()),
        }
    );
    assert!((result.confidence - 0.88).abs() < 1e-6);
}

#[tokio::test]
async fn test_fenced_reply_is_recovered() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "```json\n{\"intent\":\"play_music\",\"query\":\"jazz\",\"confidence\":0.9}\n```",
        )))
        .mount(&server)
        .await;

    let result = classifier(&server).classify("play some jazz").await.unwrap();
    assert_eq!(
        result.intent,
        Intent::PlayMusic {
            query: "jazz".to_owned()
        }
    );
}

#[tokio::test]
async fn test_navigation_target_is_normalised() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"intent":"navigate","target":"reminders","confidence":0.9}"#,
        )))
        .mount(&server)
        .await;

    let result = classifier(&server).classify("open reminders").await.unwrap();
    assert_eq!(
        result.intent,
        Intent::Navigate {
            target: "/reminders".to_owned()
        }
    );
}

#[tokio::test]
async fn test_non_json_reply_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "Sorry, I can't help with that.",
        )))
        .mount(&server)
        .await;

    let err = classifier(&server).classify("hello").await.unwrap_err();
    assert!(matches!(err, ClassifyError::Malformed(_)), "got {err:?}");
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn test_unknown_intent_is_schema_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"intent":"order_pizza","confidence":0.9}"#,
        )))
        .mount(&server)
        .await;

    let err = classifier(&server).classify("order a pizza").await.unwrap_err();
    assert!(matches!(err, ClassifyError::Schema(_)), "got {err:?}");
}

// ────────────────────────────────────────────────────────────────────────────
// Error Mapping
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_error_maps_to_http_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"message": "upstream exploded", "type": "server_error"}
        })))
        .mount(&server)
        .await;

    let err = classifier(&server).classify("show my tasks").await.unwrap_err();
    match &err {
        ClassifyError::Http { status, message } => {
            assert_eq!(*status, 500);
            assert_eq!(message, "upstream exploded");
        }
        other => panic!("expected Http error, got {other:?}"),
    }
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn test_unauthorized_is_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = classifier(&server).classify("show my tasks").await.unwrap_err();
    assert!(matches!(err, ClassifyError::Http { status: 401, .. }));
    assert!(err.is_permanent());
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(r#"{"intent":"show_tasks","confidence":0.9}"#))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = classifier(&server)
        .with_timeout(Duration::from_millis(100))
        .classify("show my tasks")
        .await
        .unwrap_err();
    assert!(matches!(err, ClassifyError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn test_disabled_classifier_makes_no_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = classifier(&server)
        .with_enabled(false)
        .classify("show my tasks")
        .await
        .unwrap_err();
    assert!(matches!(err, ClassifyError::Disabled(_)));
}

// ────────────────────────────────────────────────────────────────────────────
// Chain Fall-through
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chain_falls_back_when_primary_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let chain = ClassifierChain::new(vec![primary_tier(&server)]);
    let result = chain.classify("play telugu songs").await;

    assert_eq!(
        result.intent,
        Intent::PlayMusic {
            query: "telugu songs".to_owned()
        }
    );
    assert_eq!(result.source, IntentSource::Fallback);

    let health = chain.health("primary").unwrap();
    assert_eq!(health.consecutive_failures, 1);
    assert!(!health.permanently_failed);
}

#[tokio::test]
async fn test_chain_stops_calling_primary_after_auth_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let chain = ClassifierChain::new(vec![primary_tier(&server)]);
    let first = chain.classify("show my reminders").await;
    let second = chain.classify("show my tasks").await;

    assert_eq!(first.intent, Intent::ShowReminders);
    assert_eq!(second.intent, Intent::ShowTasks);
    assert!(chain.health("primary").unwrap().permanently_failed);
}

#[tokio::test]
async fn test_chain_prefers_confident_primary_answer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"intent":"play_music","query":"butta bomma","confidence":0.93}"#,
        )))
        .mount(&server)
        .await;

    let chain = ClassifierChain::new(vec![primary_tier(&server)]);
    let result = chain.classify("put on butta bomma").await;

    assert_eq!(result.source, IntentSource::Primary);
    assert_eq!(
        result.intent,
        Intent::PlayMusic {
            query: "butta bomma".to_owned()
        }
    );
}
