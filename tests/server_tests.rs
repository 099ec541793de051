//! Router-level tests for the messages endpoint, driven with a scripted
//! engine in place of the real one.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use gantry::engine::{
    EngineConfig, EngineEvent, EngineInput, EngineMessage, EngineResult, EngineStream,
    ExecutionEngine, ResultStatus,
};
use gantry::error::GatewayError;
use gantry::server::{router, GatewayState};
use gantry::types::{ContentBlock, MessagesResponse, StopReason};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Engine double that replays a fixed event script, optionally failing
/// after it.
struct ScriptedEngine {
    events: Vec<EngineEvent>,
    fail_with: Option<String>,
}

impl ScriptedEngine {
    fn new(events: Vec<EngineEvent>) -> Self {
        Self {
            events,
            fail_with: None,
        }
    }

    fn failing_after(events: Vec<EngineEvent>, message: &str) -> Self {
        Self {
            events,
            fail_with: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    async fn invoke(
        &self,
        input: EngineInput,
        _config: EngineConfig,
        _cancel: CancellationToken,
    ) -> Result<EngineStream, GatewayError> {
        assert!(!input.content.is_empty());
        let mut items: Vec<Result<EngineEvent, GatewayError>> =
            self.events.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.fail_with {
            items.push(Err(GatewayError::EngineRuntime(message.clone())));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

fn app(engine: ScriptedEngine) -> axum::Router {
    router(Arc::new(GatewayState::new(Arc::new(engine))))
}

fn messages_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/messages")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn non_streaming_request_returns_aggregated_message() {
    let engine = ScriptedEngine::new(vec![
        EngineEvent::Assistant {
            message: EngineMessage {
                content: vec![ContentBlock::text("The answer is 4.")],
            },
        },
        EngineEvent::Result(EngineResult {
            status: ResultStatus::Success,
            usage: Some(gantry::types::UsageDelta {
                input_tokens: Some(12),
                output_tokens: Some(5),
            }),
        }),
    ]);

    let response = app(engine)
        .oneshot(messages_request(serde_json::json!({
            "model": "engine-large",
            "messages": [
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello"},
                {"role": "user", "content": "What's 2+2?"}
            ]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed: MessagesResponse = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(parsed.id.starts_with("msg_"));
    assert_eq!(parsed.model, "engine-large");
    assert_eq!(parsed.content, vec![ContentBlock::text("The answer is 4.")]);
    assert_eq!(parsed.stop_reason, Some(StopReason::EndTurn));
    assert_eq!(parsed.usage.input_tokens, 12);
    assert_eq!(parsed.usage.output_tokens, 5);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_the_engine_runs() {
    let engine = ScriptedEngine::new(vec![]);
    let response = app(engine)
        .oneshot(messages_request(serde_json::json!({
            "model": "engine-large",
            "messages": [
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello"}
            ]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["message"], "Invalid request: last turn must be user");
}

#[tokio::test]
async fn missing_terminal_result_is_a_server_error() {
    let engine = ScriptedEngine::new(vec![EngineEvent::Assistant {
        message: EngineMessage {
            content: vec![ContentBlock::text("partial")],
        },
    }]);
    let response = app(engine)
        .oneshot(messages_request(serde_json::json!({
            "model": "engine-large",
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["error"]["type"], "api_error");
}

#[tokio::test]
async fn streaming_request_emits_event_stream() {
    let engine = ScriptedEngine::new(vec![
        EngineEvent::MessageStart { usage: None },
        EngineEvent::ContentBlockStart {
            index: Some(0),
            content_block: serde_json::json!({"type": "text", "text": ""}),
        },
        EngineEvent::ContentBlockDelta {
            index: Some(0),
            delta: serde_json::json!({"type": "text_delta", "text": "4"}),
        },
        EngineEvent::ContentBlockStop { index: Some(0) },
        EngineEvent::MessageStop,
    ]);

    let response = app(engine)
        .oneshot(messages_request(serde_json::json!({
            "model": "engine-large",
            "stream": true,
            "messages": [{"role": "user", "content": "What's 2+2?"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = body_string(response).await;
    let start = body.find("event: message_start").unwrap();
    let delta = body.find("event: content_block_delta").unwrap();
    let stop = body.find("event: message_stop").unwrap();
    assert!(start < delta && delta < stop);
    assert!(body.contains(r#""text":"4""#));
}

#[tokio::test]
async fn streaming_failure_surfaces_as_error_event() {
    let engine = ScriptedEngine::failing_after(
        vec![EngineEvent::MessageStart { usage: None }],
        "engine exploded",
    );
    let response = app(engine)
        .oneshot(messages_request(serde_json::json!({
            "model": "engine-large",
            "stream": true,
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("event: error"));
    assert!(body.contains("engine exploded"));
    assert_eq!(body.matches("event: error").count(), 1);
}
