//! HTTP surface for the messages endpoint.
//!
//! A thin axum layer over the flattener and the event translator. The host
//! process builds the [`Router`] with its engine and mounts it; process
//! bootstrap, CORS, and deadline policy live with the host.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::{EngineConfig, ExecutionEngine};
use crate::error::{GatewayError, Result};
use crate::flatten::flatten_conversation;
use crate::metrics::RequestCounters;
use crate::translate::{aggregate_response, translate_stream, RequestContext};
use crate::types::{MessagesRequest, WireEvent};

/// Shared state for the messages handler.
pub struct GatewayState {
    pub engine: Arc<dyn ExecutionEngine>,
    pub counters: Arc<RequestCounters>,
    /// Gateway-level defaults merged under each request's own settings.
    pub base_config: EngineConfig,
}

impl GatewayState {
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            engine,
            counters: Arc::new(RequestCounters::new()),
            base_config: EngineConfig::default(),
        }
    }

    pub fn with_base_config(mut self, base_config: EngineConfig) -> Self {
        self.base_config = base_config;
        self
    }
}

/// Build the router exposing `POST /v1/messages`.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/v1/messages", post(messages_handler))
        .with_state(state)
}

async fn messages_handler(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<MessagesRequest>,
) -> Response {
    let request_id = format!("msg_{}", Uuid::new_v4().simple());
    debug!(request_id = %request_id, model = %request.model, stream = request.stream, "messages request");
    match handle_messages(&state, request, request_id).await {
        Ok(response) => {
            state.counters.record_success();
            response
        }
        Err(e) => {
            state.counters.record_failure();
            warn!(error = %e, "messages request failed");
            error_response(&e)
        }
    }
}

async fn handle_messages(
    state: &GatewayState,
    request: MessagesRequest,
    request_id: String,
) -> Result<Response> {
    let flattened = flatten_conversation(&request.messages)?;
    let config = engine_config(&state.base_config, &request, flattened.system_instruction);
    let ctx = RequestContext {
        request_id,
        model: request.model.clone(),
    };

    let cancel = CancellationToken::new();
    let events = state
        .engine
        .invoke(flattened.input, config, cancel.clone())
        .await?;
    // Dropping the response stream (client disconnect included) cancels
    // the in-flight engine invocation.
    let guard = cancel.drop_guard();

    if request.stream {
        let counters = state.counters.clone();
        let sse_stream = translate_stream(ctx, events).map(move |event| {
            let _cancel_on_drop = &guard;
            if matches!(event, WireEvent::Error { .. }) {
                counters.record_failure();
            }
            let data = serde_json::to_string(&event).unwrap_or_default();
            Ok::<_, Infallible>(Event::default().event(event.kind()).data(data))
        });
        Ok(Sse::new(sse_stream)
            .keep_alive(KeepAlive::default())
            .into_response())
    } else {
        let response = aggregate_response(&ctx, events).await?;
        drop(guard.disarm());
        Ok(Json(response).into_response())
    }
}

fn engine_config(
    base: &EngineConfig,
    request: &MessagesRequest,
    extracted_system: Option<String>,
) -> EngineConfig {
    EngineConfig {
        model: Some(request.model.clone()),
        // An explicit system field outranks a leading system turn, which
        // outranks the gateway default.
        system_instruction: request
            .system
            .clone()
            .or(extracted_system)
            .or_else(|| base.system_instruction.clone()),
        cwd: request.cwd.clone().or_else(|| base.cwd.clone()),
        allowed_capabilities: base.allowed_capabilities.clone(),
        disallowed_capabilities: base.disallowed_capabilities.clone(),
        permission_mode: request.permission_mode.unwrap_or(base.permission_mode),
        max_turns: request.max_turns.or(base.max_turns),
        max_thinking_tokens: request.max_thinking_tokens.or(base.max_thinking_tokens),
        env: base.env.clone(),
        include_partial_events: request.stream,
    }
}

fn error_response(error: &GatewayError) -> Response {
    let status = match error {
        GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = serde_json::json!({
        "type": "error",
        "error": {
            "type": error.wire_type(),
            "message": error.to_string(),
        },
    });
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PermissionMode;

    fn request(stream: bool) -> MessagesRequest {
        MessagesRequest {
            model: "engine-large".to_string(),
            messages: Vec::new(),
            system: None,
            stream,
            max_thinking_tokens: Some(2048),
            cwd: Some("/work".to_string()),
            max_turns: Some(4),
            temperature: None,
            top_p: None,
            top_k: None,
            permission_mode: Some(PermissionMode::Plan),
        }
    }

    #[test]
    fn request_fields_override_base_config() {
        let base = EngineConfig {
            system_instruction: Some("base".to_string()),
            cwd: Some("/base".to_string()),
            max_turns: Some(10),
            ..EngineConfig::default()
        };
        let config = engine_config(&base, &request(true), Some("from history".to_string()));
        assert_eq!(config.model.as_deref(), Some("engine-large"));
        assert_eq!(config.system_instruction.as_deref(), Some("from history"));
        assert_eq!(config.cwd.as_deref(), Some("/work"));
        assert_eq!(config.max_turns, Some(4));
        assert_eq!(config.max_thinking_tokens, Some(2048));
        assert_eq!(config.permission_mode, PermissionMode::Plan);
        assert!(config.include_partial_events);
    }

    #[test]
    fn explicit_system_field_outranks_extracted_instruction() {
        let mut req = request(false);
        req.system = Some("explicit".to_string());
        let config = engine_config(
            &EngineConfig::default(),
            &req,
            Some("from history".to_string()),
        );
        assert_eq!(config.system_instruction.as_deref(), Some("explicit"));
        assert!(!config.include_partial_events);
    }
}
