//! Inbound HTTP surface: the chat-completions endpoint and its error
//! contract. One logical worker per request; requests share nothing but the
//! immutable backend handle and the model allowlist.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{error, info};

use crate::agent::{ChatTurnRequest, FinalTurn, Orchestrator};
use crate::providers::{ChatBackend, UpstreamError};
use crate::relay;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn ChatBackend>,
    pub allowed_models: Option<Vec<String>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/v1/chat/completions",
            post(chat_handler).options(options_handler),
        )
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn options_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn chat_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ChatTurnRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid request body: {}", e),
            );
        }
    };

    if !model_allowed(&state.allowed_models, &request.model) {
        return error_response(
            StatusCode::FORBIDDEN,
            &format!("Model '{}' is not allowed", request.model),
        );
    }

    info!(
        model = %request.model,
        stream = request.stream,
        messages = request.messages.len(),
        "Chat request accepted"
    );

    let orchestrator = Orchestrator::new(state.backend.clone());
    match orchestrator.run(request).await {
        Ok(FinalTurn::Buffered { upstream, trace }) => relay::buffered_response(upstream, trace),
        Ok(FinalTurn::Streaming(stream)) => relay::stream_response(stream),
        Err(e) => failure_response(e),
    }
}

fn model_allowed(allowed: &Option<Vec<String>>, model: &str) -> bool {
    match allowed {
        None => true,
        Some(models) => models.iter().any(|m| m == model),
    }
}

/// Map a loop failure onto the wire. Upstream failures copy the upstream
/// status and carry the raw body; everything else is a 500.
fn failure_response(e: anyhow::Error) -> Response {
    match e.downcast::<UpstreamError>() {
        Ok(upstream) => {
            error!(status = ?upstream.status, kind = ?upstream.kind, "Upstream call failed");
            let status = upstream
                .status
                .and_then(|s| StatusCode::from_u16(s).ok())
                // Transport failures have no upstream status to copy.
                .unwrap_or(StatusCode::BAD_GATEWAY);
            (
                status,
                Json(json!({"error": "API call failed", "details": upstream.body})),
            )
                .into_response()
        }
        Err(other) => {
            error!("Request failed: {:#}", other);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &other.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;
    use serde_json::Value;

    fn state_with(backend: MockBackend, allowed_models: Option<Vec<String>>) -> AppState {
        AppState {
            backend: Arc::new(backend),
            allowed_models,
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn options_returns_200_with_trivial_body() {
        let response = options_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(body) = health_handler().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn malformed_json_is_a_400() {
        let state = state_with(MockBackend::with_turns(vec![]), None);
        let response = chat_handler(State(state), Bytes::from_static(b"{not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("Invalid request body"));
    }

    #[tokio::test]
    async fn missing_model_field_is_a_400() {
        let state = state_with(MockBackend::with_turns(vec![]), None);
        let response = chat_handler(
            State(state),
            Bytes::from_static(br#"{"messages": []}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn disallowed_model_is_a_403() {
        let state = state_with(
            MockBackend::with_turns(vec![]),
            Some(vec!["gpt-4o".to_string()]),
        );
        let response = chat_handler(
            State(state),
            Bytes::from_static(
                br#"{"model": "o1", "messages": [{"role": "user", "content": "hi"}]}"#,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("o1"));
    }

    #[tokio::test]
    async fn plain_chat_returns_upstream_json_with_trace() {
        let state = state_with(
            MockBackend::with_turns(vec![MockBackend::text_turn("hello")]),
            Some(vec!["gpt-4o".to_string()]),
        );
        let response = chat_handler(
            State(state),
            Bytes::from_static(
                br#"{"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}"#,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["choices"][0]["message"]["content"], "hello");
        let trace = body[relay::TRACE_FIELD].as_array().unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0]["role"], "user");
        assert_eq!(trace[1]["role"], "assistant");
    }

    #[tokio::test]
    async fn streaming_request_relays_event_stream() {
        let state = state_with(MockBackend::with_turns(vec![MockBackend::text_turn("hi")]), None);
        let response = chat_handler(
            State(state),
            Bytes::from_static(
                br#"{"model": "gpt-4o", "stream": true, "messages": [{"role": "user", "content": "hi"}]}"#,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("data: "));
        assert!(!text.contains(relay::TRACE_FIELD));
    }

    #[tokio::test]
    async fn upstream_failure_copies_status_and_raw_body() {
        let state = state_with(
            MockBackend::failing(429, r#"{"error": {"message": "slow down"}}"#),
            None,
        );
        let response = chat_handler(
            State(state),
            Bytes::from_static(
                br#"{"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}"#,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = body_json(response).await;
        assert_eq!(body["error"], "API call failed");
        assert_eq!(body["details"], r#"{"error": {"message": "slow down"}}"#);
    }

    #[test]
    fn model_allowlist_logic() {
        assert!(model_allowed(&None, "anything"));
        let allowed = Some(vec!["gpt-4o".to_string()]);
        assert!(model_allowed(&allowed, "gpt-4o"));
        assert!(!model_allowed(&allowed, "gpt-4o-mini"));
    }
}
